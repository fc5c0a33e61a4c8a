//! Environment construction for spawned agent processes.
//!
//! Each agent run gets its own environment, assembled from ordered layers:
//!
//! 1. **Base**: the environment subagent itself inherited
//! 2. **Shell**: variables sourced from the user's shell rc files (optional)
//! 3. **Dotenv**: `KEY=VALUE` pairs from a `.env` file (optional)
//! 4. **Preflight**: required variables are checked against the merged result
//!
//! Later layers only replace existing keys when their override flag is set.
//! `PATH` is the exception: a shell-sourced `PATH` always wins, so the agent
//! sees the same binaries the user's interactive shell would.
//!
//! Shell and dotenv problems are soft; they degrade the environment and are
//! reported in [`EnvSpec::diagnostics`]. A missing required variable is hard
//! and fails the build before anything is spawned.

mod dotenv;
mod options;
mod shell;

#[cfg(test)]
mod tests;

pub use dotenv::{DotenvCache, load_dotenv, parse_dotenv};
pub use options::{EnvOptions, is_falsy, is_truthy, split_csv};
pub use shell::{
    CachedShell, LoginShell, ShellCapture, ShellEnvCache, ShellRequest, ShellSource,
    default_rc_files, parse_env_output, resolve_shell,
};

use crate::error::EnvironmentError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the search-path variable that is always refreshed from the shell.
pub const PATH_VAR: &str = "PATH";

/// A plain environment mapping with deterministic iteration order.
pub type EnvMap = BTreeMap<String, String>;

/// Snapshot the current process environment.
///
/// Non-UTF-8 entries are skipped; they cannot be merged or passed through
/// the string-keyed layers anyway.
pub fn inherited_env() -> EnvMap {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// The resolved environment for one spawned process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSpec {
    vars: EnvMap,
    diagnostics: Vec<String>,
}

impl EnvSpec {
    /// Wrap an already-resolved mapping.
    pub fn from_vars(vars: EnvMap) -> Self {
        Self {
            vars,
            diagnostics: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &EnvMap {
        &self.vars
    }

    /// Non-fatal problems hit while building (shell timeout, unreadable dotenv).
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Look up an executable on this environment's `PATH`.
    pub fn find_executable(&self, name: &str) -> Option<PathBuf> {
        find_executable(name, self.get(PATH_VAR))
    }
}

/// Build the environment for one agent run.
///
/// `base` is usually [`inherited_env`]. `shell` performs the rc-file
/// sourcing; production wiring passes a [`LoginShell`] (optionally wrapped in
/// a [`CachedShell`]), tests pass a fake. The dotenv file is read fresh; see
/// [`build_cached`] to reuse parsed dotenv files across runs.
pub async fn build<S: ShellSource>(
    base: EnvMap,
    options: &EnvOptions,
    shell: &S,
) -> Result<EnvSpec, EnvironmentError> {
    build_layers(base, options, shell, None).await
}

/// [`build`], with dotenv files served from `dotenv` while unchanged.
pub async fn build_cached<S: ShellSource>(
    base: EnvMap,
    options: &EnvOptions,
    shell: &S,
    dotenv: &DotenvCache,
) -> Result<EnvSpec, EnvironmentError> {
    build_layers(base, options, shell, Some(dotenv)).await
}

async fn build_layers<S: ShellSource>(
    base: EnvMap,
    options: &EnvOptions,
    shell: &S,
    dotenv: Option<&DotenvCache>,
) -> Result<EnvSpec, EnvironmentError> {
    let mut spec = EnvSpec::from_vars(base);

    let shell_path = if options.source_shell_env {
        apply_shell_layer(&mut spec, options, shell).await
    } else {
        None
    };

    if options.load_dotenv {
        let loaded = match dotenv {
            Some(cache) => cache.load(&options.dotenv_path).await,
            None => load_dotenv(&options.dotenv_path).await,
        };
        match loaded {
            Ok(layer) => {
                tracing::debug!(
                    path = %options.dotenv_path.display(),
                    count = layer.len(),
                    "loaded dotenv file"
                );
                merge_layer(&mut spec.vars, layer, options.dotenv_override, false);
            }
            Err(message) => {
                tracing::warn!(path = %options.dotenv_path.display(), %message, "dotenv file ignored");
                spec.diagnostics.push(message);
            }
        }
    }

    // The shell's PATH outranks every other layer, dotenv overrides included.
    if let Some(path) = shell_path {
        spec.vars.insert(PATH_VAR.to_string(), path);
    }

    check_required(&spec.vars, &options.required_vars)?;
    Ok(spec)
}

/// Merge the shell layer into `spec`, returning the `PATH` it sourced.
async fn apply_shell_layer<S: ShellSource>(
    spec: &mut EnvSpec,
    options: &EnvOptions,
    shell: &S,
) -> Option<String> {
    let Some(request) = ShellRequest::resolve(&spec.vars, options) else {
        let message = "unable to find a usable shell (tried $SHELL, zsh, bash, sh)".to_string();
        tracing::warn!("{}", message);
        spec.diagnostics.push(message);
        return None;
    };

    let capture = shell.capture(&request, &spec.vars).await;
    let path = capture.vars.get(PATH_VAR).cloned();
    match capture.error {
        None => {
            tracing::debug!(
                shell = %request.shell.display(),
                count = capture.vars.len(),
                "sourced shell environment"
            );
            merge_layer(&mut spec.vars, capture.vars, options.shell_env_override, true);
        }
        Some(message) => {
            tracing::warn!(
                shell = %request.shell.display(),
                %message,
                "shell environment unavailable, continuing with inherited environment"
            );
            // Degraded mode: nothing but PATH survives from a failed capture.
            if let Some(path) = &path {
                spec.vars.insert(PATH_VAR.to_string(), path.clone());
            }
            spec.diagnostics.push(message);
        }
    }
    path
}

/// Merge `layer` into `target`.
///
/// With `override_all` every key is replaced; otherwise only absent keys are
/// filled. When `refresh_path` is set, `PATH` is replaced unconditionally.
fn merge_layer(target: &mut EnvMap, layer: EnvMap, override_all: bool, refresh_path: bool) {
    for (key, value) in layer {
        if override_all || (refresh_path && key == PATH_VAR) {
            target.insert(key, value);
        } else {
            target.entry(key).or_insert(value);
        }
    }
}

/// Fail if any required variable is absent or empty.
fn check_required<'a, I>(vars: &EnvMap, required: I) -> Result<(), EnvironmentError>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut missing: Vec<String> = required
        .into_iter()
        .filter(|name| vars.get(name.as_str()).is_none_or(|v| v.is_empty()))
        .cloned()
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    missing.sort();
    missing.dedup();
    Err(EnvironmentError::MissingVariables { missing })
}

/// Search `path_var` for an executable called `name`.
///
/// Names containing a path separator are checked directly.
pub fn find_executable(name: &str, path_var: Option<&str>) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    std::env::split_paths(path_var?)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
