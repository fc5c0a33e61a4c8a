//! Recovering variables from the user's shell profile.
//!
//! Some clients launch subagent with a sanitized environment (no API keys,
//! a minimal `PATH`). Sourcing the user's rc files in a login shell and
//! dumping `env -0` recovers what an interactive terminal would have.
//!
//! The subprocess sits behind [`ShellSource`] so the merge logic can be
//! tested with canned captures.

use super::{EnvMap, EnvOptions, find_executable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Rc files sourced when none are configured, relative to `$HOME`.
const DEFAULT_RC_FILES: &[&str] = &[
    ".zshrc",
    ".zprofile",
    ".bashrc",
    ".bash_profile",
    ".profile",
];

/// Shells tried, in order, when neither the options nor `$SHELL` name one.
const FALLBACK_SHELLS: &[&str] = &["zsh", "bash", "sh"];

/// A fully resolved sourcing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    pub shell: PathBuf,
    pub rc_files: Vec<PathBuf>,
    pub timeout: Duration,
}

impl ShellRequest {
    /// Resolve the shell and rc files for `options` against `env`.
    ///
    /// Returns `None` when no usable shell exists.
    pub fn resolve(env: &EnvMap, options: &EnvOptions) -> Option<Self> {
        let shell = resolve_shell(env, options.shell.as_deref())?;
        let home = env.get("HOME").map(PathBuf::from);

        let rc_files = match &options.shell_rc_files {
            Some(files) => files
                .iter()
                .map(|f| anchor_at_home(f, home.as_deref()))
                .collect(),
            None => home.as_deref().map(default_rc_files).unwrap_or_default(),
        };

        Some(Self {
            shell,
            rc_files,
            timeout: options.shell_timeout,
        })
    }

    /// The `sh`-compatible script: export everything sourced, dump env.
    pub fn script(&self) -> String {
        if self.rc_files.is_empty() {
            return "set -a; env -0".to_string();
        }

        let quoted: Vec<String> = self
            .rc_files
            .iter()
            .map(|p| shell_words::quote(&p.to_string_lossy()).into_owned())
            .collect();

        format!(
            "set -a; for f in {}; do [ -f \"$f\" ] && . \"$f\"; done; env -0",
            quoted.join(" ")
        )
    }
}

/// Default rc files under `home`.
pub fn default_rc_files(home: &Path) -> Vec<PathBuf> {
    DEFAULT_RC_FILES.iter().map(|name| home.join(name)).collect()
}

fn anchor_at_home(path: &Path, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return path.to_path_buf();
    };
    if let Ok(rest) = path.strip_prefix("~") {
        return home.join(rest);
    }
    if path.is_relative() {
        return home.join(path);
    }
    path.to_path_buf()
}

/// Pick the shell executable.
///
/// Preference: `preferred`, then `$SHELL`, then the first of zsh/bash/sh found
/// on `PATH`. A preferred shell that cannot be found falls through to the
/// next candidate.
pub fn resolve_shell(env: &EnvMap, preferred: Option<&str>) -> Option<PathBuf> {
    let path_var = env.get(super::PATH_VAR).map(String::as_str);

    preferred
        .into_iter()
        .chain(env.get("SHELL").map(String::as_str))
        .filter(|s| !s.trim().is_empty())
        .chain(FALLBACK_SHELLS.iter().copied())
        .find_map(|candidate| find_executable(candidate, path_var))
}

/// Result of one sourcing attempt.
///
/// When `error` is set, `vars` holds whatever partial output was parsed
/// before the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellCapture {
    pub vars: EnvMap,
    pub error: Option<String>,
}

impl ShellCapture {
    pub fn ok(vars: EnvMap) -> Self {
        Self { vars, error: None }
    }

    pub fn failed(vars: EnvMap, error: impl Into<String>) -> Self {
        Self {
            vars,
            error: Some(error.into()),
        }
    }
}

/// Something that can source rc files and report the resulting variables.
pub trait ShellSource {
    /// Run `request` with `env` as the shell's environment.
    fn capture(
        &self,
        request: &ShellRequest,
        env: &EnvMap,
    ) -> impl Future<Output = ShellCapture> + Send;
}

/// Parse `env -0` output into a mapping.
///
/// Records without `=` or with an empty name are ignored; invalid UTF-8 is
/// replaced rather than rejected.
pub fn parse_env_output(raw: &[u8]) -> EnvMap {
    raw.split(|b| *b == 0)
        .filter_map(|record| {
            let text = String::from_utf8_lossy(record);
            let (key, value) = text.split_once('=')?;
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Production [`ShellSource`]: `<shell> -lc <script>` as a subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginShell;

impl ShellSource for LoginShell {
    async fn capture(&self, request: &ShellRequest, env: &EnvMap) -> ShellCapture {
        let mut command = Command::new(&request.shell);
        command
            .arg("-lc")
            .arg(request.script())
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ShellCapture::failed(
                    EnvMap::new(),
                    format!(
                        "failed to source shell environment with '{}': {}",
                        request.shell.display(),
                        e
                    ),
                );
            }
        };

        let deadline = tokio::time::Instant::now() + request.timeout;
        let mut stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        });

        // Read incrementally so a timeout still leaves partial output behind.
        let mut out = Vec::new();
        let mut chunk = [0u8; 8192];
        let mut timed_out = false;
        if let Some(stdout) = stdout.as_mut() {
            loop {
                match tokio::time::timeout_at(deadline, stdout.read(&mut chunk)).await {
                    Ok(Ok(0)) | Ok(Err(_)) => break,
                    Ok(Ok(n)) => out.extend_from_slice(&chunk[..n]),
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                }
            }
        }

        let status = if timed_out {
            None
        } else {
            tokio::time::timeout_at(deadline, child.wait())
                .await
                .ok()
                .and_then(Result::ok)
        };

        let vars = parse_env_output(&out);

        let Some(status) = status else {
            let _ = child.start_kill();
            stderr_task.abort();
            return ShellCapture::failed(
                vars,
                format!(
                    "timed out after {:.1}s while sourcing shell rc files; \
                     set SUBAGENT_SOURCE_SHELL_ENV=0 to disable or raise \
                     SUBAGENT_SHELL_ENV_TIMEOUT_SECONDS",
                    request.timeout.as_secs_f64()
                ),
            );
        };

        if !status.success() {
            let stderr = stderr_task.await.unwrap_or_default();
            return ShellCapture::failed(
                vars,
                format!(
                    "failed to source shell environment ({}, exit code {:?}): {}",
                    request.shell.display(),
                    status.code(),
                    String::from_utf8_lossy(&stderr).trim()
                ),
            );
        }

        stderr_task.abort();
        ShellCapture::ok(vars)
    }
}

/// Cache key: the shell plus every rc file with its modification time.
type CacheKey = (PathBuf, Vec<(PathBuf, Option<SystemTime>)>);

/// Successful shell captures, keyed by rc file state.
///
/// Editing an rc file changes its mtime and so forces a fresh capture.
#[derive(Debug, Default)]
pub struct ShellEnvCache {
    entries: Mutex<HashMap<CacheKey, EnvMap>>,
}

impl ShellEnvCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(request: &ShellRequest) -> CacheKey {
        let files = request
            .rc_files
            .iter()
            .map(|p| {
                let mtime = std::fs::metadata(p).and_then(|m| m.modified()).ok();
                (p.clone(), mtime)
            })
            .collect();
        (request.shell.clone(), files)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// A [`ShellSource`] that reuses successful captures from a [`ShellEnvCache`].
#[derive(Debug)]
pub struct CachedShell<S> {
    inner: S,
    cache: ShellEnvCache,
}

impl<S> CachedShell<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: ShellEnvCache::new(),
        }
    }

    pub fn cache(&self) -> &ShellEnvCache {
        &self.cache
    }
}

impl<S: ShellSource + Sync> ShellSource for CachedShell<S> {
    async fn capture(&self, request: &ShellRequest, env: &EnvMap) -> ShellCapture {
        let key = ShellEnvCache::key(request);
        let cached = self.cache.entries.lock().get(&key).cloned();
        if let Some(vars) = cached {
            tracing::trace!(shell = %request.shell.display(), "shell environment cache hit");
            return ShellCapture::ok(vars);
        }

        let capture = self.inner.capture(request, env).await;
        if capture.error.is_none() {
            self.cache.entries.lock().insert(key, capture.vars.clone());
        }
        capture
    }
}
