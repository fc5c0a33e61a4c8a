//! Options controlling how an agent environment is assembled.

use super::EnvMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time budget for sourcing shell rc files.
const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(5);

/// Lower bound on the shell timeout; anything smaller never finishes.
const MIN_SHELL_TIMEOUT: Duration = Duration::from_millis(100);

const DEFAULT_DOTENV_PATH: &str = ".env";

/// Inputs for [`super::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnvOptions {
    /// Load variables from a dotenv file.
    pub load_dotenv: bool,
    /// Dotenv location. Relative paths are resolved by [`EnvOptions::for_workdir`].
    pub dotenv_path: PathBuf,
    /// Let dotenv values replace variables that are already set.
    pub dotenv_override: bool,
    /// Source shell rc files to recover variables a sanitized parent dropped.
    pub source_shell_env: bool,
    /// Rc files to source, in order. `None` means [`super::default_rc_files`].
    pub shell_rc_files: Option<Vec<PathBuf>>,
    /// Shell to run. `None` means `$SHELL`, then zsh/bash/sh.
    pub shell: Option<String>,
    pub shell_timeout: Duration,
    /// Let shell values replace variables that are already set.
    pub shell_env_override: bool,
    /// Variables that must be present (and non-empty) before spawning.
    pub required_vars: BTreeSet<String>,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            load_dotenv: false,
            dotenv_path: PathBuf::from(DEFAULT_DOTENV_PATH),
            dotenv_override: false,
            source_shell_env: true,
            shell_rc_files: None,
            shell: None,
            shell_timeout: DEFAULT_SHELL_TIMEOUT,
            shell_env_override: false,
            required_vars: BTreeSet::new(),
        }
    }
}

impl EnvOptions {
    /// Read options from `SUBAGENT_*` variables in `env`.
    ///
    /// | Variable                              | Effect                               |
    /// |---------------------------------------|--------------------------------------|
    /// | `SUBAGENT_LOAD_DOTENV`                | truthy enables dotenv loading        |
    /// | `SUBAGENT_DOTENV_PATH`                | dotenv file (default `.env`)         |
    /// | `SUBAGENT_DOTENV_OVERRIDE`            | truthy lets dotenv replace values    |
    /// | `SUBAGENT_SOURCE_SHELL_ENV`           | falsy disables shell sourcing        |
    /// | `SUBAGENT_SHELL_RC_FILES`             | comma-separated rc files             |
    /// | `SUBAGENT_SHELL`                      | shell executable                     |
    /// | `SUBAGENT_SHELL_ENV_TIMEOUT_SECONDS`  | sourcing budget (default 5)          |
    /// | `SUBAGENT_SHELL_ENV_OVERRIDE`         | truthy lets the shell replace values |
    /// | `SUBAGENT_REQUIRED_ENV_VARS`          | comma-separated required names       |
    pub fn from_env_map(env: &EnvMap) -> Self {
        let get = |key: &str| env.get(key).map(String::as_str);
        let defaults = Self::default();

        let shell_rc_files = get("SUBAGENT_SHELL_RC_FILES")
            .map(split_csv)
            .filter(|files| !files.is_empty())
            .map(|files| files.into_iter().map(PathBuf::from).collect());

        let shell_timeout = get("SUBAGENT_SHELL_ENV_TIMEOUT_SECONDS")
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite())
            .map(|secs| Duration::from_secs_f64(secs.max(MIN_SHELL_TIMEOUT.as_secs_f64())))
            .unwrap_or(defaults.shell_timeout);

        Self {
            load_dotenv: is_truthy(get("SUBAGENT_LOAD_DOTENV")),
            dotenv_path: get("SUBAGENT_DOTENV_PATH")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.dotenv_path),
            dotenv_override: is_truthy(get("SUBAGENT_DOTENV_OVERRIDE")),
            source_shell_env: !is_falsy(get("SUBAGENT_SOURCE_SHELL_ENV")),
            shell_rc_files,
            shell: get("SUBAGENT_SHELL")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            shell_timeout,
            shell_env_override: is_truthy(get("SUBAGENT_SHELL_ENV_OVERRIDE")),
            required_vars: get("SUBAGENT_REQUIRED_ENV_VARS")
                .map(split_csv)
                .unwrap_or_default()
                .into_iter()
                .collect(),
        }
    }

    /// Copy of these options with a relative dotenv path anchored at `workdir`.
    pub fn for_workdir(&self, workdir: &Path) -> Self {
        let mut options = self.clone();
        if options.dotenv_path.is_relative() {
            options.dotenv_path = workdir.join(&options.dotenv_path);
        }
        options
    }
}

/// `1`, `true`, `yes`, `y`, `on` (case-insensitive).
pub fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        )
    })
}

/// `0`, `false`, `no`, `n`, `off` (case-insensitive).
///
/// Not the negation of [`is_truthy`]: an unset or unrecognised value is
/// neither.
pub fn is_falsy(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "n" | "off"
        )
    })
}

/// Split a comma-separated list, dropping blanks.
pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
