//! Server-wide settings, fixed at startup.

use crate::agent::mode::ExecutionMode;
use crate::agent::supervisor::RunLimits;
use crate::env::{EnvMap, EnvOptions};
use std::path::PathBuf;
use std::time::Duration;

/// Agent binary looked up on `PATH` when none is configured.
pub const DEFAULT_AGENT_BIN: &str = "codex";

/// Wall-clock budget for one agent run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);

/// Shortest timeout accepted; smaller values are raised to this.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Time between SIGTERM and SIGKILL when stopping an agent.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub mode: ExecutionMode,
    /// Name (searched on the agent's `PATH`) or path of the agent binary.
    pub agent_bin: String,
    pub timeout: Duration,
    pub grace: Duration,
    /// How each agent's environment is assembled.
    pub env: EnvOptions,
    /// Working directory for requests that do not name one.
    pub default_work_dir: PathBuf,
    /// Optional YAML file extending the built-in review templates.
    pub review_templates: Option<PathBuf>,
}

impl ServerConfig {
    pub fn new(default_work_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: ExecutionMode::default(),
            agent_bin: DEFAULT_AGENT_BIN.to_string(),
            timeout: DEFAULT_TIMEOUT,
            grace: DEFAULT_GRACE,
            env: EnvOptions::default(),
            default_work_dir: default_work_dir.into(),
            review_templates: None,
        }
    }

    /// Settings derived from `SUBAGENT_*` variables in `env`; explicit CLI
    /// flags are layered on top by the caller.
    pub fn from_env_map(env: &EnvMap, default_work_dir: impl Into<PathBuf>) -> Self {
        Self {
            env: EnvOptions::from_env_map(env),
            ..Self::new(default_work_dir)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(MIN_TIMEOUT);
        self
    }

    pub fn limits(&self) -> RunLimits {
        RunLimits {
            timeout: self.timeout,
            grace: self.grace,
        }
    }
}
