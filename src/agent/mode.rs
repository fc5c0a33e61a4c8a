//! Execution modes: how much the spawned agent is allowed to do.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Escalating permission tiers, fixed for the lifetime of the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Read-only sandbox; the agent may inspect but not modify the workspace.
    #[default]
    Safe,
    /// Filesystem writes inside the workspace are permitted (`--yolo`).
    Writable,
    /// Writable, and every confirmation prompt and sandbox is bypassed.
    AutoApprove,
}

impl ExecutionMode {
    /// Resolve the mode from the server flags. `--auto-approve` wins over
    /// `--yolo` since it implies it.
    pub fn from_flags(yolo: bool, auto_approve: bool) -> Self {
        match (yolo, auto_approve) {
            (_, true) => ExecutionMode::AutoApprove,
            (true, false) => ExecutionMode::Writable,
            (false, false) => ExecutionMode::Safe,
        }
    }

    /// Sandbox/approval flags understood by the agent binary.
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            ExecutionMode::Safe => &["--sandbox", "read-only"],
            ExecutionMode::Writable => &["--full-auto"],
            ExecutionMode::AutoApprove => &["--dangerously-bypass-approvals-and-sandbox"],
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Safe => write!(f, "safe"),
            ExecutionMode::Writable => write!(f, "writable"),
            ExecutionMode::AutoApprove => write!(f, "auto-approve"),
        }
    }
}
