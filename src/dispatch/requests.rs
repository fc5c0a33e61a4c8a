//! Argument and reply types for the four tool operations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Arguments for `spawn_agent`, and for each entry of a parallel batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpawnAgentArgs {
    pub prompt: String,
    #[serde(default, alias = "cwd")]
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewArgs {
    pub review_type: String,
    #[serde(default, alias = "cwd")]
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContinueSessionArgs {
    pub session_id: String,
    #[serde(alias = "prompt")]
    pub message: String,
    #[serde(default, alias = "cwd")]
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpawnAgentsParallelArgs {
    pub agents: Vec<SpawnAgentArgs>,
}

/// One tool invocation, as named on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    SpawnAgent(SpawnAgentArgs),
    Review(ReviewArgs),
    ContinueSession(ContinueSessionArgs),
    SpawnAgentsParallel(SpawnAgentsParallelArgs),
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::SpawnAgent(_) => "spawn_agent",
            ToolCall::Review(_) => "review",
            ToolCall::ContinueSession(_) => "continue_session",
            ToolCall::SpawnAgentsParallel(_) => "spawn_agents_parallel",
        }
    }
}

/// Reply to a single-task operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentReply {
    pub output: String,
    /// Pass back to continue this conversation.
    pub session_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Per-task outcome of a parallel batch; exactly one of `output` and
/// `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl BatchOutcome {
    pub fn from_result(index: usize, result: Result<AgentReply, String>) -> Self {
        match result {
            Ok(reply) => Self {
                index,
                output: Some(reply.output),
                error: None,
                session_id: Some(reply.session_id),
                warnings: reply.warnings,
            },
            Err(error) => Self {
                index,
                output: None,
                error: Some(error),
                session_id: None,
                warnings: Vec::new(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
