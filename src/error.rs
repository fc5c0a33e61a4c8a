//! Error types for subagent.
//!
//! Uses thiserror for derive macros and keeps messages user-actionable:
//! every variant says what went wrong and, where there is one, how to fix it.

use crate::exit_codes;
use std::time::Duration;
use thiserror::Error;

/// Failure while assembling the environment for a spawned agent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    /// One or more required variables are absent (or empty) after every
    /// layer has been merged.
    #[error(
        "missing required environment variable(s): {}\n\
         Fix: export the variable(s) in the environment that launches subagent, \
         or enable SUBAGENT_SOURCE_SHELL_ENV=1 / SUBAGENT_LOAD_DOTENV=1.",
        .missing.join(", ")
    )]
    MissingVariables { missing: Vec<String> },
}

/// Malformed request or configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown review type '{name}'. Available review types: {}", .available.join(", "))]
    UnknownReviewType {
        name: String,
        available: Vec<String>,
    },

    #[error("unknown session '{0}'. Start a new conversation without a session id first.")]
    UnknownSession(String),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("invalid review template '{name}': {reason}")]
    InvalidTemplate { name: String, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Main error type for agent operations.
///
/// Each variant maps to an exit code for the CLI and to a stable `kind()`
/// string for the JSON serve protocol.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The agent binary could not be started.
    #[error("failed to launch agent '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// The agent ran but exited unsuccessfully.
    #[error("agent exited with a non-zero status ({}): {message}", format_exit(.exit_code))]
    Runtime {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("agent timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("agent run was cancelled")]
    Cancelled,
}

fn format_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl AgentError {
    /// Returns the CLI exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::Environment(_) => exit_codes::ENVIRONMENT_ERROR,
            AgentError::Configuration(_) => exit_codes::USER_ERROR,
            AgentError::Spawn { .. } => exit_codes::SPAWN_FAILURE,
            AgentError::Runtime { .. } => exit_codes::AGENT_FAILURE,
            AgentError::Timeout { .. } => exit_codes::TIMEOUT,
            AgentError::Cancelled => exit_codes::CANCELLED,
        }
    }

    /// Stable, machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Environment(_) => "environment",
            AgentError::Configuration(_) => "configuration",
            AgentError::Spawn { .. } => "spawn",
            AgentError::Runtime { .. } => "runtime",
            AgentError::Timeout { .. } => "timeout",
            AgentError::Cancelled => "cancelled",
        }
    }
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_error_has_correct_exit_code() {
        let err = AgentError::from(EnvironmentError::MissingVariables {
            missing: vec!["OPENAI_API_KEY".to_string()],
        });
        assert_eq!(err.exit_code(), exit_codes::ENVIRONMENT_ERROR);
        assert_eq!(err.kind(), "environment");
    }

    #[test]
    fn configuration_error_has_correct_exit_code() {
        let err = AgentError::from(ConfigurationError::UnknownSession("abc".to_string()));
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn timeout_and_cancel_are_distinct_from_runtime_failures() {
        let timeout = AgentError::Timeout {
            after: Duration::from_secs(3),
        };
        let cancelled = AgentError::Cancelled;
        let runtime = AgentError::Runtime {
            exit_code: Some(1),
            message: "boom".to_string(),
        };

        let codes = [timeout.exit_code(), cancelled.exit_code(), runtime.exit_code()];
        assert_ne!(codes[0], codes[1]);
        assert_ne!(codes[0], codes[2]);
        assert_ne!(codes[1], codes[2]);
        assert_eq!(timeout.to_string(), "agent timed out after 3s");
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = EnvironmentError::MissingVariables {
            missing: vec!["A".to_string(), "B".to_string()],
        };
        assert!(
            err.to_string()
                .starts_with("missing required environment variable(s): A, B")
        );

        let err = ConfigurationError::UnknownReviewType {
            name: "lint".to_string(),
            available: vec!["general".to_string(), "security".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "unknown review type 'lint'. Available review types: general, security"
        );

        let err = AgentError::Runtime {
            exit_code: None,
            message: "killed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "agent exited with a non-zero status (terminated by signal): killed"
        );
    }
}
