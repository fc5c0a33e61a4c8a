//! One unit of agent work.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameters for a review-flavored task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// Template name, e.g. `security`.
    pub review_type: String,
    /// What to review: a path, a commit range, a PR. Defaults to the
    /// uncommitted changes in the working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Extra instructions spliced into the template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

/// A task for one agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTask {
    /// Instructions for the agent. Empty for review tasks, whose prompt is
    /// rendered from a template.
    pub prompt: String,
    pub work_dir: PathBuf,
    pub model: Option<String>,
    /// Continue this conversation instead of starting a new one.
    pub session_id: Option<String>,
    pub review: Option<ReviewRequest>,
}

impl AgentTask {
    pub fn new(prompt: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            work_dir: work_dir.into(),
            model: None,
            session_id: None,
            review: None,
        }
    }

    pub fn review(review: ReviewRequest, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            review: Some(review),
            ..Self::new(String::new(), work_dir)
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id.filter(|s| !s.trim().is_empty());
        self
    }

    /// Check the structural invariants before anything is spawned.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match &self.review {
            Some(review) if review.review_type.trim().is_empty() => {
                return Err(ConfigurationError::InvalidTask(
                    "'review_type' is required and cannot be empty".to_string(),
                ));
            }
            None if self.prompt.trim().is_empty() => {
                return Err(ConfigurationError::InvalidTask(
                    "'prompt' is required and cannot be empty".to_string(),
                ));
            }
            _ => {}
        }

        if !self.work_dir.is_dir() {
            return Err(ConfigurationError::InvalidTask(format!(
                "working directory '{}' does not exist or is not a directory",
                self.work_dir.display()
            )));
        }

        Ok(())
    }
}
