//! Translation of a task into the agent binary's argument vector.
//!
//! Fresh conversation:
//!
//! ```text
//! <bin> exec --cd <dir> --skip-git-repo-check <mode flags> [--model M] \
//!     --output-last-message <file> <prompt>
//! ```
//!
//! Continuation inserts `resume <handle>` before the prompt.

use super::mode::ExecutionMode;
use super::prompt::ReviewTemplates;
use super::task::AgentTask;
use crate::error::ConfigurationError;
use crate::session::SessionEntry;
use std::path::{Path, PathBuf};

/// Models the agent binary is known to accept. Anything else is dropped
/// with a warning and the binary's default model is used.
pub const SUPPORTED_MODELS: &[&str] = &[
    "gpt-5",
    "gpt-5-codex",
    "gpt-5.1",
    "gpt-5.1-codex",
    "gpt-5.1-codex-mini",
    "gpt-5.1-codex-max",
    "o3",
    "o4-mini",
    "codex-mini-latest",
];

/// A fully resolved invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Non-fatal adjustments made while building, surfaced to the caller.
    pub warnings: Vec<String>,
}

impl CommandLine {
    /// Shell-quoted rendering for logs.
    pub fn display(&self) -> String {
        let program = self.program.to_string_lossy();
        std::iter::once(program.as_ref())
            .chain(self.args.iter().map(String::as_str))
            .map(|word| shell_words::quote(word).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Builds invocations for one server: fixed binary, mode and templates.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    program: &'a Path,
    mode: ExecutionMode,
    templates: &'a ReviewTemplates,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(program: &'a Path, mode: ExecutionMode, templates: &'a ReviewTemplates) -> Self {
        Self {
            program,
            mode,
            templates,
        }
    }

    /// The prompt the agent will receive.
    pub fn prompt(&self, task: &AgentTask) -> Result<String, ConfigurationError> {
        let prompt = match &task.review {
            Some(review) => {
                let rendered = self.templates.render(review)?;
                if task.prompt.trim().is_empty() {
                    rendered
                } else {
                    format!("{}\n\n{}", rendered, task.prompt.trim())
                }
            }
            None => task.prompt.clone(),
        };

        if prompt.trim().is_empty() {
            return Err(ConfigurationError::InvalidTask(
                "prompt cannot be empty".to_string(),
            ));
        }
        Ok(prompt)
    }

    /// Build the invocation. `session` is the conversation being continued;
    /// `last_message` is where the agent writes its final reply.
    pub fn build(
        &self,
        task: &AgentTask,
        session: Option<&SessionEntry>,
        last_message: &Path,
    ) -> Result<CommandLine, ConfigurationError> {
        let prompt = self.prompt(task)?;
        let mut warnings = Vec::new();

        let mut args = vec![
            "exec".to_string(),
            "--cd".to_string(),
            task.work_dir.to_string_lossy().into_owned(),
            "--skip-git-repo-check".to_string(),
        ];
        args.extend(self.mode.flags().iter().map(|flag| flag.to_string()));

        if let Some(model) = task.model.as_deref().map(str::trim) {
            if SUPPORTED_MODELS.contains(&model) {
                args.push("--model".to_string());
                args.push(model.to_string());
            } else {
                warnings.push(format!(
                    "model '{}' is not supported; using the agent's default. Supported models: {}",
                    model,
                    SUPPORTED_MODELS.join(", ")
                ));
            }
        }

        args.push("--output-last-message".to_string());
        args.push(last_message.to_string_lossy().into_owned());

        if let Some(entry) = session {
            args.push("resume".to_string());
            args.push(entry.handle.clone());
        }
        args.push(prompt);

        Ok(CommandLine {
            program: self.program.to_path_buf(),
            args,
            warnings,
        })
    }
}
