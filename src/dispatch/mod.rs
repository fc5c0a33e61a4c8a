//! Tool operations and the per-task pipeline behind them.
//!
//! Every operation funnels into [`Dispatcher::execute`]:
//!
//! 1. validate the task
//! 2. build its environment
//! 3. resolve (and lock) its session
//! 4. build the command
//! 5. supervise the process
//! 6. record the continuation handle
//!
//! The dispatcher is cheap to clone; clones share the session registry and
//! the shell and dotenv caches.

mod requests;


pub use requests::{
    AgentReply, BatchOutcome, ContinueSessionArgs, ReviewArgs, SpawnAgentArgs,
    SpawnAgentsParallelArgs, ToolCall,
};

use crate::agent::command::CommandBuilder;
use crate::agent::executor::run_all;
use crate::agent::prompt::ReviewTemplates;
use crate::agent::supervisor;
use crate::agent::task::{AgentTask, ReviewRequest};
use crate::config::ServerConfig;
use crate::env::{self, CachedShell, DotenvCache, EnvMap, EnvSpec, LoginShell};
use crate::error::{AgentError, ConfigurationError, EnvironmentError, Result};
use crate::session::SessionRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Inner {
    config: ServerConfig,
    templates: ReviewTemplates,
    sessions: SessionRegistry,
    shell: CachedShell<LoginShell>,
    dotenv: DotenvCache,
    base_env: EnvMap,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// `base_env` is the environment every agent environment is layered
    /// on, normally [`crate::env::inherited_env`].
    pub fn new(config: ServerConfig, templates: ReviewTemplates, base_env: EnvMap) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                templates,
                sessions: SessionRegistry::new(),
                shell: CachedShell::new(LoginShell),
                dotenv: DotenvCache::new(),
                base_env,
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    pub fn templates(&self) -> &ReviewTemplates {
        &self.inner.templates
    }

    /// The environment an agent working in `work_dir` would receive.
    pub async fn environment(&self, work_dir: &Path) -> std::result::Result<EnvSpec, EnvironmentError> {
        let options = self.inner.config.env.for_workdir(work_dir);
        env::build_cached(
            self.inner.base_env.clone(),
            &options,
            &self.inner.shell,
            &self.inner.dotenv,
        )
        .await
    }

    pub async fn spawn_agent(
        &self,
        args: SpawnAgentArgs,
        cancel: &CancellationToken,
    ) -> Result<AgentReply> {
        self.execute(self.task_from(args), cancel).await
    }

    pub async fn review(&self, args: ReviewArgs, cancel: &CancellationToken) -> Result<AgentReply> {
        let review = ReviewRequest {
            review_type: args.review_type,
            target: args.target,
            custom_prompt: args.custom_prompt,
        };
        let task = AgentTask::review(review, self.work_dir(args.work_dir))
            .with_model(args.model)
            .with_session(args.session_id);
        self.execute(task, cancel).await
    }

    /// Continue a conversation started by an earlier call. Unlike the other
    /// operations, an unknown session id is an error here.
    pub async fn continue_session(
        &self,
        args: ContinueSessionArgs,
        cancel: &CancellationToken,
    ) -> Result<AgentReply> {
        if !self.inner.sessions.contains(&args.session_id) {
            return Err(ConfigurationError::UnknownSession(args.session_id).into());
        }
        let task = AgentTask::new(args.message, self.work_dir(args.work_dir))
            .with_model(args.model)
            .with_session(Some(args.session_id));
        self.execute(task, cancel).await
    }

    /// Run every task concurrently. Per-task failures are reported in the
    /// task's outcome; only a malformed batch fails the whole call.
    pub async fn spawn_agents_parallel(
        &self,
        args: SpawnAgentsParallelArgs,
        cancel: &CancellationToken,
    ) -> Result<Vec<BatchOutcome>> {
        if args.agents.is_empty() {
            return Err(ConfigurationError::InvalidTask(
                "'agents' must contain at least one task".to_string(),
            )
            .into());
        }
        if let Some(index) = args.agents.iter().position(|a| a.prompt.trim().is_empty()) {
            return Err(ConfigurationError::InvalidTask(format!(
                "agent {}: 'prompt' is required and cannot be empty",
                index
            ))
            .into());
        }

        tracing::info!(count = args.agents.len(), "running agents in parallel");
        let results = run_all(args.agents, |index, spec| {
            let dispatcher = self.clone();
            let cancel = cancel.child_token();
            let task = self.task_from(spec);
            async move {
                let reply = dispatcher.execute(task, &cancel).await;
                if let Err(e) = &reply {
                    tracing::warn!(index, error = %e, "batch agent failed");
                }
                reply
            }
        })
        .await;

        Ok(results
            .into_iter()
            .enumerate()
            .map(|(index, result)| BatchOutcome::from_result(index, result))
            .collect())
    }

    /// Route a wire-level tool call to its operation.
    pub async fn call(&self, call: ToolCall, cancel: &CancellationToken) -> Result<serde_json::Value> {
        let value = match call {
            ToolCall::SpawnAgent(args) => to_value(self.spawn_agent(args, cancel).await?),
            ToolCall::Review(args) => to_value(self.review(args, cancel).await?),
            ToolCall::ContinueSession(args) => to_value(self.continue_session(args, cancel).await?),
            ToolCall::SpawnAgentsParallel(args) => {
                to_value(self.spawn_agents_parallel(args, cancel).await?)
            }
        };
        value.map_err(|e| ConfigurationError::Other(format!("failed to encode reply: {}", e)).into())
    }

    /// Run one task through the full pipeline.
    pub async fn execute(&self, task: AgentTask, cancel: &CancellationToken) -> Result<AgentReply> {
        task.validate()?;

        let env = self.environment(&task.work_dir).await?;
        for diagnostic in env.diagnostics() {
            tracing::warn!(%diagnostic, "agent environment degraded");
        }
        let program = self.resolve_program(&env)?;

        let scratch = tempfile::Builder::new()
            .prefix("subagent-")
            .tempdir()
            .map_err(|e| AgentError::Spawn {
                program: program.display().to_string(),
                reason: format!("failed to create scratch directory: {}", e),
            })?;
        let last_message = scratch.path().join("last-message.txt");

        // Cancellation also ends the wait for a busy session.
        let turn = tokio::select! {
            turn = self.inner.sessions.resolve(task.session_id.as_deref()) => turn,
            _ = cancel.cancelled() => {
                tracing::info!(session_id = ?task.session_id, "cancelled while waiting for session");
                return Err(AgentError::Cancelled);
            }
        };
        let builder = CommandBuilder::new(&program, self.inner.config.mode, &self.inner.templates);
        let command = builder.build(&task, turn.entry(), &last_message)?;
        for warning in &command.warnings {
            tracing::warn!(%warning, "agent command adjusted");
        }

        tracing::info!(
            session_id = %turn.id(),
            resume = !turn.is_new(),
            mode = %self.inner.config.mode,
            work_dir = %task.work_dir.display(),
            "spawning agent"
        );
        tracing::debug!(command = %command.display(), "agent command");

        let result = supervisor::run(
            &command,
            &env,
            &task.work_dir,
            Some(&last_message),
            self.inner.config.limits(),
            cancel,
        )
        .await;

        let continuation = result.continuation.clone();
        let result = match result.into_result() {
            Ok(result) => result,
            Err(e) => {
                // A failed first run never hands its id to the caller, so a
                // fresh conversation is not registered.
                if !turn.is_new() {
                    turn.commit(continuation);
                }
                return Err(e);
            }
        };
        let session_id = turn.commit(continuation);

        let mut warnings = command.warnings;
        warnings.extend(env.diagnostics().iter().cloned());
        Ok(AgentReply {
            output: result.output,
            session_id,
            warnings,
        })
    }

    fn task_from(&self, args: SpawnAgentArgs) -> AgentTask {
        AgentTask::new(args.prompt, self.work_dir(args.work_dir))
            .with_model(args.model)
            .with_session(args.session_id)
    }

    fn work_dir(&self, requested: Option<PathBuf>) -> PathBuf {
        match requested {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => self.inner.config.default_work_dir.join(dir),
            None => self.inner.config.default_work_dir.clone(),
        }
    }

    fn resolve_program(&self, env: &EnvSpec) -> Result<PathBuf> {
        let bin = &self.inner.config.agent_bin;
        env.find_executable(bin).ok_or_else(|| AgentError::Spawn {
            program: bin.clone(),
            reason: "not found on the agent's PATH. Fix: install it (npm install -g @openai/codex), \
                     set SUBAGENT_AGENT_BIN, or enable SUBAGENT_SOURCE_SHELL_ENV=1 so the shell PATH is used."
                .to_string(),
        })
    }
}

fn to_value<T: serde::Serialize>(value: T) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(value)
}
