//! Command implementations for subagent.
//!
//! This module turns the global flags into a [`Dispatcher`] and routes each
//! subcommand to its handler. Handlers return `anyhow::Result`; typed
//! [`AgentError`](crate::error::AgentError)s pass through unchanged so the
//! binary can map them to exit codes.

mod batch;
mod env;
mod review;
mod run;
mod serve;

use crate::agent::mode::ExecutionMode;
use crate::agent::prompt::ReviewTemplates;
use crate::cli::{Command, GlobalArgs};
use crate::config::{MIN_TIMEOUT, ServerConfig};
use crate::dispatch::{AgentReply, Dispatcher};
use crate::env::{EnvMap, inherited_env};
use crate::error::{ConfigurationError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Dispatch a command to its implementation.
pub async fn dispatch(global: GlobalArgs, command: Command) -> anyhow::Result<()> {
    let base_env = inherited_env();
    let config = server_config(&global, &base_env)?;
    let templates = match &config.review_templates {
        Some(path) => ReviewTemplates::load(path)?,
        None => ReviewTemplates::default(),
    };

    tracing::info!(
        mode = %config.mode,
        agent_bin = %config.agent_bin,
        timeout_secs = config.timeout.as_secs(),
        review_types = templates.names().len(),
        "subagent configured"
    );
    let dispatcher = Dispatcher::new(config, templates, base_env);

    match command {
        Command::Serve => serve::cmd_serve(dispatcher).await,
        Command::Run(args) => run::cmd_run(&dispatcher, args).await,
        Command::Review(args) => review::cmd_review(&dispatcher, args).await,
        Command::Batch(args) => batch::cmd_batch(&dispatcher, args).await,
        Command::Env(args) => env::cmd_env(&dispatcher, args).await,
    }
}

/// Layer the CLI flags over the `SUBAGENT_*` settings found in `base_env`.
pub fn server_config(global: &GlobalArgs, base_env: &EnvMap) -> Result<ServerConfig> {
    let cwd = std::env::current_dir().map_err(|e| {
        ConfigurationError::Other(format!("failed to determine current directory: {}", e))
    })?;

    let mut config = ServerConfig::from_env_map(base_env, cwd);
    config.mode = ExecutionMode::from_flags(global.yolo, global.auto_approve);
    if let Some(seconds) = global.timeout_seconds {
        let timeout = Duration::try_from_secs_f64(seconds).unwrap_or(MIN_TIMEOUT);
        config = config.with_timeout(timeout);
    }
    config.grace = Duration::from_secs(global.grace_seconds);
    if let Some(bin) = global.agent_bin.as_deref().filter(|b| !b.trim().is_empty()) {
        config.agent_bin = bin.trim().to_string();
    }
    config.review_templates = global.review_templates.clone();
    Ok(config)
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping agent");
            trigger.cancel();
        }
    });
    token
}

fn print_reply(reply: &AgentReply, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reply)?);
        return Ok(());
    }

    for warning in &reply.warnings {
        eprintln!("warning: {}", warning);
    }
    println!("{}", reply.output);
    eprintln!();
    eprintln!("session: {}", reply.session_id);
    Ok(())
}
