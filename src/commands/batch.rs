//! Implementation of the `subagent batch` command.
//!
//! Reads a JSON array of tasks, runs them in parallel and prints one JSON
//! outcome per task, in input order. A failed task does not fail the
//! command; its outcome carries the error instead.

use super::cancel_on_ctrl_c;
use crate::cli::BatchArgs;
use crate::dispatch::{Dispatcher, SpawnAgentArgs, SpawnAgentsParallelArgs};
use crate::error::ConfigurationError;
use anyhow::Context;
use std::path::Path;
use tokio::io::AsyncReadExt;

pub async fn cmd_batch(dispatcher: &Dispatcher, args: BatchArgs) -> anyhow::Result<()> {
    let content = read_input(&args.file).await?;
    let agents = parse_batch(&content)?;

    let cancel = cancel_on_ctrl_c();
    let outcomes = dispatcher
        .spawn_agents_parallel(SpawnAgentsParallelArgs { agents }, &cancel)
        .await?;

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        tracing::warn!(failed, total = outcomes.len(), "some batch agents failed");
    }
    println!("{}", serde_json::to_string_pretty(&outcomes)?);
    Ok(())
}

async fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("failed to read batch from stdin")?;
        return Ok(content);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read batch file '{}'", path.display()))
}

/// Accepts either a bare array or `{"agents": [...]}`.
fn parse_batch(content: &str) -> Result<Vec<SpawnAgentArgs>, ConfigurationError> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| ConfigurationError::InvalidTask(format!("batch is not valid JSON: {}", e)))?;

    let agents = match value {
        serde_json::Value::Object(mut obj) if obj.contains_key("agents") => {
            obj.remove("agents").unwrap_or_default()
        }
        other => other,
    };
    serde_json::from_value(agents)
        .map_err(|e| ConfigurationError::InvalidTask(format!("invalid batch: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let agents = parse_batch(r#"[{"prompt": "a"}, {"prompt": "b", "work_dir": "/w"}]"#).unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[1].work_dir.as_deref(), Some(Path::new("/w")));
    }

    #[test]
    fn test_parse_wrapped_array() {
        let agents = parse_batch(r#"{"agents": [{"prompt": "a"}]}"#).unwrap();
        assert_eq!(agents[0].prompt, "a");
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_batch("not json").is_err());
        assert!(parse_batch(r#"[{"task": "a"}]"#).is_err());
        assert!(parse_batch(r#"{"prompt": "a"}"#).is_err());
    }
}
