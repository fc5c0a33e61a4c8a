//! Parsing of agent process output.
//!
//! The agent reports its conversation handle either as a `session id: <id>`
//! banner line or as a `"thread_id"` / `"session_id"` field in JSON event
//! lines. The last occurrence wins, since a resumed run may print the
//! previous handle before the new one.

use regex::Regex;
use std::sync::LazyLock;

static BANNER_HANDLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*session id:\s*([A-Za-z0-9_-]+)\s*$").expect("valid regex")
});

static JSON_HANDLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:thread_id|session_id)"\s*:\s*"([A-Za-z0-9_-]+)""#).expect("valid regex")
});

static MISSING_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Missing environment variable:\s*`?([A-Za-z_][A-Za-z0-9_]*)`?")
        .expect("valid regex")
});

/// Find the continuation handle in the agent's output streams.
///
/// Pure: the same text always yields the same handle.
pub fn extract_continuation_handle(stdout: &str, stderr: &str) -> Option<String> {
    [stderr, stdout]
        .into_iter()
        .filter_map(last_handle_in)
        .last()
}

fn last_handle_in(text: &str) -> Option<String> {
    let banner = BANNER_HANDLE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .last();
    let json = JSON_HANDLE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .last();

    [banner, json]
        .into_iter()
        .flatten()
        .max_by_key(|m| m.start())
        .map(|m| m.as_str().to_string())
}

/// Name of the variable the agent reported as missing, if any.
pub fn missing_env_var(stderr: &str) -> Option<&str> {
    MISSING_VAR
        .captures(stderr)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Actionable hint for a failed run whose stderr mentions a missing variable.
pub fn missing_env_hint(stderr: &str) -> Option<String> {
    missing_env_var(stderr).map(|name| {
        format!(
            "The agent reported that {name} is not set. Export it in the environment \
             that launches subagent, or enable SUBAGENT_SOURCE_SHELL_ENV=1 (shell rc files) \
             or SUBAGENT_LOAD_DOTENV=1 (.env file)."
        )
    })
}
