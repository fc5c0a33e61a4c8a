//! Implementation of the `subagent serve` command.
//!
//! A JSON-lines tool server. Requests arrive on stdin, one object per line:
//!
//! ```text
//! {"id": 1, "tool": "spawn_agent", "arguments": {"prompt": "..."}}
//! {"id": 2, "cancel": 1}
//! ```
//!
//! Every request runs in its own task and its response is written as soon as
//! it finishes, so responses may arrive out of order:
//!
//! ```text
//! {"id": 2, "ok": true, "result": {"cancelled": true}}
//! {"id": 1, "ok": false, "error": {"kind": "cancelled", "message": "..."}}
//! ```
//!
//! EOF stops reading and waits for in-flight calls; Ctrl-C cancels them.

use crate::dispatch::{Dispatcher, ToolCall};
use anyhow::Context;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Error kind for requests that could not be understood.
const PROTOCOL_ERROR: &str = "protocol";

#[derive(Debug, PartialEq)]
enum Request {
    Call { id: Value, call: ToolCall },
    Cancel { id: Value, target: Value },
}

/// Cancellation tokens of in-flight calls, keyed by serialized request id.
#[derive(Default)]
struct InFlight {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl InFlight {
    fn register(&self, id: &Value, token: CancellationToken) -> bool {
        let mut tokens = self.tokens.lock();
        let key = id.to_string();
        if tokens.contains_key(&key) {
            return false;
        }
        tokens.insert(key, token);
        true
    }

    fn finish(&self, id: &Value) {
        self.tokens.lock().remove(&id.to_string());
    }

    fn cancel(&self, id: &Value) -> bool {
        let token = self.tokens.lock().get(&id.to_string()).cloned();
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

pub async fn cmd_serve(dispatcher: Dispatcher) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = rx.recv().await {
            let mut line = message.to_string();
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                tracing::error!(error = %e, "failed to write response, stopping writer");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let shutdown = CancellationToken::new();
    let inflight = Arc::new(InFlight::default());
    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!("serving tool calls on stdin");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read request from stdin")? else {
                    tracing::info!("stdin closed, waiting for in-flight calls");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                handle_line(&line, &dispatcher, &tx, &inflight, &shutdown, &mut tasks);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, cancelling in-flight calls");
                shutdown.cancel();
                break;
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "request task failed");
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "request task failed");
        }
    }
    drop(tx);
    let _ = writer.await;

    for (id, entry) in dispatcher.sessions().snapshot().await {
        tracing::debug!(session_id = %id, handle = %entry.handle, turns = entry.turns, "session at shutdown");
    }
    Ok(())
}

fn handle_line(
    line: &str,
    dispatcher: &Dispatcher,
    tx: &mpsc::UnboundedSender<Value>,
    inflight: &Arc<InFlight>,
    shutdown: &CancellationToken,
    tasks: &mut JoinSet<()>,
) {
    let (id, call) = match parse_request(line) {
        Ok(Request::Call { id, call }) => (id, call),
        Ok(Request::Cancel { id, target }) => {
            let cancelled = inflight.cancel(&target);
            tracing::info!(cancel_id = %target, cancelled, "cancel requested");
            let _ = tx.send(success(&id, json!({ "cancelled": cancelled })));
            return;
        }
        Err((id, message)) => {
            tracing::warn!(%message, "rejected request");
            let _ = tx.send(failure(&id, PROTOCOL_ERROR, &message));
            return;
        }
    };

    let token = shutdown.child_token();
    if !inflight.register(&id, token.clone()) {
        let _ = tx.send(failure(
            &id,
            PROTOCOL_ERROR,
            &format!("request id {} is already in flight", id),
        ));
        return;
    }

    let dispatcher = dispatcher.clone();
    let tx = tx.clone();
    let inflight = Arc::clone(inflight);
    tasks.spawn(async move {
        let tool = call.name();
        tracing::info!(id = %id, tool, "tool call started");
        let response = match dispatcher.call(call, &token).await {
            Ok(result) => success(&id, result),
            Err(e) => {
                tracing::warn!(id = %id, tool, kind = e.kind(), error = %e, "tool call failed");
                failure(&id, e.kind(), &e.to_string())
            }
        };
        inflight.finish(&id);
        let _ = tx.send(response);
    });
}

fn parse_request(line: &str) -> Result<Request, (Value, String)> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| (Value::Null, format!("invalid JSON: {}", e)))?;
    let Value::Object(mut obj) = value else {
        return Err((Value::Null, "request must be a JSON object".to_string()));
    };

    let id = obj.remove("id").unwrap_or(Value::Null);
    if id.is_null() {
        return Err((Value::Null, "request is missing 'id'".to_string()));
    }

    if let Some(target) = obj.remove("cancel") {
        return Ok(Request::Cancel { id, target });
    }

    match serde_json::from_value::<ToolCall>(Value::Object(obj)) {
        Ok(call) => Ok(Request::Call { id, call }),
        Err(e) => Err((id, format!("invalid tool call: {}", e))),
    }
}

fn success(id: &Value, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

fn failure(id: &Value, kind: &str, message: &str) -> Value {
    json!({ "id": id, "ok": false, "error": { "kind": kind, "message": message } })
}
