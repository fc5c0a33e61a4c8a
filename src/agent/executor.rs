//! Parallel batch execution.
//!
//! Every item runs in its own tokio task, so a panic or failure in one item
//! cannot affect the others. Results come back in input order regardless of
//! completion order.

use crate::error::AgentError;
use futures_util::future::join_all;
use std::future::Future;

/// Run `run_one` for every item concurrently and collect per-item results.
///
/// `run_one` receives the item's index and the item. An `Err` holds the
/// item's error message.
pub async fn run_all<I, T, F, Fut>(items: Vec<I>, run_one: F) -> Vec<Result<T, String>>
where
    F: Fn(usize, I) -> Fut,
    Fut: Future<Output = Result<T, AgentError>> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| tokio::spawn(run_one(index, item)))
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .enumerate()
        .map(|(index, joined)| match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) if e.is_panic() => {
                tracing::error!(index, "batch item panicked");
                Err("agent task panicked".to_string())
            }
            Err(e) => Err(format!("agent task aborted: {}", e)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_in_input_order() {
        let delays = vec![300u64, 10, 150];
        let results = run_all(delays, |index, delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, AgentError>(index)
        })
        .await;
        assert_eq!(results, vec![Ok(0), Ok(1), Ok(2)]);
    }

    #[tokio::test]
    async fn test_failure_and_panic_are_isolated() {
        let results = run_all(vec!["ok", "fail", "panic", "ok"], |_, kind| async move {
            match kind {
                "fail" => Err(AgentError::Cancelled),
                "panic" => panic!("boom"),
                _ => Ok(kind.to_string()),
            }
        })
        .await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0], Ok("ok".to_string()));
        assert_eq!(results[1], Err("agent run was cancelled".to_string()));
        assert_eq!(results[2], Err("agent task panicked".to_string()));
        assert_eq!(results[3], Ok("ok".to_string()));
    }

    #[tokio::test]
    async fn test_items_run_concurrently() {
        let started = std::time::Instant::now();
        let results = run_all(vec![(); 4], |_, ()| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, AgentError>(())
        })
        .await;
        assert_eq!(results.len(), 4);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let results = run_all(Vec::<u8>::new(), |_, _| async { Ok::<_, AgentError>(()) }).await;
        assert!(results.is_empty());
    }
}
