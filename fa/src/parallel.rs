//! Parallel executor: one task per repository, results in input order
//!
//! Every item gets its own tokio task, so concurrency is unbounded. That is a
//! scaling ceiling for very large workspaces, not a correctness issue. There
//! are no retries; a panicking task is recorded as a failure in its own slot
//! and never affects the other slots.

use futures::future::join_all;
use std::future::Future;
use tracing::{debug, warn};

use crate::error::{ErrorCode, FaError, Result};

/// Outcome for one item, at the same position as the item in the input
#[derive(Debug)]
pub struct ItemResult<T> {
    pub item: String,
    pub result: Result<T>,
}

impl<T> ItemResult<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run `f(item)` for every item concurrently
///
/// The returned vector has `items.len()` entries and `results[i]` belongs to
/// `items[i]` regardless of completion order.
pub async fn execute<T, F, Fut>(items: &[String], f: F) -> Vec<ItemResult<T>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    debug!(count = items.len(), "parallel::execute: called");
    let handles: Vec<_> = items.iter().map(|item| tokio::spawn(f(item.clone()))).collect();

    // join_all yields outputs in handle order, so slot i is always item i
    let joined = join_all(handles).await;

    let results: Vec<ItemResult<T>> = items
        .iter()
        .zip(joined)
        .map(|(item, joined)| {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(%item, error = %e, "parallel::execute: task did not complete");
                    let what = if e.is_panic() { "panicked" } else { "was cancelled" };
                    Err(FaError::new(
                        ErrorCode::TaskPanicked,
                        format!("Operation for '{}' {}", item, what),
                    ))
                }
            };
            ItemResult {
                item: item.clone(),
                result,
            }
        })
        .collect();

    debug!(
        ok = results.iter().filter(|r| r.is_ok()).count(),
        total = results.len(),
        "parallel::execute: completed"
    );
    results
}
