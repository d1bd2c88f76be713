//! Bounded worker pool
//!
//! Every per-item pipeline in the audit runs through [`WorkerPool::run`]:
//! the caller supplies the items, the per-item async function and the
//! concurrency limit; the pool owns fan-out, fan-in and progress logging.
//!
//! All items are queued before the first one starts. At most `limit` items are
//! in flight at once. Results come back in completion order, not input order.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Progress is logged every this many completed items
const PROGRESS_INTERVAL: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    limit: usize,
    label: &'static str,
}

impl WorkerPool {
    /// Pool running at most `limit` items concurrently (at least one)
    pub fn new(label: &'static str, limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            label,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `job` over every item and collect the results
    pub async fn run<T, R, F, Fut>(&self, items: impl IntoIterator<Item = T>, job: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let queue: Vec<T> = items.into_iter().collect();
        let total = queue.len();
        let completed = AtomicUsize::new(0);
        let label = self.label;

        info!(pool = label, total, workers = self.limit, "Worker pool starting");

        let results: Vec<R> = stream::iter(queue)
            .map(|item| {
                let work = job(item);
                let completed = &completed;
                async move {
                    let result = work.await;
                    let current = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if current % PROGRESS_INTERVAL == 0 || current == total {
                        info!(
                            pool = label,
                            progress = format!("{}/{}", current, total),
                            "Worker pool progress"
                        );
                    }
                    result
                }
            })
            .buffer_unordered(self.limit)
            .collect()
            .await;

        info!(pool = label, completed = results.len(), "Worker pool finished");
        results
    }
}
