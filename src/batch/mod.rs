//! Batch Coordinator
//!
//! Runs one operation per [`WorkItem`] on a bounded pool of tokio workers and
//! resolves the whole batch all-or-nothing:
//!
//! - every item succeeds: one [`ItemResult`] per distinct key, in submission order
//! - any item fails: the first failure observed is returned as [`BatchError`]
//!   and every partial success is discarded
//!
//! The first failure cancels a shared [`CancellationToken`]. Workers stop
//! pulling new items once it fires and the per-item operation receives the
//! token to check between its own storage calls. Calls already in flight run
//! to completion. Later failures are logged at debug and counted, never
//! returned. [`BatchCoordinator::run`] joins every worker before it resolves,
//! so no task outlives the call.
//!
//! Side effects of items that finished before a failure are not rolled back.
//!
//! # Example
//!
//! ```
//! use filelink::batch::{BatchCoordinator, BatchRequest};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let coordinator = BatchCoordinator::new(4);
//! let request: BatchRequest<u32> = [("a", 1), ("b", 2)].into_iter().collect();
//!
//! let results = coordinator
//!     .run("double", request, |item, _cancel| async move {
//!         Ok::<_, std::io::Error>(item.input * 2)
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(results[0].key, "a");
//! assert_eq!(results[1].value, 4);
//! # }
//! ```

use crate::config::BatchConfig;
use crate::metrics;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// The single aggregated failure of a batch
#[derive(Error, Debug)]
pub enum BatchError<E> {
    #[error("Item {key} failed: {source}")]
    Item {
        key: String,
        #[source]
        source: E,
    },

    #[error("Batch worker failed: {0}")]
    Worker(String),
}

impl<E> BatchError<E> {
    /// Key of the failing item, if the failure came from an item
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Item { key, .. } => Some(key),
            Self::Worker(_) => None,
        }
    }
}

/// One independent unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<T> {
    pub key: String,
    pub input: T,
}

/// Successful outcome of one [`WorkItem`], tagged by its key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult<R> {
    pub key: String,
    pub value: R,
}

/// Key-addressed collection of work items
///
/// Inserting an existing key replaces its input and keeps its original
/// position.
#[derive(Debug, Clone)]
pub struct BatchRequest<T> {
    items: Vec<WorkItem<T>>,
    positions: HashMap<String, usize>,
}

impl<T> BatchRequest<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Add an item, returning the input it replaced
    pub fn insert(&mut self, key: impl Into<String>, input: T) -> Option<T> {
        let key = key.into();
        match self.positions.get(&key) {
            Some(&index) => Some(std::mem::replace(&mut self.items[index].input, input)),
            None => {
                self.positions.insert(key.clone(), self.items.len());
                self.items.push(WorkItem { key, input });
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.key.as_str())
    }
}

impl<T> Default for BatchRequest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, T> FromIterator<(K, T)> for BatchRequest<T> {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        let mut request = Self::new();
        for (key, input) in iter {
            request.insert(key, input);
        }
        request
    }
}

impl<T> IntoIterator for BatchRequest<T> {
    type Item = WorkItem<T>;
    type IntoIter = std::vec::IntoIter<WorkItem<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

type WorkQueue<T> = Mutex<std::iter::Enumerate<std::vec::IntoIter<WorkItem<T>>>>;

/// Concurrent fan-out engine with first-error-wins aggregation
#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    max_concurrency: usize,
}

impl BatchCoordinator {
    /// Create a coordinator running at most `max_concurrency` items at once
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.max_concurrency)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run `op` for every item and resolve all-or-nothing
    ///
    /// `operation` labels the span and metrics. An empty request returns an
    /// empty result without invoking `op`.
    #[tracing::instrument(
        name = "batch.run",
        skip_all,
        fields(
            batch.operation = operation,
            batch.size = request.len(),
            batch.workers = tracing::field::Empty
        )
    )]
    pub async fn run<T, R, E, F, Fut>(
        &self,
        operation: &'static str,
        request: BatchRequest<T>,
        op: F,
    ) -> Result<Vec<ItemResult<R>>, BatchError<E>>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: std::fmt::Display + Send + 'static,
        F: Fn(WorkItem<T>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let size = request.len();
        if size == 0 {
            metrics::record_batch_run(operation, 0, true, 0.0);
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let workers = size.min(self.max_concurrency);
        tracing::Span::current().record("batch.workers", workers);

        let queue: Arc<WorkQueue<T>> = Arc::new(Mutex::new(request.into_iter().enumerate()));
        let cancel = CancellationToken::new();
        let failed = Arc::new(AtomicBool::new(false));
        let op = Arc::new(op);

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let worker = run_worker(
                operation,
                Arc::clone(&queue),
                Arc::clone(&op),
                cancel.clone(),
                Arc::clone(&failed),
            );
            set.spawn(worker.in_current_span());
        }

        // Barrier: every worker is joined before the batch resolves
        let mut completed = Vec::with_capacity(size);
        let mut failure = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(mut results)) => completed.append(&mut results),
                Ok(Err(err)) => failure = Some(err),
                Err(join_err) => {
                    if claim_failure(&failed) {
                        cancel.cancel();
                        tracing::error!(error = %join_err, "Batch worker panicked");
                        failure = Some(BatchError::Worker(join_err.to_string()));
                    } else {
                        tracing::debug!(error = %join_err, "Suppressed batch worker panic");
                        metrics::record_suppressed_failure(operation);
                    }
                }
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        if let Some(err) = failure {
            tracing::warn!(
                discarded = completed.len(),
                duration_secs = elapsed,
                "Batch failed"
            );
            metrics::record_batch_run(operation, size, false, elapsed);
            return Err(err);
        }

        completed.sort_unstable_by_key(|(index, _)| *index);
        tracing::debug!(duration_secs = elapsed, "Batch completed");
        metrics::record_batch_run(operation, size, true, elapsed);
        Ok(completed.into_iter().map(|(_, result)| result).collect())
    }
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

/// Take the first-error slot; true only for the first caller
fn claim_failure(failed: &AtomicBool) -> bool {
    failed
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

async fn run_worker<T, R, E, F, Fut>(
    operation: &'static str,
    queue: Arc<WorkQueue<T>>,
    op: Arc<F>,
    cancel: CancellationToken,
    failed: Arc<AtomicBool>,
) -> Result<Vec<(usize, ItemResult<R>)>, BatchError<E>>
where
    E: std::fmt::Display,
    F: Fn(WorkItem<T>, CancellationToken) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let mut completed = Vec::new();

    while !cancel.is_cancelled() {
        let next = queue.lock().next();
        let Some((index, item)) = next else {
            break;
        };

        let key = item.key.clone();
        match op(item, cancel.clone()).await {
            Ok(value) => completed.push((index, ItemResult { key, value })),
            Err(source) => {
                if claim_failure(&failed) {
                    cancel.cancel();
                    tracing::warn!(key = %key, error = %source, "Batch item failed, cancelling remaining items");
                    return Err(BatchError::Item { key, source });
                }
                tracing::debug!(key = %key, error = %source, "Suppressed batch item failure");
                metrics::record_suppressed_failure(operation);
                break;
            }
        }
    }

    Ok(completed)
}
