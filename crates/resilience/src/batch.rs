//! Concurrent execution of a set of named operations.

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::future::Future;

/// One named operation inside a batch.
pub struct BatchOperation<T, E> {
    pub name: String,
    /// A failing critical operation aborts the batch when
    /// `continue_on_error` is off.
    pub critical: bool,
    future: BoxFuture<'static, Result<T, E>>,
}

impl<T, E> BatchOperation<T, E> {
    pub fn new(
        name: impl Into<String>,
        future: impl Future<Output = Result<T, E>> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            critical: false,
            future: Box::pin(future),
        }
    }

    /// Marks this operation as critical.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// Batch-wide execution options.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum operations in flight at once. `None` runs everything
    /// concurrently.
    pub concurrency_limit: Option<usize>,
    /// When off, a failing critical operation aborts the whole batch.
    pub continue_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: None,
            continue_on_error: true,
        }
    }
}

/// Per-operation outcome, in completion order.
#[derive(Debug)]
pub struct BatchOutcome<T, E> {
    pub name: String,
    pub result: Result<T, E>,
}

/// Runs the operations with the configured concurrency cap, collecting one
/// outcome per operation.
///
/// If a critical operation fails while `continue_on_error` is off, its error
/// propagates immediately and in-flight siblings are dropped.
pub async fn run_batch<T, E>(
    operations: Vec<BatchOperation<T, E>>,
    options: &BatchOptions,
) -> Result<Vec<BatchOutcome<T, E>>, E> {
    let limit = options.concurrency_limit.unwrap_or(operations.len().max(1));
    let mut outcomes = Vec::with_capacity(operations.len());

    let mut in_flight = stream::iter(operations.into_iter().map(|op| {
        let BatchOperation {
            name,
            critical,
            future,
        } = op;
        async move { (name, critical, future.await) }
    }))
    .buffer_unordered(limit);

    while let Some((name, critical, result)) = in_flight.next().await {
        match result {
            Err(err) if critical && !options.continue_on_error => {
                log::warn!("critical batch operation '{}' failed; aborting batch", name);
                return Err(err);
            }
            result => outcomes.push(BatchOutcome { name, result }),
        }
    }

    Ok(outcomes)
}
