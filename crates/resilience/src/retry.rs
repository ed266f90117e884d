//! Bounded retry with capped exponential backoff.

use std::fmt::{Debug, Display};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Backoff schedule shared by every retried operation, including feed
/// reconnects.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempt budget, first attempt included.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Growth factor applied per further attempt.
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay inserted before the given 1-based attempt. The first attempt
    /// runs immediately; attempt k (k >= 2) waits
    /// `min(initial_delay * multiplier^(k - 2), max_delay)`. No jitter.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi((attempt - 2) as i32);
        if !factor.is_finite() || self.initial_delay.as_secs_f64() * factor >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }
}

/// Terminal outcome of a retried operation that never succeeded.
#[derive(Debug, Error, PartialEq)]
pub enum RetryError<E: Display + Debug> {
    /// The attempt budget ran out; carries the final underlying error.
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    /// The retry predicate rejected the error. The original error is
    /// surfaced unchanged rather than wrapped in exhaustion bookkeeping.
    #[error("{0}")]
    Rejected(E),
}

impl<E: Display + Debug> RetryError<E> {
    /// The underlying error, whichever way the retry loop ended.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Rejected(err) => err,
        }
    }
}

type RetryPredicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;
type RetryObserver<E> = Box<dyn Fn(&E, u32, Duration) + Send + Sync>;

/// Drives an asynchronous operation through a [`RetryPolicy`].
///
/// By default every error is retryable and no observer is installed.
pub struct Retrier<E> {
    policy: RetryPolicy,
    should_retry: RetryPredicate<E>,
    on_retry: Option<RetryObserver<E>>,
}

impl<E: Display + Debug> Retrier<E> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            should_retry: Box::new(|_| true),
            on_retry: None,
        }
    }

    /// Installs a predicate deciding whether an error is worth retrying.
    pub fn with_should_retry(
        mut self,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Box::new(predicate);
        self
    }

    /// Installs an observer invoked as `(error, attempt, delay)` before each
    /// backoff wait. Purely observational; it cannot affect control flow.
    pub fn with_on_retry(
        mut self,
        observer: impl Fn(&E, u32, Duration) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Box::new(observer));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs the operation until it succeeds, the predicate rejects an error,
    /// or the attempt budget is exhausted.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !(self.should_retry)(&err) {
                        return Err(RetryError::Rejected(err));
                    }
                    if attempt >= self.policy.max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    let delay = self.policy.delay_before(attempt + 1);
                    if let Some(observer) = &self.on_retry {
                        observer(&err, attempt, delay);
                    }
                    log::debug!(
                        "attempt {} failed ({}); retrying in {:?}",
                        attempt,
                        err,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
