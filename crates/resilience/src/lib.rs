//! # Resilience Crate
//!
//! Generic protection for outbound asynchronous calls: bounded retry with
//! capped exponential backoff, a circuit breaker, and batched execution with
//! a concurrency cap. The feed supervisors reuse [`RetryPolicy`] for their
//! reconnect schedule so every backoff in the system follows one algorithm.

pub mod batch;
pub mod breaker;
pub mod retry;

pub use batch::{run_batch, BatchOperation, BatchOptions, BatchOutcome};
pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState};
pub use retry::{Retrier, RetryError, RetryPolicy};
