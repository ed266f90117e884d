//! Circuit breaker protecting a repeatedly-failing operation.
//!
//! Trips open after a run of consecutive failures, fails fast while open,
//! and admits a single probe call once the reset timeout has elapsed.

use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Configuration for the circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit trips open.
    pub failure_threshold: u32,
    /// Cooldown after tripping before a probe call is admitted.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Observable state of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls fail fast without invoking the operation.
    Open,
    /// The reset timeout has elapsed; one probe call is allowed.
    HalfOpen,
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Error surface of a breaker-guarded call.
#[derive(Debug, Error, PartialEq)]
pub enum CircuitError<E: Display + Debug> {
    /// The breaker is open; the operation was not invoked.
    #[error("circuit open; call rejected")]
    Open,
    /// The operation ran and failed with its own error.
    #[error("{0}")]
    Inner(E),
}

type StateHook = Box<dyn Fn() + Send + Sync>;

/// Circuit breaker with lock-free fast paths.
///
/// The consecutive-failure counter only counts uninterrupted failures: any
/// success while closed resets it to zero.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    tripped: AtomicBool,
    probe_in_flight: AtomicBool,
    consecutive_failures: AtomicU32,
    tripped_at: Mutex<Option<Instant>>,
    on_open: Option<StateHook>,
    on_close: Option<StateHook>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field(
                "consecutive_failures",
                &self.consecutive_failures.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            tripped: AtomicBool::new(false),
            probe_in_flight: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            tripped_at: Mutex::new(None),
            on_open: None,
            on_close: None,
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Installs a hook fired once per closed-to-open transition.
    pub fn with_on_open(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Box::new(hook));
        self
    }

    /// Installs a hook fired when a probe call closes the breaker.
    pub fn with_on_close(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Get the current state.
    pub fn state(&self) -> CircuitState {
        if self.tripped.load(Ordering::Acquire) {
            if self.cooldown_elapsed() {
                CircuitState::HalfOpen
            } else {
                CircuitState::Open
            }
        } else {
            CircuitState::Closed
        }
    }

    /// Get the current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Runs the operation through the breaker.
    ///
    /// While open, returns [`CircuitError::Open`] immediately without
    /// invoking the operation. Once the reset timeout elapses, exactly one
    /// concurrent caller is admitted as the probe; its outcome closes or
    /// re-trips the breaker.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        E: Display + Debug,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if self.tripped.load(Ordering::Acquire) {
            if !self.cooldown_elapsed() {
                return Err(CircuitError::Open);
            }
            // Half-open: admit a single probe.
            if self
                .probe_in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(CircuitError::Open);
            }
            let result = operation().await;
            self.probe_in_flight.store(false, Ordering::Release);
            return match result {
                Ok(value) => {
                    self.close();
                    Ok(value)
                }
                Err(err) => {
                    log::warn!("circuit probe failed ({}); reopening", err);
                    self.restart_cooldown();
                    Err(CircuitError::Inner(err))
                }
            };
        }

        match operation().await {
            Ok(value) => {
                self.consecutive_failures.store(0, Ordering::Release);
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitError::Inner(err))
            }
        }
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.config.failure_threshold {
            self.trip();
        }
    }

    fn trip(&self) {
        // Fire the hook only on a fresh closed-to-open transition.
        if !self.tripped.swap(true, Ordering::AcqRel) {
            *self.tripped_at.lock().expect("breaker clock poisoned") = Some(Instant::now());
            log::warn!(
                "circuit tripped open after {} consecutive failures",
                self.consecutive_failures.load(Ordering::Acquire)
            );
            if let Some(hook) = &self.on_open {
                hook();
            }
        }
    }

    fn restart_cooldown(&self) {
        *self.tripped_at.lock().expect("breaker clock poisoned") = Some(Instant::now());
    }

    fn close(&self) {
        self.tripped.store(false, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        *self.tripped_at.lock().expect("breaker clock poisoned") = None;
        if let Some(hook) = &self.on_close {
            hook();
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        match *self.tripped_at.lock().expect("breaker clock poisoned") {
            Some(at) => at.elapsed() >= self.config.reset_timeout,
            None => true,
        }
    }
}
