//! Per-feed health counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by one supervisor, readable from any task.
#[derive(Debug, Default)]
pub struct FeedMetrics {
    messages_received: AtomicU64,
    quotes_published: AtomicU64,
    decode_failures: AtomicU64,
    reconnections: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedMetricsSnapshot {
    pub messages_received: u64,
    pub quotes_published: u64,
    pub decode_failures: u64,
    pub reconnections: u64,
}

impl FeedMetrics {
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quote(&self) {
        self.quotes_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnection(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FeedMetricsSnapshot {
        FeedMetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            quotes_published: self.quotes_published.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
        }
    }
}
