//! Shared cache of the latest quote per exchange and pair.

use common::{CachedQuote, ExchangeId, Quote, QuoteKey};
use log::debug;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Outcome of a cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// First quote for this key.
    Inserted,
    /// Replaced an older quote for the same key.
    Updated,
    /// The quote predates the cached entry and was dropped.
    StaleDropped,
}

/// Latest-quote cache with an out-of-order guard and a bounded staleness
/// window per exchange.
///
/// Writers hold the lock only for the upsert; readers get a cloned
/// point-in-time snapshot, so no partial write is ever visible.
pub struct PriceCache {
    entries: RwLock<HashMap<QuoteKey, CachedQuote>>,
    default_window: Duration,
    windows: HashMap<ExchangeId, Duration>,
}

impl PriceCache {
    pub fn new(default_window: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_window,
            windows: HashMap::new(),
        }
    }

    /// Overrides the staleness window for one exchange (typically twice its
    /// heartbeat interval).
    pub fn with_exchange_window(mut self, exchange: ExchangeId, window: Duration) -> Self {
        self.windows.insert(exchange, window);
        self
    }

    fn window_for(&self, exchange: &ExchangeId) -> Duration {
        self.windows
            .get(exchange)
            .copied()
            .unwrap_or(self.default_window)
    }

    /// Upserts the quote for its exchange+pair key.
    ///
    /// A quote whose `observed_at` is older than the cached entry is
    /// silently dropped, so late-arriving messages never regress the cache.
    /// `received_at` is stamped here and is monotonically non-decreasing.
    pub fn write(&self, quote: Quote) -> WriteOutcome {
        let key = quote.key();
        let mut entries = self.entries.write().expect("price cache lock poisoned");
        match entries.get(&key) {
            Some(existing) if quote.observed_at < existing.quote.observed_at => {
                debug!(
                    "dropping out-of-order quote for {}/{} ({} < {})",
                    key.0, key.1, quote.observed_at, existing.quote.observed_at
                );
                WriteOutcome::StaleDropped
            }
            Some(_) => {
                entries.insert(
                    key,
                    CachedQuote {
                        quote,
                        received_at: Instant::now(),
                    },
                );
                WriteOutcome::Updated
            }
            None => {
                entries.insert(
                    key,
                    CachedQuote {
                        quote,
                        received_at: Instant::now(),
                    },
                );
                WriteOutcome::Inserted
            }
        }
    }

    /// Point-in-time snapshot of every cached quote.
    pub fn snapshot(&self) -> Vec<CachedQuote> {
        self.entries
            .read()
            .expect("price cache lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Freshness per exchange: true iff the exchange has at least one entry
    /// within its staleness window.
    pub fn read_status(&self) -> HashMap<ExchangeId, bool> {
        let entries = self.entries.read().expect("price cache lock poisoned");
        let mut status: HashMap<ExchangeId, bool> = HashMap::new();
        for ((exchange, _), cached) in entries.iter() {
            let fresh = cached.is_fresh(self.window_for(exchange));
            status
                .entry(exchange.clone())
                .and_modify(|s| *s = *s || fresh)
                .or_insert(fresh);
        }
        status
    }

    /// Evicts entries older than their exchange's staleness window. Returns
    /// the number of entries removed.
    pub fn prune_stale(&self) -> usize {
        let mut entries = self.entries.write().expect("price cache lock poisoned");
        let before = entries.len();
        entries.retain(|(exchange, _), cached| cached.is_fresh(self.window_for(exchange)));
        before - entries.len()
    }
}
