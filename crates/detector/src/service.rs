//! Channel-driven detection loop.

use crate::cache::{PriceCache, WriteOutcome};
use crate::engine::ArbitrageDetector;
use crate::throttle::AlertThrottle;
use common::{CommonError, Opportunity, Quote};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Consumes quotes from the feed supervisors, maintains the shared cache,
/// and emits throttled opportunities.
///
/// Detection runs inline on every accepted write, always against a
/// consistent snapshot. A periodic tick additionally prunes entries whose
/// feed has gone quiet so a dead exchange ages out of coverage.
pub struct DetectorService {
    cache: Arc<PriceCache>,
    detector: ArbitrageDetector,
    throttle: AlertThrottle,
    quote_rx: mpsc::Receiver<Quote>,
    opportunity_tx: mpsc::Sender<Opportunity>,
    shutdown_rx: watch::Receiver<bool>,
    prune_interval: Duration,
}

impl DetectorService {
    pub fn new(
        cache: Arc<PriceCache>,
        detector: ArbitrageDetector,
        throttle: AlertThrottle,
        quote_rx: mpsc::Receiver<Quote>,
        opportunity_tx: mpsc::Sender<Opportunity>,
        shutdown_rx: watch::Receiver<bool>,
        prune_interval: Duration,
    ) -> Self {
        Self {
            cache,
            detector,
            throttle,
            quote_rx,
            opportunity_tx,
            shutdown_rx,
            prune_interval,
        }
    }

    /// Spawns the service onto the runtime.
    pub fn spawn(self) -> JoinHandle<Result<(), CommonError>> {
        tokio::spawn(self.run())
    }

    /// Runs until shutdown or until every quote producer is gone.
    pub async fn run(mut self) -> Result<(), CommonError> {
        let mut prune = interval(self.prune_interval);
        prune.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    info!("detector service shutting down");
                    return Ok(());
                }
                _ = prune.tick() => {
                    let removed = self.cache.prune_stale();
                    if removed > 0 {
                        debug!("pruned {} stale cache entries", removed);
                    }
                }
                maybe_quote = self.quote_rx.recv() => match maybe_quote {
                    Some(quote) => self.on_quote(quote).await?,
                    None => {
                        info!("quote stream ended; detector service stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn on_quote(&mut self, quote: Quote) -> Result<(), CommonError> {
        match self.cache.write(quote) {
            // Out-of-order delivery; nothing new to evaluate.
            WriteOutcome::StaleDropped => return Ok(()),
            WriteOutcome::Inserted | WriteOutcome::Updated => {}
        }

        let snapshot = self.cache.snapshot();
        for opportunity in self.detector.evaluate(&snapshot) {
            if self.throttle.should_emit(&opportunity) {
                info!("arbitrage opportunity: {}", opportunity);
                if self.opportunity_tx.send(opportunity).await.is_err() {
                    return Err(CommonError::ChannelClosed(
                        "opportunity receiver dropped".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}
