use anyhow::Result;
use clap::Parser;
use common::StatusEvent;
use config::AppConfig;
use detector::{
    AlertThrottle, ArbitrageDetector, DetectorService, FeeSchedule, PriceCache, ProfitModel,
};
use feed::{codec_for, ConnectionSupervisor, FeedTransport, SupervisorConfig, WsTransport};
use resilience::RetryPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Command line arguments for arb-monitor.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the monitor configuration YAML
    #[arg(long, default_value = "config/default.yml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let cfg = AppConfig::load(&args.config)?;
    cfg.validate()?;

    // Channels between the feeds, the detector, and the consumers.
    let (quote_tx, quote_rx) = mpsc::channel(256);
    let (status_tx, mut status_rx) = mpsc::channel(64);
    let (opportunity_tx, mut opportunity_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The cache treats an exchange as stale after twice its heartbeat.
    let mut cache = PriceCache::new(Duration::from_secs(60));
    let mut fees = HashMap::new();
    for exchange in &cfg.exchanges {
        cache = cache.with_exchange_window(
            exchange.exchange_id(),
            Duration::from_secs(exchange.heartbeat_interval_secs * 2),
        );
        fees.insert(
            exchange.exchange_id(),
            FeeSchedule {
                maker_rate: exchange.maker_fee_rate,
                taker_rate: exchange.taker_fee_rate,
            },
        );
    }
    let cache = Arc::new(cache);

    let model = ProfitModel {
        assumed_volume: cfg.detector.assumed_volume,
        withholding_rate: cfg.detector.withholding_rate,
        withholding_threshold: cfg.detector.withholding_threshold,
        fees,
        default_fee: FeeSchedule::default(),
    };

    let service = DetectorService::new(
        Arc::clone(&cache),
        ArbitrageDetector::new(model),
        AlertThrottle::new(Duration::from_secs(cfg.alerts.cooldown_secs)),
        quote_rx,
        opportunity_tx,
        shutdown_rx.clone(),
        Duration::from_secs(cfg.detector.prune_interval_secs),
    );
    let detector_handle = service.spawn();

    // One supervisor task per configured exchange.
    let transport: Arc<dyn FeedTransport> = Arc::new(WsTransport);
    let mut feed_handles = Vec::new();
    for exchange in &cfg.exchanges {
        let codec = codec_for(
            &exchange.dialect,
            exchange.exchange_id(),
            exchange.asset_pair()?,
        )?;
        let supervisor = ConnectionSupervisor::new(
            SupervisorConfig {
                exchange: exchange.exchange_id(),
                url: exchange.url.clone(),
                heartbeat_interval: Duration::from_secs(exchange.heartbeat_interval_secs),
                missed_beat_tolerance: exchange.missed_beat_tolerance,
                max_reconnect_attempts: exchange.max_reconnect_attempts,
                retry: RetryPolicy {
                    max_attempts: exchange.max_reconnect_attempts,
                    initial_delay: Duration::from_millis(exchange.backoff.initial_delay_ms),
                    backoff_multiplier: exchange.backoff.multiplier,
                    max_delay: Duration::from_millis(exchange.backoff.max_delay_ms),
                },
            },
            Arc::clone(&transport),
            Arc::from(codec),
            quote_tx.clone(),
            status_tx.clone(),
            shutdown_rx.clone(),
        );
        info!(exchange = %exchange.name, url = %exchange.url, "starting feed");
        feed_handles.push((exchange.name.clone(), supervisor.spawn()));
    }
    drop(quote_tx);
    drop(status_tx);

    // Consumers log both outbound streams in emission order; anything beyond
    // that (alerting, execution) subscribes at these boundaries.
    let opportunity_consumer = tokio::spawn(async move {
        while let Some(opportunity) = opportunity_rx.recv().await {
            info!(%opportunity, "arbitrage opportunity");
        }
    });
    let status_consumer = tokio::spawn(async move {
        while let Some(event) = status_rx.recv().await {
            match event {
                StatusEvent::StateChanged {
                    exchange, state, ..
                } => info!(%exchange, %state, "feed state"),
                StatusEvent::FeedUnavailable {
                    exchange, attempts, ..
                } => warn!(%exchange, attempts, "feed unavailable"),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // Graceful shutdown
    shutdown_tx.send(true).ok();

    for (name, handle) in feed_handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(exchange = %name, error = %e, "feed exited with error"),
            Err(e) => error!(exchange = %name, error = %e, "feed task panicked"),
        }
    }
    if let Err(e) = detector_handle.await.expect("detector task panicked") {
        error!(error = %e, "detector exited with error");
    }
    opportunity_consumer.await.ok();
    status_consumer.await.ok();

    Ok(())
}
