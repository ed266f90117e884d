//! Integration tests for the detection pipeline.

use chrono::Utc;
use common::types::Price;
use common::{Asset, AssetPair, ExchangeId, Opportunity, Quote};
use detector::{
    AlertThrottle, ArbitrageDetector, DetectorService, FeeSchedule, PriceCache, ProfitModel,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

fn usdt_inr() -> AssetPair {
    AssetPair::new(Asset::from("usdt"), Asset::from("inr"))
}

fn quote(exchange: &str, buy: Decimal, sell: Decimal) -> Quote {
    Quote {
        exchange: ExchangeId::from(exchange),
        pair: usdt_inr(),
        buy_price: Price(buy),
        sell_price: Price(sell),
        observed_at: Utc::now(),
        volume_hint: None,
    }
}

fn test_model() -> ProfitModel {
    let mut fees = HashMap::new();
    for exchange in ["wazirx", "coindcx", "binance"] {
        fees.insert(
            ExchangeId::from(exchange),
            FeeSchedule {
                maker_rate: dec!(0.001),
                taker_rate: dec!(0.002),
            },
        );
    }
    ProfitModel {
        assumed_volume: dec!(5000),
        withholding_rate: dec!(0.01),
        withholding_threshold: dec!(10000),
        fees,
        default_fee: FeeSchedule::default(),
    }
}

struct Pipeline {
    quote_tx: mpsc::Sender<Quote>,
    opportunity_rx: mpsc::Receiver<Opportunity>,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<Result<(), common::CommonError>>,
}

fn start_pipeline(cooldown: Duration) -> Pipeline {
    let (quote_tx, quote_rx) = mpsc::channel(64);
    let (opportunity_tx, opportunity_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let service = DetectorService::new(
        Arc::new(PriceCache::new(Duration::from_secs(60))),
        ArbitrageDetector::new(test_model()),
        AlertThrottle::new(cooldown),
        quote_rx,
        opportunity_tx,
        shutdown_rx,
        Duration::from_secs(30),
    );

    Pipeline {
        quote_tx,
        opportunity_rx,
        shutdown_tx,
        handle: service.spawn(),
    }
}

#[tokio::test]
async fn test_one_directional_opportunity_end_to_end() {
    let mut pipeline = start_pipeline(Duration::from_secs(30));

    // Three feeds report: wazirx asks 83.0, coindcx bids 84.5, binance is
    // wide on both sides. Only wazirx -> coindcx clears the fees.
    pipeline
        .quote_tx
        .send(quote("binance", dec!(84.9), dec!(83.0)))
        .await
        .unwrap();
    pipeline
        .quote_tx
        .send(quote("wazirx", dec!(83.0), dec!(82.9)))
        .await
        .unwrap();
    pipeline
        .quote_tx
        .send(quote("coindcx", dec!(84.6), dec!(84.5)))
        .await
        .unwrap();

    let opportunity = timeout(Duration::from_secs(2), pipeline.opportunity_rx.recv())
        .await
        .expect("no opportunity emitted")
        .expect("channel closed");

    assert_eq!(opportunity.buy_exchange, ExchangeId::from("wazirx"));
    assert_eq!(opportunity.sell_exchange, ExchangeId::from("coindcx"));
    assert!(opportunity.net_profit > Decimal::ZERO);
    assert_eq!(opportunity.withholding_tax, Decimal::ZERO);

    // The reverse route never fires in this cycle.
    let extra = timeout(Duration::from_millis(200), pipeline.opportunity_rx.recv()).await;
    match extra {
        Err(_) => {}
        Ok(Some(opp)) => {
            assert!(
                !(opp.buy_exchange == ExchangeId::from("coindcx")
                    && opp.sell_exchange == ExchangeId::from("wazirx")),
                "reverse route must not be profitable"
            );
        }
        Ok(None) => panic!("pipeline closed unexpectedly"),
    }

    pipeline.shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(1), pipeline.handle)
        .await
        .expect("service did not shut down")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_persisting_spread_is_throttled() {
    let mut pipeline = start_pipeline(Duration::from_secs(30));

    pipeline
        .quote_tx
        .send(quote("wazirx", dec!(83.0), dec!(82.9)))
        .await
        .unwrap();
    pipeline
        .quote_tx
        .send(quote("coindcx", dec!(84.6), dec!(84.5)))
        .await
        .unwrap();

    let first = timeout(Duration::from_secs(2), pipeline.opportunity_rx.recv())
        .await
        .expect("no opportunity emitted")
        .expect("channel closed");
    assert_eq!(first.buy_exchange, ExchangeId::from("wazirx"));

    // The same spread keeps ticking; every re-detection inside the cooldown
    // window is suppressed.
    for _ in 0..5 {
        pipeline
            .quote_tx
            .send(quote("coindcx", dec!(84.6), dec!(84.5)))
            .await
            .unwrap();
    }
    let suppressed = timeout(Duration::from_millis(300), pipeline.opportunity_rx.recv()).await;
    assert!(suppressed.is_err(), "cooldown window must suppress repeats");

    pipeline.shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(1), pipeline.handle)
        .await
        .expect("service did not shut down")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_service_stops_when_producers_are_gone() {
    let pipeline = start_pipeline(Duration::from_secs(30));

    drop(pipeline.quote_tx);

    let result = timeout(Duration::from_secs(1), pipeline.handle)
        .await
        .expect("service did not stop after the quote stream ended")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_flat_market_emits_nothing() {
    let mut pipeline = start_pipeline(Duration::from_secs(30));

    pipeline
        .quote_tx
        .send(quote("wazirx", dec!(83.0), dec!(82.9)))
        .await
        .unwrap();
    pipeline
        .quote_tx
        .send(quote("coindcx", dec!(83.0), dec!(82.9)))
        .await
        .unwrap();

    let nothing = timeout(Duration::from_millis(300), pipeline.opportunity_rx.recv()).await;
    assert!(nothing.is_err(), "flat market must not emit");

    pipeline.shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(1), pipeline.handle)
        .await
        .expect("service did not shut down")
        .unwrap()
        .unwrap();
}
