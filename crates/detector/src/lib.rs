//! # Arbitrage Detector Crate
//!
//! This crate turns the stream of normalized quotes into throttled
//! arbitrage opportunities: the shared price cache, the fee/tax-aware
//! profit model, the pairwise detector, the per-route alert throttle, and
//! the service loop tying them together over channels.

pub mod cache;
pub mod engine;
pub mod profit;
pub mod service;
pub mod throttle;

pub use cache::{PriceCache, WriteOutcome};
pub use engine::ArbitrageDetector;
pub use profit::{FeeSchedule, ProfitModel};
pub use service::DetectorService;
pub use throttle::AlertThrottle;
