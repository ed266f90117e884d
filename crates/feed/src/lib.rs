//! # Exchange Feed Crate
//!
//! Keeps one connection per exchange alive and turns exchange-native frames
//! into canonical quotes. Each feed runs under its own
//! [`supervisor::ConnectionSupervisor`] task; a failing feed reconnects with
//! backoff and, at worst, closes itself without touching its siblings.

pub mod codec;
pub mod metrics;
pub mod supervisor;
pub mod transport;

pub use codec::{codec_for, FeedMessage, QuoteCodec};
pub use metrics::{FeedMetrics, FeedMetricsSnapshot};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig};
pub use transport::{FeedConnection, FeedTransport, TransportMessage, WsTransport};
