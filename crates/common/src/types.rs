use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Represents a price, typically using a high-precision decimal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(pub Decimal);

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a financial asset, identified by a symbol string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Asset(pub String);

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Asset(s.to_uppercase())
    }
}

/// Represents a pair of assets for trading.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    /// The base asset of the pair.
    pub base: Asset,
    /// The quote asset of the pair.
    pub quote: Asset,
}

impl AssetPair {
    /// Creates a new asset pair.
    pub fn new(base: Asset, quote: Asset) -> Self {
        AssetPair { base, quote }
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for AssetPair {
    type Err = crate::errors::CommonError;

    /// Parses a pair from its "BASE/QUOTE" display form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(AssetPair::new(Asset::from(base), Asset::from(quote)))
            }
            _ => Err(crate::errors::CommonError::Decode(format!(
                "invalid asset pair: {}",
                s
            ))),
        }
    }
}

/// Represents a unique identifier for an exchange.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExchangeId(pub String);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        ExchangeId(s.to_string())
    }
}

/// Key under which a quote is cached: one entry per exchange per pair.
pub type QuoteKey = (ExchangeId, AssetPair);

/// A single exchange's current buy/sell prices for one pair.
///
/// Immutable once constructed; produced by a feed decoder. A crossed book
/// (sell below buy) is a valid observation, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub exchange: ExchangeId,
    pub pair: AssetPair,
    /// Price at which the base asset can be bought on this exchange.
    pub buy_price: Price,
    /// Price at which the base asset can be sold on this exchange.
    pub sell_price: Price,
    /// Exchange-reported observation time.
    pub observed_at: DateTime<Utc>,
    /// Advisory top-of-book volume, when the feed provides one.
    pub volume_hint: Option<Decimal>,
}

impl Quote {
    pub fn key(&self) -> QuoteKey {
        (self.exchange.clone(), self.pair.clone())
    }
}

/// A quote plus the local ingestion time used for staleness checks.
///
/// `received_at` is distinct from the exchange-reported `observed_at` and is
/// monotonically non-decreasing per key.
#[derive(Debug, Clone)]
pub struct CachedQuote {
    pub quote: Quote,
    pub received_at: Instant,
}

impl CachedQuote {
    /// Local age of the entry.
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// Whether the entry was received within the given staleness window.
    pub fn is_fresh(&self, window: Duration) -> bool {
        self.age() <= window
    }
}

/// A buy-exchange/sell-exchange route.
pub type RouteKey = (ExchangeId, ExchangeId);

/// A detected, currently-profitable route after fees and withholding tax.
///
/// Derived per detection cycle and never persisted by this workspace.
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub pair: AssetPair,
    pub buy_exchange: ExchangeId,
    pub sell_exchange: ExchangeId,
    pub buy_price: Price,
    pub sell_price: Price,
    pub assumed_volume: Decimal,
    pub gross_profit: Decimal,
    pub trading_fees: Decimal,
    pub withholding_tax: Decimal,
    pub net_profit: Decimal,
    /// Net profit as a percentage of the assumed volume. Derived last;
    /// never fed back into further arithmetic.
    pub profit_percent: Decimal,
    pub detected_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn route(&self) -> RouteKey {
        (self.buy_exchange.clone(), self.sell_exchange.clone())
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} buy@{}={} sell@{}={} net={} ({}%)",
            self.pair,
            self.buy_exchange,
            self.buy_price,
            self.sell_exchange,
            self.sell_price,
            self.net_profit,
            self.profit_percent.round_dp(4),
        )
    }
}

/// Lifecycle state of one exchange connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Initial handshake/subscription in progress.
    Connecting,
    /// Connected and live.
    Open,
    /// Connected but the liveness deadline has passed.
    Degraded,
    /// Disconnected; reconnect attempts in progress.
    Reconnecting,
    /// Terminal. Reached only by explicit stop or reconnect exhaustion.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Open => write!(f, "OPEN"),
            ConnectionState::Degraded => write!(f, "DEGRADED"),
            ConnectionState::Reconnecting => write!(f, "RECONNECTING"),
            ConnectionState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Connection status published for external monitoring collaborators.
#[derive(Debug, Clone, Serialize)]
pub enum StatusEvent {
    /// A supervisor moved to a new lifecycle state.
    StateChanged {
        exchange: ExchangeId,
        state: ConnectionState,
        at: DateTime<Utc>,
    },
    /// Terminal signal: reconnect attempts are exhausted and the feed is
    /// closed until explicitly restarted.
    FeedUnavailable {
        exchange: ExchangeId,
        attempts: u32,
        at: DateTime<Utc>,
    },
}

impl StatusEvent {
    pub fn exchange(&self) -> &ExchangeId {
        match self {
            StatusEvent::StateChanged { exchange, .. } => exchange,
            StatusEvent::FeedUnavailable { exchange, .. } => exchange,
        }
    }
}
