//! Per-exchange wire decoders.
//!
//! Each venue dialect is a closed [`QuoteCodec`] implementation that turns
//! exchange-native frames into the canonical [`Quote`]. Anything a codec
//! cannot interpret is a decode error for the supervisor to log and drop,
//! never a crash.

use common::types::Price;
use common::{AssetPair, CommonError, ExchangeId, Quote};
use rust_decimal::Decimal;
use std::str::FromStr;

pub mod binance;
pub mod coindcx;
pub mod wazirx;

pub use binance::BinanceCodec;
pub use coindcx::CoindcxCodec;
pub use wazirx::WazirxCodec;

/// Decoded meaning of one inbound feed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A normalized quote for the watched pair.
    Quote(Quote),
    /// Application-level liveness signal (pong or ping reply).
    Heartbeat,
    /// Subscription acknowledgement.
    SubscribeAck,
    /// Well-formed frame with no quote content for the watched pair.
    Ignored,
}

/// Exchange dialect: builds subscribe/heartbeat frames and decodes inbound
/// text.
pub trait QuoteCodec: Send + Sync {
    fn exchange(&self) -> &ExchangeId;

    fn pair(&self) -> &AssetPair;

    /// Subscribe frame sent once after the handshake. `None` when the
    /// subscription is carried in the connection URL.
    fn subscribe_message(&self) -> Option<String>;

    /// Whether the venue acknowledges subscriptions before data flows.
    fn expects_subscribe_ack(&self) -> bool {
        false
    }

    /// Application-level heartbeat frame; `None` falls back to a protocol
    /// ping.
    fn heartbeat_message(&self) -> Option<String> {
        None
    }

    fn decode(&self, raw: &str) -> Result<FeedMessage, CommonError>;
}

/// Builds the codec for a configured venue dialect.
pub fn codec_for(
    dialect: &str,
    exchange: ExchangeId,
    pair: AssetPair,
) -> Result<Box<dyn QuoteCodec>, CommonError> {
    match dialect {
        "binance" => Ok(Box::new(BinanceCodec::new(exchange, pair))),
        "wazirx" => Ok(Box::new(WazirxCodec::new(exchange, pair))),
        "coindcx" => Ok(Box::new(CoindcxCodec::new(exchange, pair))),
        other => Err(CommonError::InvalidConfiguration(format!(
            "unknown feed dialect: {}",
            other
        ))),
    }
}

/// Parses a strictly positive price field.
pub(crate) fn parse_price(field: &str, value: &str) -> Result<Price, CommonError> {
    let parsed = Decimal::from_str(value)
        .map_err(|e| CommonError::Decode(format!("bad {} '{}': {}", field, value, e)))?;
    if parsed <= Decimal::ZERO {
        return Err(CommonError::Decode(format!(
            "non-positive {} '{}'",
            field, value
        )));
    }
    Ok(Price(parsed))
}

/// Parses a non-negative volume field.
pub(crate) fn parse_volume(field: &str, value: &str) -> Result<Decimal, CommonError> {
    let parsed = Decimal::from_str(value)
        .map_err(|e| CommonError::Decode(format!("bad {} '{}': {}", field, value, e)))?;
    if parsed < Decimal::ZERO {
        return Err(CommonError::Decode(format!(
            "negative {} '{}'",
            field, value
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Asset;

    #[test]
    fn test_codec_for_known_dialects() {
        let pair = AssetPair::new(Asset::from("usdt"), Asset::from("inr"));
        for dialect in ["binance", "wazirx", "coindcx"] {
            let codec = codec_for(dialect, ExchangeId::from(dialect), pair.clone()).unwrap();
            assert_eq!(codec.exchange(), &ExchangeId::from(dialect));
        }
    }

    #[test]
    fn test_codec_for_unknown_dialect() {
        let pair = AssetPair::new(Asset::from("usdt"), Asset::from("inr"));
        let err = codec_for("kraken", ExchangeId::from("kraken"), pair).err().unwrap();
        assert!(matches!(err, CommonError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_parse_price_rejects_zero_and_garbage() {
        assert!(parse_price("bid", "83.20").is_ok());
        assert!(parse_price("bid", "0").is_err());
        assert!(parse_price("bid", "-1").is_err());
        assert!(parse_price("bid", "abc").is_err());
    }

    #[test]
    fn test_parse_volume_allows_zero() {
        assert!(parse_volume("qty", "0").is_ok());
        assert!(parse_volume("qty", "-2").is_err());
    }
}
