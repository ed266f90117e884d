//! CoinDCX price-change dialect.
//!
//! Channels are joined per market; the venue confirms the join and answers
//! application-level pings.

use super::{parse_price, parse_volume, FeedMessage, QuoteCodec};
use chrono::{DateTime, Utc};
use common::{AssetPair, CommonError, ExchangeId, Quote};
use serde::Deserialize;

/// `{"event":"price-change","payload":{"market":"USDTINR","bid":"83.05",
/// "ask":"83.25","volume":"420","timestamp":1631682384}}`
#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    payload: Option<PriceChangePayload>,
}

#[derive(Debug, Deserialize)]
struct PriceChangePayload {
    market: String,
    bid: String,
    ask: String,
    #[serde(default)]
    volume: Option<String>,
    /// Seconds since the epoch.
    timestamp: i64,
}

pub struct CoindcxCodec {
    exchange: ExchangeId,
    pair: AssetPair,
    market: String,
}

impl CoindcxCodec {
    pub fn new(exchange: ExchangeId, pair: AssetPair) -> Self {
        let market = format!("{}{}", pair.base, pair.quote).to_uppercase();
        Self {
            exchange,
            pair,
            market,
        }
    }
}

impl QuoteCodec for CoindcxCodec {
    fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    fn pair(&self) -> &AssetPair {
        &self.pair
    }

    fn subscribe_message(&self) -> Option<String> {
        Some(
            serde_json::json!({
                "event": "join",
                "channel": self.market,
            })
            .to_string(),
        )
    }

    fn expects_subscribe_ack(&self) -> bool {
        true
    }

    fn heartbeat_message(&self) -> Option<String> {
        Some(serde_json::json!({ "event": "ping" }).to_string())
    }

    fn decode(&self, raw: &str) -> Result<FeedMessage, CommonError> {
        let frame: Frame = serde_json::from_str(raw)
            .map_err(|e| CommonError::Decode(format!("invalid json: {}", e)))?;

        match frame.event.as_str() {
            "pong" => Ok(FeedMessage::Heartbeat),
            "joined" => Ok(FeedMessage::SubscribeAck),
            "price-change" => {
                let payload = frame.payload.ok_or_else(|| {
                    CommonError::Decode("price-change without payload".to_string())
                })?;
                if payload.market != self.market {
                    return Ok(FeedMessage::Ignored);
                }

                let observed_at: DateTime<Utc> = DateTime::from_timestamp(payload.timestamp, 0)
                    .ok_or_else(|| {
                        CommonError::Decode(format!("bad timestamp {}", payload.timestamp))
                    })?;

                let volume_hint = payload
                    .volume
                    .as_deref()
                    .map(|v| parse_volume("volume", v))
                    .transpose()?;

                Ok(FeedMessage::Quote(Quote {
                    exchange: self.exchange.clone(),
                    pair: self.pair.clone(),
                    buy_price: parse_price("ask", &payload.ask)?,
                    sell_price: parse_price("bid", &payload.bid)?,
                    observed_at,
                    volume_hint,
                }))
            }
            other => Err(CommonError::Decode(format!("unknown event '{}'", other))),
        }
    }
}
