//! WazirX ticker dialect.
//!
//! Subscription is an explicit frame acknowledged by the server, and the
//! venue answers `{"event":"ping"}` with `{"event":"pong"}`.

use super::{parse_price, parse_volume, FeedMessage, QuoteCodec};
use chrono::{DateTime, Utc};
use common::{AssetPair, CommonError, ExchangeId, Quote};
use serde::Deserialize;

/// `{"stream":"usdtinr@ticker","data":{"E":1631682384000,"s":"usdtinr",
/// "b":"83.00","B":"1200","a":"83.20","A":"900"}}`
#[derive(Debug, Deserialize)]
struct TickerFrame {
    stream: String,
    data: TickerData,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    #[serde(rename = "E")]
    event_time_ms: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    bid_price: String,
    #[serde(rename = "B")]
    bid_qty: String,
    #[serde(rename = "a")]
    ask_price: String,
    #[serde(rename = "A")]
    ask_qty: String,
}

#[derive(Debug, Deserialize)]
struct EventFrame {
    event: String,
}

pub struct WazirxCodec {
    exchange: ExchangeId,
    pair: AssetPair,
    stream: String,
    symbol: String,
}

impl WazirxCodec {
    pub fn new(exchange: ExchangeId, pair: AssetPair) -> Self {
        let symbol = format!("{}{}", pair.base, pair.quote).to_lowercase();
        let stream = format!("{}@ticker", symbol);
        Self {
            exchange,
            pair,
            stream,
            symbol,
        }
    }
}

impl QuoteCodec for WazirxCodec {
    fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    fn pair(&self) -> &AssetPair {
        &self.pair
    }

    fn subscribe_message(&self) -> Option<String> {
        Some(
            serde_json::json!({
                "event": "subscribe",
                "streams": [self.stream],
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
        let json: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| CommonError::Decode(format!("invalid json: {}", e)))?;

        if json.get("event").is_some() {
            let frame: EventFrame = serde_json::from_value(json)
                .map_err(|e| CommonError::Decode(format!("bad event frame: {}", e)))?;
            return match frame.event.as_str() {
                "pong" => Ok(FeedMessage::Heartbeat),
                "subscribed" => Ok(FeedMessage::SubscribeAck),
                other => Err(CommonError::Decode(format!("unknown event '{}'", other))),
            };
        }

        let frame: TickerFrame = serde_json::from_value(json)
            .map_err(|e| CommonError::Decode(format!("unexpected payload shape: {}", e)))?;

        if frame.stream != self.stream || frame.data.symbol != self.symbol {
            return Ok(FeedMessage::Ignored);
        }

        let observed_at: DateTime<Utc> = DateTime::from_timestamp_millis(frame.data.event_time_ms)
            .ok_or_else(|| {
                CommonError::Decode(format!("bad event time {}", frame.data.event_time_ms))
            })?;

        let bid_qty = parse_volume("bid qty", &frame.data.bid_qty)?;
        let ask_qty = parse_volume("ask qty", &frame.data.ask_qty)?;

        Ok(FeedMessage::Quote(Quote {
            exchange: self.exchange.clone(),
            pair: self.pair.clone(),
            buy_price: parse_price("ask", &frame.data.ask_price)?,
            sell_price: parse_price("bid", &frame.data.bid_price)?,
            observed_at,
            volume_hint: Some(bid_qty.min(ask_qty)),
        }))
    }
}
