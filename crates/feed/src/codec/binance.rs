//! Binance book-ticker dialect.
//!
//! The stream name is part of the connection URL, so there is no subscribe
//! frame and no ack; liveness rides on protocol-level ping/pong.

use super::{parse_price, parse_volume, FeedMessage, QuoteCodec};
use chrono::Utc;
use common::{AssetPair, CommonError, ExchangeId, Quote};
use serde::Deserialize;

/// Top-of-book update, e.g.
/// `{"u":400900217,"s":"USDTINR","b":"83.00","B":"1200","a":"83.20","A":"900"}`.
#[derive(Debug, Deserialize)]
struct BookTickerMsg {
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

pub struct BinanceCodec {
    exchange: ExchangeId,
    pair: AssetPair,
    symbol: String,
}

impl BinanceCodec {
    pub fn new(exchange: ExchangeId, pair: AssetPair) -> Self {
        let symbol = format!("{}{}", pair.base, pair.quote).to_uppercase();
        Self {
            exchange,
            pair,
            symbol,
        }
    }
}

impl QuoteCodec for BinanceCodec {
    fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    fn pair(&self) -> &AssetPair {
        &self.pair
    }

    fn subscribe_message(&self) -> Option<String> {
        None
    }

    fn decode(&self, raw: &str) -> Result<FeedMessage, CommonError> {
        let json: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| CommonError::Decode(format!("invalid json: {}", e)))?;

        // Combined-stream frames wrap the payload in a "data" field.
        let payload = json.get("data").unwrap_or(&json);

        let msg: BookTickerMsg = serde_json::from_value(payload.clone())
            .map_err(|e| CommonError::Decode(format!("unexpected payload shape: {}", e)))?;

        if msg.symbol != self.symbol {
            return Ok(FeedMessage::Ignored);
        }

        let bid_qty = parse_volume("bid qty", &msg.bid_qty)?;
        let ask_qty = parse_volume("ask qty", &msg.ask_qty)?;

        Ok(FeedMessage::Quote(Quote {
            exchange: self.exchange.clone(),
            pair: self.pair.clone(),
            // Buying the base asset lifts the ask; selling hits the bid.
            buy_price: parse_price("ask", &msg.ask_price)?,
            sell_price: parse_price("bid", &msg.bid_price)?,
            observed_at: Utc::now(),
            volume_hint: Some(bid_qty.min(ask_qty)),
        }))
    }
}
