//! Fee- and tax-aware profit arithmetic.
//!
//! Every monetary figure stays in `Decimal` end to end; the percentage is
//! derived in the final step and never re-enters the arithmetic.

use chrono::Utc;
use common::{CachedQuote, ExchangeId, Opportunity};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

/// Per-exchange fee schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            maker_rate: Decimal::new(1, 3),  // 0.1%
            taker_rate: Decimal::new(2, 3),  // 0.2%
        }
    }
}

/// Profit evaluation parameters.
///
/// The notional is a representative figure used purely for estimation; it is
/// configuration, never derived from live book depth.
#[derive(Debug, Clone)]
pub struct ProfitModel {
    pub assumed_volume: Decimal,
    /// Withholding rate applied to the notional above the threshold.
    pub withholding_rate: Decimal,
    /// Notional cutoff below which no withholding applies.
    pub withholding_threshold: Decimal,
    pub fees: HashMap<ExchangeId, FeeSchedule>,
    /// Schedule used for exchanges without an explicit entry.
    pub default_fee: FeeSchedule,
}

impl ProfitModel {
    fn fee_for(&self, exchange: &ExchangeId) -> &FeeSchedule {
        self.fees.get(exchange).unwrap_or(&self.default_fee)
    }

    /// Evaluates one ordered route: buy the base asset on `buy`'s exchange,
    /// sell it on `sell`'s. Returns an opportunity only when the net profit
    /// is strictly positive. Pathological inputs (zero prices, overflow)
    /// yield `None` rather than aborting the surrounding cycle.
    pub fn evaluate(&self, buy: &CachedQuote, sell: &CachedQuote) -> Option<Opportunity> {
        let volume = self.assumed_volume;
        let buy_price = buy.quote.buy_price.0;
        let sell_price = sell.quote.sell_price.0;

        // Both legs cross the spread, so taker rates apply on both sides.
        let buy_fee = self.fee_for(&buy.quote.exchange).taker_rate;
        let sell_fee = self.fee_for(&sell.quote.exchange).taker_rate;

        let base_amount = volume.checked_div(buy_price)?;
        let gross_profit = base_amount.checked_mul(sell_price)?.checked_sub(volume)?;
        let trading_fees = volume.checked_mul(buy_fee.checked_add(sell_fee)?)?;
        let withholding_tax = if volume > self.withholding_threshold {
            volume.checked_mul(self.withholding_rate)?
        } else {
            Decimal::ZERO
        };

        let net_profit = gross_profit
            .checked_sub(trading_fees)?
            .checked_sub(withholding_tax)?;
        if net_profit <= Decimal::ZERO {
            return None;
        }

        let profit_percent = net_profit
            .checked_div(volume)?
            .checked_mul(Decimal::ONE_HUNDRED)?;

        Some(Opportunity {
            id: Uuid::new_v4(),
            pair: buy.quote.pair.clone(),
            buy_exchange: buy.quote.exchange.clone(),
            sell_exchange: sell.quote.exchange.clone(),
            buy_price: buy.quote.buy_price,
            sell_price: sell.quote.sell_price,
            assumed_volume: volume,
            gross_profit,
            trading_fees,
            withholding_tax,
            net_profit,
            profit_percent,
            detected_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::types::Price;
    use common::{Asset, AssetPair, Quote};
    use rust_decimal_macros::dec;
    use std::time::Instant;

    fn cached(exchange: &str, buy: Decimal, sell: Decimal) -> CachedQuote {
        CachedQuote {
            quote: Quote {
                exchange: ExchangeId::from(exchange),
                pair: AssetPair::new(Asset::from("usdt"), Asset::from("inr")),
                buy_price: Price(buy),
                sell_price: Price(sell),
                observed_at: Utc::now(),
                volume_hint: None,
            },
            received_at: Instant::now(),
        }
    }

    fn model(volume: Decimal) -> ProfitModel {
        let mut fees = HashMap::new();
        fees.insert(
            ExchangeId::from("wazirx"),
            FeeSchedule {
                maker_rate: dec!(0.001),
                taker_rate: dec!(0.002),
            },
        );
        fees.insert(
            ExchangeId::from("coindcx"),
            FeeSchedule {
                maker_rate: dec!(0.0005),
                taker_rate: dec!(0.001),
            },
        );
        ProfitModel {
            assumed_volume: volume,
            withholding_rate: dec!(0.01),
            withholding_threshold: dec!(10000),
            fees,
            default_fee: FeeSchedule::default(),
        }
    }

    #[test]
    fn test_below_threshold_net_is_gross_minus_fees() {
        // Buy at 83.0 on wazirx, sell at 84.5 on coindcx with a notional
        // under the withholding cutoff.
        let model = model(dec!(5000));
        let buy = cached("wazirx", dec!(83.0), dec!(82.9));
        let sell = cached("coindcx", dec!(84.6), dec!(84.5));

        let opp = model.evaluate(&buy, &sell).expect("route is profitable");

        let expected_gross = dec!(5000) / dec!(83.0) * dec!(84.5) - dec!(5000);
        let expected_fees = dec!(5000) * (dec!(0.002) + dec!(0.001));
        assert_eq!(opp.gross_profit, expected_gross);
        assert_eq!(opp.trading_fees, expected_fees);
        assert_eq!(opp.withholding_tax, Decimal::ZERO);
        assert_eq!(opp.net_profit, expected_gross - expected_fees);
        assert_eq!(
            opp.profit_percent,
            (expected_gross - expected_fees) / dec!(5000) * Decimal::ONE_HUNDRED
        );
    }

    #[test]
    fn test_above_threshold_applies_withholding() {
        let model = model(dec!(50000));
        let buy = cached("wazirx", dec!(83.0), dec!(82.9));
        let sell = cached("coindcx", dec!(84.6), dec!(84.5));

        let opp = model.evaluate(&buy, &sell).expect("route is profitable");
        assert_eq!(opp.withholding_tax, dec!(50000) * dec!(0.01));

        let expected_gross = dec!(50000) / dec!(83.0) * dec!(84.5) - dec!(50000);
        let expected_fees = dec!(50000) * dec!(0.003);
        assert_eq!(
            opp.net_profit,
            expected_gross - expected_fees - dec!(500)
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        // A notional exactly at the cutoff pays no withholding.
        let model = model(dec!(10000));
        let buy = cached("wazirx", dec!(83.0), dec!(82.9));
        let sell = cached("coindcx", dec!(84.6), dec!(84.5));

        let opp = model.evaluate(&buy, &sell).expect("route is profitable");
        assert_eq!(opp.withholding_tax, Decimal::ZERO);
    }

    #[test]
    fn test_unprofitable_route_yields_nothing() {
        let model = model(dec!(5000));
        // Selling below the buy price can never clear the fees.
        let buy = cached("wazirx", dec!(83.0), dec!(82.9));
        let sell = cached("coindcx", dec!(83.1), dec!(83.0));
        assert!(model.evaluate(&buy, &sell).is_none());
    }

    #[test]
    fn test_fees_can_erase_a_thin_edge() {
        let model = model(dec!(5000));
        // Gross spread of 0.1 INR on 83: about 0.12%, below 0.3% fees.
        let buy = cached("wazirx", dec!(83.0), dec!(82.9));
        let sell = cached("coindcx", dec!(83.2), dec!(83.1));
        assert!(model.evaluate(&buy, &sell).is_none());
    }

    #[test]
    fn test_zero_buy_price_is_isolated() {
        let model = model(dec!(5000));
        let buy = cached("wazirx", Decimal::ZERO, dec!(82.9));
        let sell = cached("coindcx", dec!(84.6), dec!(84.5));
        assert!(model.evaluate(&buy, &sell).is_none());
    }

    #[test]
    fn test_unknown_exchange_uses_default_fee() {
        let model = model(dec!(5000));
        let buy = cached("zebpay", dec!(83.0), dec!(82.9));
        let sell = cached("coindcx", dec!(84.6), dec!(84.5));

        let opp = model.evaluate(&buy, &sell).expect("route is profitable");
        // Default taker 0.2% on the buy leg, 0.1% on the sell leg.
        assert_eq!(opp.trading_fees, dec!(5000) * (dec!(0.002) + dec!(0.001)));
    }
}
