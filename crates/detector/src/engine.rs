//! Cross-exchange opportunity scan.

use crate::profit::ProfitModel;
use common::{CachedQuote, Opportunity};
use log::debug;

/// Scans a cache snapshot for profitable routes.
///
/// Every ordered pair of distinct exchanges quoting the same trading pair is
/// evaluated; both directions run independently since fee and tax
/// asymmetries can make only one of them profitable. The detector filters on
/// profitability only; dedup and rate limiting happen downstream.
pub struct ArbitrageDetector {
    model: ProfitModel,
}

impl ArbitrageDetector {
    pub fn new(model: ProfitModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &ProfitModel {
        &self.model
    }

    /// Returns every profitable route in the snapshot, most profitable
    /// first.
    pub fn evaluate(&self, snapshot: &[CachedQuote]) -> Vec<Opportunity> {
        let mut opportunities = Vec::new();

        for buy in snapshot {
            for sell in snapshot {
                if buy.quote.exchange == sell.quote.exchange {
                    continue;
                }
                if buy.quote.pair != sell.quote.pair {
                    continue;
                }
                if let Some(opportunity) = self.model.evaluate(buy, sell) {
                    opportunities.push(opportunity);
                }
            }
        }

        opportunities.sort_by(|a, b| b.net_profit.cmp(&a.net_profit));
        debug!(
            "evaluated {} cached quotes, found {} profitable routes",
            snapshot.len(),
            opportunities.len()
        );
        opportunities
    }
}
