//! Per-route emission rate limiting.

use common::{Opportunity, RouteKey};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Deduplicates opportunity emission per (buy-exchange, sell-exchange)
/// route with a cooldown window.
///
/// The cooldown clock always measures from the last *actual* emission;
/// suppressed attempts do not touch it. Routes are independent, so a
/// cooldown on A->B never suppresses B->A.
pub struct AlertThrottle {
    cooldown: Duration,
    last_emitted: HashMap<RouteKey, Instant>,
}

impl AlertThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_emitted: HashMap::new(),
        }
    }

    /// True iff the opportunity's route is outside its cooldown; records the
    /// emission time when it is.
    pub fn should_emit(&mut self, opportunity: &Opportunity) -> bool {
        let route = opportunity.route();
        let now = Instant::now();
        if let Some(last) = self.last_emitted.get(&route) {
            if now.duration_since(*last) < self.cooldown {
                return false;
            }
        }
        self.last_emitted.insert(route, now);
        true
    }
}
