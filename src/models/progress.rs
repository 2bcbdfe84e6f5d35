//! Per-token DCA progress bookkeeping.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Assumed average entry discount versus the current price. The tracker has
/// no purchase history, so holdings are estimated as if every contribution
/// bought at 85% of today's price.
pub const ASSUMED_ENTRY_DISCOUNT: Decimal = dec!(0.85);

/// DCA progress for a single token, keyed by symbol in the snapshot.
///
/// Mutated only by record-investment events; reset only when the plan is
/// replaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestmentProgress {
    /// Total contributed so far
    pub total_invested: Decimal,

    /// Number of weekly contribution events recorded
    pub weeks_passed: u32,

    /// Timestamp of the most recent contribution
    pub last_investment_at: Option<DateTime<Utc>>,

    /// True once total_invested reached the bucket's target amount
    pub target_reached: bool,

    /// Estimated current value of the holdings
    pub current_value: Decimal,

    /// (current_value - total_invested) / total_invested * 100
    pub profit_percentage: Decimal,

    /// True once the profit milestone withdrawal happened; one-way
    pub capital_withdrawn: bool,
}

impl InvestmentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one weekly contribution event. Each call counts as one week
    /// regardless of elapsed real time; there is no dedup key, so callers
    /// must invoke this once per intended contribution.
    pub fn record(&mut self, amount: Decimal, target: Decimal, now: DateTime<Utc>) {
        self.total_invested += amount;
        self.weeks_passed += 1;
        self.last_investment_at = Some(now);

        if self.total_invested >= target {
            self.target_reached = true;
        }
    }

    /// Refresh the estimated value and profit percentage against a live
    /// price: holdings are assumed bought at the discounted entry price.
    pub fn revalue(&mut self, live_price: Decimal) {
        if live_price <= Decimal::ZERO || self.total_invested.is_zero() {
            return;
        }

        let tokens_owned = self.total_invested / (live_price * ASSUMED_ENTRY_DISCOUNT);
        self.current_value = tokens_owned * live_price;
        self.profit_percentage =
            (self.current_value - self.total_invested) / self.total_invested * dec!(100);
    }

    /// Days since the most recent contribution.
    pub fn days_since_last_investment(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_investment_at.map(|t| (now - t).num_days())
    }
}
