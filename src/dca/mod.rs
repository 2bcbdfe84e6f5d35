//! DCA compliance tracking: actual contributions against the plan's
//! weekly schedule.
//!
//! The tracker mutates per-token progress on contribution events and
//! produces a classified notification snapshot on demand. The snapshot is
//! recomputed from scratch every call; callers replace the previous list
//! rather than appending to it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{PortfolioError, Result};
use crate::feed::Quote;
use crate::models::{AllocationPlan, InvestmentProgress, ASSUMED_ENTRY_DISCOUNT};

/// Thresholds for compliance classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Below this compliance ratio (percent), a warning fires
    pub behind_threshold: Decimal,

    /// Above this compliance ratio (percent), an ahead-of-schedule note fires
    pub ahead_threshold: Decimal,

    /// Days without a contribution before a staleness alert fires
    pub stale_days: i64,

    /// Profit percentage unlocking the capital-withdrawal milestone
    pub milestone_profit_pct: Decimal,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            behind_threshold: dec!(80),
            ahead_threshold: dec!(120),
            stale_days: 10,
            milestone_profit_pct: dec!(100),
        }
    }
}

/// Severity of a compliance notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Behind the weekly schedule
    Warning,
    /// Ahead of the weekly schedule
    Info,
    /// No contribution for too long while the schedule is still running
    Alert,
    /// Profit milestone reached, capital withdrawal available
    Success,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Warning => "warning",
            NotificationKind::Info => "info",
            NotificationKind::Alert => "alert",
            NotificationKind::Success => "success",
        }
    }
}

/// One classified compliance finding for one token. Several can fire for
/// the same token in a single snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceNotification {
    pub symbol: String,
    pub kind: NotificationKind,
    pub message: String,
}

/// DCA compliance tracker.
pub struct DcaTracker {
    config: ComplianceConfig,
}

impl Default for DcaTracker {
    fn default() -> Self {
        Self::new(ComplianceConfig::default())
    }
}

impl DcaTracker {
    pub fn new(config: ComplianceConfig) -> Self {
        Self { config }
    }

    /// Record one weekly contribution for a token in the plan.
    ///
    /// Every call counts as one contribution event; there is no dedup key,
    /// so calling twice records two weeks.
    pub fn record_investment(
        &self,
        plan: &AllocationPlan,
        progress: &mut HashMap<String, InvestmentProgress>,
        symbol: &str,
        amount: Decimal,
        live_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(PortfolioError::Validation(
                "investment amount must be positive".to_string(),
            ));
        }

        let symbol = symbol.to_uppercase();
        let allocation = plan
            .allocation_for(&symbol)
            .ok_or_else(|| PortfolioError::UnknownToken(symbol.clone()))?;

        let entry = progress.entry(symbol.clone()).or_default();
        entry.record(amount, allocation.amount, now);
        entry.revalue(live_price);

        debug!(
            symbol = %symbol,
            total = %entry.total_invested,
            weeks = entry.weeks_passed,
            target_reached = entry.target_reached,
            "Investment recorded"
        );

        Ok(())
    }

    /// Estimated current value of a contribution total, assuming purchases
    /// at the discounted entry price.
    pub fn estimate_current_value(total_invested: Decimal, live_price: Decimal) -> Decimal {
        if live_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let tokens_owned = total_invested / (live_price * ASSUMED_ENTRY_DISCOUNT);
        tokens_owned * live_price
    }

    /// Informational per-tick pass: refresh every token's valuation
    /// against the current price snapshot.
    pub fn refresh_valuations(
        &self,
        progress: &mut HashMap<String, InvestmentProgress>,
        prices: &HashMap<String, Quote>,
    ) {
        for (symbol, entry) in progress.iter_mut() {
            if let Some(quote) = prices.get(symbol) {
                entry.revalue(quote.price);
            }
        }
    }

    /// Build the compliance snapshot for every token in the plan.
    ///
    /// Pure over (plan, progress, now): calling twice without mutation in
    /// between yields identical notification sets.
    pub fn check_compliance(
        &self,
        plan: &AllocationPlan,
        progress: &HashMap<String, InvestmentProgress>,
        now: DateTime<Utc>,
    ) -> Vec<ComplianceNotification> {
        let mut notifications = Vec::new();
        let weeks_elapsed = (now - plan.created_at).num_weeks().max(0);

        for allocation in &plan.allocations {
            let default = InvestmentProgress::new();
            let entry = progress.get(&allocation.symbol).unwrap_or(&default);

            let expected_weeks = Decimal::from(weeks_elapsed.min(i64::from(allocation.weeks)));
            let expected = allocation.weekly_target() * expected_weeks;

            let ratio = if expected.is_zero() {
                Decimal::ZERO
            } else {
                entry.total_invested / expected * dec!(100)
            };

            if ratio < self.config.behind_threshold {
                notifications.push(ComplianceNotification {
                    symbol: allocation.symbol.clone(),
                    kind: NotificationKind::Warning,
                    message: format!(
                        "{} is behind schedule: {:.1}% of the expected {:.2} invested",
                        allocation.symbol, ratio, expected
                    ),
                });
            }

            if ratio > self.config.ahead_threshold {
                notifications.push(ComplianceNotification {
                    symbol: allocation.symbol.clone(),
                    kind: NotificationKind::Info,
                    message: format!(
                        "{} is ahead of schedule: {:.1}% of the expected {:.2} invested",
                        allocation.symbol, ratio, expected
                    ),
                });
            }

            if let Some(days) = entry.days_since_last_investment(now) {
                if days > self.config.stale_days && entry.weeks_passed < allocation.weeks {
                    notifications.push(ComplianceNotification {
                        symbol: allocation.symbol.clone(),
                        kind: NotificationKind::Alert,
                        message: format!(
                            "No {} contribution for {} days with {} weeks remaining",
                            allocation.symbol,
                            days,
                            allocation.weeks - entry.weeks_passed
                        ),
                    });
                }
            }

            if entry.profit_percentage >= self.config.milestone_profit_pct
                && !entry.capital_withdrawn
            {
                notifications.push(ComplianceNotification {
                    symbol: allocation.symbol.clone(),
                    kind: NotificationKind::Success,
                    message: format!(
                        "{} is up {:.1}%: initial capital can be withdrawn",
                        allocation.symbol, entry.profit_percentage
                    ),
                });
            }
        }

        notifications
    }

    /// Withdraw initial capital once the profit milestone is reached.
    ///
    /// A no-op below the milestone. One-way: there is no re-deposit.
    /// Returns whether the withdrawal took effect.
    pub fn withdraw_capital(
        &self,
        progress: &mut HashMap<String, InvestmentProgress>,
        symbol: &str,
    ) -> bool {
        let symbol = symbol.to_uppercase();
        let Some(entry) = progress.get_mut(&symbol) else {
            return false;
        };

        if entry.profit_percentage < self.config.milestone_profit_pct || entry.capital_withdrawn {
            return false;
        }

        entry.capital_withdrawn = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketCondition;
    use crate::models::TokenAllocation;
    use chrono::Duration;

    fn make_plan(created_weeks_ago: i64) -> AllocationPlan {
        AllocationPlan {
            capital: dec!(1000),
            max_tokens: 4,
            allocations: vec![
                TokenAllocation::new("BTC", dec!(50), dec!(1000), 10),
                TokenAllocation::new("ETH", dec!(50), dec!(1000), 10),
            ],
            market_condition: MarketCondition::Bull,
            altcoin_season: false,
            airdrop_participation: false,
            created_at: Utc::now() - Duration::weeks(created_weeks_ago),
        }
    }

    #[test]
    fn test_record_investment_reaches_target() {
        let tracker = DcaTracker::default();
        let plan = make_plan(0);
        let mut progress = HashMap::new();
        let now = Utc::now();

        // BTC target is 500
        tracker
            .record_investment(&plan, &mut progress, "BTC", dec!(300), dec!(100), now)
            .unwrap();
        assert!(!progress["BTC"].target_reached);

        tracker
            .record_investment(&plan, &mut progress, "BTC", dec!(300), dec!(100), now)
            .unwrap();
        let entry = &progress["BTC"];
        assert_eq!(entry.total_invested, dec!(600));
        assert_eq!(entry.weeks_passed, 2);
        assert!(entry.target_reached);
    }

    #[test]
    fn test_record_investment_rejects_bad_input() {
        let tracker = DcaTracker::default();
        let plan = make_plan(0);
        let mut progress = HashMap::new();
        let now = Utc::now();

        let err = tracker
            .record_investment(&plan, &mut progress, "BTC", dec!(0), dec!(100), now)
            .unwrap_err();
        assert!(matches!(err, PortfolioError::Validation(_)));

        let err = tracker
            .record_investment(&plan, &mut progress, "DOGE", dec!(50), dec!(100), now)
            .unwrap_err();
        assert!(matches!(err, PortfolioError::UnknownToken(_)));

        assert!(progress.is_empty());
    }

    #[test]
    fn test_estimate_current_value() {
        // 850 invested at a price of 100: 10 tokens, worth 1000
        let value = DcaTracker::estimate_current_value(dec!(850), dec!(100));
        assert_eq!(value, dec!(1000));
    }

    #[test]
    fn test_compliance_behind_schedule_warns() {
        let tracker = DcaTracker::default();
        let plan = make_plan(4);
        let progress = HashMap::new();
        let now = Utc::now();

        let notifications = tracker.check_compliance(&plan, &progress, now);

        // Nothing invested after 4 weeks: a warning per token
        let warnings: Vec<_> = notifications
            .iter()
            .filter(|n| n.kind == NotificationKind::Warning)
            .collect();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_compliance_ahead_of_schedule() {
        let tracker = DcaTracker::default();
        let plan = make_plan(2);
        let mut progress = HashMap::new();
        let now = Utc::now();

        // Expected after 2 weeks: 100 per token; invest 200 in BTC
        tracker
            .record_investment(&plan, &mut progress, "BTC", dec!(200), dec!(100), now)
            .unwrap();

        let notifications = tracker.check_compliance(&plan, &progress, now);
        assert!(notifications
            .iter()
            .any(|n| n.symbol == "BTC" && n.kind == NotificationKind::Info));
    }

    #[test]
    fn test_compliance_stale_alert() {
        let tracker = DcaTracker::default();
        let plan = make_plan(4);
        let mut progress = HashMap::new();
        let stale = Utc::now() - Duration::days(12);

        tracker
            .record_investment(&plan, &mut progress, "BTC", dec!(200), dec!(100), stale)
            .unwrap();

        let notifications = tracker.check_compliance(&plan, &progress, Utc::now());
        assert!(notifications
            .iter()
            .any(|n| n.symbol == "BTC" && n.kind == NotificationKind::Alert));
        // ETH never contributed: no timestamp, so no staleness alert
        assert!(!notifications
            .iter()
            .any(|n| n.symbol == "ETH" && n.kind == NotificationKind::Alert));
    }

    #[test]
    fn test_compliance_milestone_success() {
        let tracker = DcaTracker::default();
        let plan = make_plan(1);
        let mut progress = HashMap::new();

        let mut entry = InvestmentProgress::new();
        entry.total_invested = dec!(100);
        entry.current_value = dec!(250);
        entry.profit_percentage = dec!(150);
        progress.insert("BTC".to_string(), entry);

        let notifications = tracker.check_compliance(&plan, &progress, Utc::now());
        assert!(notifications
            .iter()
            .any(|n| n.symbol == "BTC" && n.kind == NotificationKind::Success));
    }

    #[test]
    fn test_compliance_snapshot_is_pure() {
        let tracker = DcaTracker::default();
        let plan = make_plan(3);
        let mut progress = HashMap::new();
        let now = Utc::now();

        tracker
            .record_investment(&plan, &mut progress, "BTC", dec!(50), dec!(100), now)
            .unwrap();

        let first = tracker.check_compliance(&plan, &progress, now);
        let second = tracker.check_compliance(&plan, &progress, now);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.symbol, b.symbol);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.message, b.message);
        }
    }

    #[test]
    fn test_withdraw_requires_milestone() {
        let tracker = DcaTracker::default();
        let mut progress = HashMap::new();

        let mut entry = InvestmentProgress::new();
        entry.profit_percentage = dec!(50);
        progress.insert("BTC".to_string(), entry);

        assert!(!tracker.withdraw_capital(&mut progress, "BTC"));
        assert!(!progress["BTC"].capital_withdrawn);

        progress.get_mut("BTC").unwrap().profit_percentage = dec!(120);
        assert!(tracker.withdraw_capital(&mut progress, "BTC"));
        assert!(progress["BTC"].capital_withdrawn);

        // One-way: a second withdrawal is a no-op
        assert!(!tracker.withdraw_capital(&mut progress, "BTC"));
    }
}
