//! Data models for allocation plans, DCA progress, and wallet positions.

mod allocation;
mod position;
mod progress;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use allocation::{AllocationPlan, MarketCondition, TokenAllocation};
pub use position::{
    AllocationType, InvestmentPosition, InvestmentStatus, PositionStatus, TradingPosition,
};
pub use progress::{InvestmentProgress, ASSUMED_ENTRY_DISCOUNT};

use crate::wallet::Wallet;

/// The complete persisted state of one session.
///
/// Loaded at session start and saved after every mutating operation; this
/// shape is the storage contract, the store decides the encoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Current allocation plan, if one was computed
    pub plan: Option<AllocationPlan>,

    /// DCA progress per token symbol
    pub progress: HashMap<String, InvestmentProgress>,

    /// Simulated trading wallet: balance plus open positions
    pub wallet: Wallet,

    /// Last mutation time
    pub updated_at: Option<DateTime<Utc>>,
}

impl PortfolioSnapshot {
    /// Every symbol the session cares about: plan buckets, progress keys,
    /// and open positions of both kinds. Deduplicated, order preserved.
    pub fn symbol_universe(&self) -> Vec<String> {
        let mut seen = Vec::new();

        let mut push = |symbol: &str| {
            if !seen.iter().any(|s| s == symbol) {
                seen.push(symbol.to_string());
            }
        };

        if let Some(plan) = &self.plan {
            for alloc in &plan.allocations {
                push(&alloc.symbol);
            }
        }
        for symbol in self.progress.keys() {
            push(symbol);
        }
        for position in &self.wallet.trading {
            push(&position.symbol);
        }
        for position in &self.wallet.investments {
            push(&position.symbol);
        }

        seen
    }
}
