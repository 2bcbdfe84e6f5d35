//! Allocation plan models: how capital is split across tokens and over time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Broad market regime recorded with a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCondition {
    Bull,
    Bear,
    Sideways,
    Volatile,
}

impl MarketCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCondition::Bull => "bull",
            MarketCondition::Bear => "bear",
            MarketCondition::Sideways => "sideways",
            MarketCondition::Volatile => "volatile",
        }
    }

    /// Parse a user-supplied condition string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bull" => Some(MarketCondition::Bull),
            "bear" => Some(MarketCondition::Bear),
            "sideways" => Some(MarketCondition::Sideways),
            "volatile" => Some(MarketCondition::Volatile),
            _ => None,
        }
    }
}

/// A single bucket of an allocation plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAllocation {
    /// Token symbol or bucket name (e.g. "BTC", "HIGH-RISK")
    pub symbol: String,

    /// Share of total capital, in percent (0, 100]
    pub percentage: Decimal,

    /// Dollar amount: capital * percentage / 100
    pub amount: Decimal,

    /// DCA duration in weeks
    pub weeks: u32,
}

impl TokenAllocation {
    pub fn new(symbol: impl Into<String>, percentage: Decimal, capital: Decimal, weeks: u32) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            percentage,
            amount: capital * percentage / dec!(100),
            weeks,
        }
    }

    /// Target contribution for one week of the DCA schedule.
    pub fn weekly_target(&self) -> Decimal {
        if self.weeks == 0 {
            return Decimal::ZERO;
        }
        self.amount / Decimal::from(self.weeks)
    }
}

/// A complete allocation plan for one session.
///
/// Immutable once computed: a new calculation replaces the plan wholesale
/// and resets all investment progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// Total investable capital in USD
    pub capital: Decimal,

    /// Cap on the number of distinct tokens, step function of capital
    pub max_tokens: u32,

    /// Allocation buckets, unique symbols, priority order
    pub allocations: Vec<TokenAllocation>,

    /// Market regime at planning time
    pub market_condition: MarketCondition,

    /// Whether the altcoin-season table was used
    pub altcoin_season: bool,

    /// Whether an airdrop/presale bucket was carved out
    pub airdrop_participation: bool,

    /// When the plan was computed; anchors the weekly compliance schedule
    pub created_at: DateTime<Utc>,
}

impl AllocationPlan {
    /// Look up the bucket for a symbol.
    pub fn allocation_for(&self, symbol: &str) -> Option<&TokenAllocation> {
        let symbol = symbol.to_uppercase();
        self.allocations.iter().find(|a| a.symbol == symbol)
    }

    /// Sum of bucket percentages.
    pub fn total_percentage(&self) -> Decimal {
        self.allocations.iter().map(|a| a.percentage).sum()
    }

    /// Sum of bucket dollar amounts.
    pub fn total_amount(&self) -> Decimal {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    /// Symbols of every bucket, in plan order.
    pub fn symbols(&self) -> Vec<String> {
        self.allocations.iter().map(|a| a.symbol.clone()).collect()
    }
}
