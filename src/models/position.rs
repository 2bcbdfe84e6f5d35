//! Position models for the simulated trading wallet.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sizing bucket a trading position is opened under. Determines the share
/// of the wallet balance committed at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationType {
    Btc,
    Eth,
    Sol,
    FastRecovery,
    Other,
}

impl AllocationType {
    /// Percentage of the wallet balance committed per position.
    pub fn allocation_percentage(&self) -> Decimal {
        match self {
            AllocationType::Btc => dec!(20),
            AllocationType::Eth | AllocationType::Sol => dec!(10),
            AllocationType::FastRecovery => dec!(8),
            AllocationType::Other => dec!(5),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationType::Btc => "btc",
            AllocationType::Eth => "eth",
            AllocationType::Sol => "sol",
            AllocationType::FastRecovery => "fast-recovery",
            AllocationType::Other => "other",
        }
    }

    /// Parse a user-supplied allocation type string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "btc" => Some(AllocationType::Btc),
            "eth" => Some(AllocationType::Eth),
            "sol" => Some(AllocationType::Sol),
            "fast-recovery" | "fast_recovery" => Some(AllocationType::FastRecovery),
            "other" => Some(AllocationType::Other),
            _ => None,
        }
    }
}

/// Lifecycle state of a trading position. Both hit states are terminal;
/// the only way out is an explicit close, which removes the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "tp-hit")]
    TakeProfitHit,
    #[serde(rename = "sl-hit")]
    StopLossHit,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "active",
            PositionStatus::TakeProfitHit => "tp-hit",
            PositionStatus::StopLossHit => "sl-hit",
        }
    }
}

/// Lifecycle state of a derived investment position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvestmentStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "tp-hit")]
    TakeProfitHit,
}

/// A simulated trading position with take-profit and stop-loss thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingPosition {
    /// Unique position id
    pub id: Uuid,

    /// Token symbol
    pub symbol: String,

    /// Price at open
    pub entry_price: Decimal,

    /// Units of token held
    pub amount: Decimal,

    /// Price at which the position locks in gains
    pub take_profit: Decimal,

    /// Price at which the position cuts losses
    pub stop_loss: Decimal,

    /// Last evaluated price
    pub current_price: Decimal,

    /// Sizing bucket used at open
    pub allocation_type: AllocationType,

    /// Lifecycle state
    pub status: PositionStatus,

    /// When the position was opened
    pub opened_at: DateTime<Utc>,
}

impl TradingPosition {
    /// Unrealized P&L at the last evaluated price.
    pub fn pnl(&self) -> Decimal {
        self.amount * (self.current_price - self.entry_price)
    }

    /// Unrealized P&L as a percentage of cost.
    pub fn pnl_percent(&self) -> Decimal {
        let cost = self.amount * self.entry_price;
        if cost.is_zero() {
            return Decimal::ZERO;
        }
        self.pnl() / cost * dec!(100)
    }

    /// Value of the position at its last evaluated price.
    pub fn current_value(&self) -> Decimal {
        self.amount * self.current_price
    }
}

/// A long-term position spawned from the profit split of a trading
/// position that hit its take-profit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentPosition {
    /// Unique position id
    pub id: Uuid,

    /// Token symbol
    pub symbol: String,

    /// Units of token held
    pub amount: Decimal,

    /// Price at creation (the originating take-profit level)
    pub entry_price: Decimal,

    /// Last evaluated price
    pub current_price: Decimal,

    /// Target price; hitting it is informational only, no payout
    pub investment_tp: Decimal,

    /// Lifecycle state
    pub status: InvestmentStatus,

    /// When the position was created
    pub created_at: DateTime<Utc>,

    /// The trading position this was split off from (lookup only)
    pub origin_trading_id: Uuid,
}

impl InvestmentPosition {
    /// Unrealized P&L at the last evaluated price.
    pub fn pnl(&self) -> Decimal {
        self.amount * (self.current_price - self.entry_price)
    }

    /// Unrealized P&L as a percentage of cost.
    pub fn pnl_percent(&self) -> Decimal {
        let cost = self.amount * self.entry_price;
        if cost.is_zero() {
            return Decimal::ZERO;
        }
        self.pnl() / cost * dec!(100)
    }

    /// Value of the position at its last evaluated price.
    pub fn current_value(&self) -> Decimal {
        self.amount * self.current_price
    }
}
