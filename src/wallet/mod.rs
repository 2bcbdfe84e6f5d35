//! Simulated trading wallet: position lifecycle and the profit-split rule.
//!
//! Trading positions move `active -> tp-hit` or `active -> sl-hit`, both
//! terminal. A take-profit returns principal plus 30% of the gross profit
//! to the wallet and converts the remaining 70% into a derived investment
//! position in one step; a stop-loss settles the position back into the
//! wallet at the stop price. Explicit close removes a position regardless
//! of status.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PortfolioError, Result};
use crate::feed::Quote;
use crate::models::{
    AllocationType, InvestmentPosition, InvestmentStatus, PositionStatus, TradingPosition,
};

/// Share of gross profit retained in the wallet on take-profit.
const RETAINED_PROFIT_SHARE: Decimal = dec!(0.3);

/// Share of gross profit converted into an investment position.
const INVESTED_PROFIT_SHARE: Decimal = dec!(0.7);

/// Investment target relative to the originating take-profit level.
const INVESTMENT_TP_MULTIPLIER: Decimal = dec!(2);

/// Inputs to opening a trading position.
#[derive(Debug, Clone)]
pub struct OpenPositionRequest {
    pub symbol: String,
    pub entry_price: Decimal,
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
    pub allocation_type: AllocationType,
}

/// A state transition produced by a price tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickEvent {
    /// Take-profit hit: wallet credited, investment position spawned.
    TakeProfit {
        position_id: Uuid,
        symbol: String,
        gross_profit: Decimal,
        credited: Decimal,
        investment_id: Uuid,
    },
    /// Stop-loss hit: position settled back into the wallet.
    StopLoss {
        position_id: Uuid,
        symbol: String,
        credited: Decimal,
    },
    /// An investment position reached its target (informational).
    InvestmentTarget { position_id: Uuid, symbol: String },
}

/// The simulated wallet: a cash balance plus open positions of both kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wallet {
    /// Available cash in USD
    pub balance: Decimal,

    /// Open and terminal-but-unclosed trading positions
    pub trading: Vec<TradingPosition>,

    /// Derived investment positions
    pub investments: Vec<InvestmentPosition>,
}

impl Wallet {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            trading: Vec::new(),
            investments: Vec::new(),
        }
    }

    /// Fund the wallet.
    pub fn deposit(&mut self, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(PortfolioError::Validation(
                "deposit amount must be positive".to_string(),
            ));
        }
        self.balance += amount;
        Ok(())
    }

    /// Open a trading position sized from the wallet balance by
    /// allocation type. Debits the balance by the position size and
    /// returns the new position.
    pub fn open_position(&mut self, request: OpenPositionRequest) -> Result<TradingPosition> {
        if request.entry_price <= Decimal::ZERO {
            return Err(PortfolioError::Validation(
                "entry price must be positive".to_string(),
            ));
        }
        if !(request.stop_loss < request.entry_price && request.entry_price < request.take_profit) {
            return Err(PortfolioError::Validation(format!(
                "thresholds must satisfy stop loss {} < entry {} < take profit {}",
                request.stop_loss, request.entry_price, request.take_profit
            )));
        }
        if request.stop_loss <= Decimal::ZERO {
            return Err(PortfolioError::Validation(
                "stop loss must be positive".to_string(),
            ));
        }

        let percentage = request.allocation_type.allocation_percentage();
        let position_size = self.balance * percentage / dec!(100);

        if position_size <= Decimal::ZERO || position_size > self.balance {
            return Err(PortfolioError::InsufficientBalance {
                required: position_size,
                available: self.balance,
            });
        }

        let position = TradingPosition {
            id: Uuid::new_v4(),
            symbol: request.symbol.to_uppercase(),
            entry_price: request.entry_price,
            amount: position_size / request.entry_price,
            take_profit: request.take_profit,
            stop_loss: request.stop_loss,
            current_price: request.entry_price,
            allocation_type: request.allocation_type,
            status: PositionStatus::Active,
            opened_at: Utc::now(),
        };

        self.balance -= position_size;

        info!(
            id = %position.id,
            symbol = %position.symbol,
            size = %position_size,
            amount = %position.amount,
            "Position opened"
        );

        self.trading.push(position.clone());
        Ok(position)
    }

    /// Evaluate one trading position against a live price.
    pub fn apply_price_tick(&mut self, id: Uuid, live_price: Decimal) -> Result<Option<TickEvent>> {
        let Wallet {
            balance,
            trading,
            investments,
        } = self;

        let position = trading
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(PortfolioError::PositionNotFound(id))?;

        Ok(Self::tick_trading(position, live_price, balance, investments))
    }

    /// Evaluate one investment position against a live price.
    pub fn apply_investment_tick(
        &mut self,
        id: Uuid,
        live_price: Decimal,
    ) -> Result<Option<TickEvent>> {
        let position = self
            .investments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(PortfolioError::PositionNotFound(id))?;

        Ok(Self::tick_investment(position, live_price))
    }

    /// Evaluate every active position of both kinds against one uniform
    /// price snapshot. Positions whose token has no quote are skipped;
    /// terminal positions are skipped.
    pub fn apply_prices(&mut self, prices: &HashMap<String, Quote>) -> Vec<TickEvent> {
        let mut events = Vec::new();

        let Wallet {
            balance,
            trading,
            investments,
        } = self;

        for position in trading.iter_mut() {
            if let Some(quote) = prices.get(&position.symbol) {
                if let Some(event) =
                    Self::tick_trading(position, quote.price, balance, investments)
                {
                    events.push(event);
                }
            }
        }

        for position in investments.iter_mut() {
            if let Some(quote) = prices.get(&position.symbol) {
                if let Some(event) = Self::tick_investment(position, quote.price) {
                    events.push(event);
                }
            }
        }

        events
    }

    /// Close a trading position by id. Unconditional: works on terminal
    /// positions too, paying out at the last evaluated price.
    pub fn close_trading(&mut self, id: Uuid) -> Result<TradingPosition> {
        let index = self
            .trading
            .iter()
            .position(|p| p.id == id)
            .ok_or(PortfolioError::PositionNotFound(id))?;

        let position = self.trading.remove(index);
        let payout = position.amount * position.current_price;
        self.balance += payout;

        info!(
            id = %position.id,
            symbol = %position.symbol,
            status = position.status.as_str(),
            payout = %payout,
            "Trading position closed"
        );

        Ok(position)
    }

    /// Close an investment position by id. No balance credit: investment
    /// value is never reconciled back into the wallet.
    pub fn close_investment(&mut self, id: Uuid) -> Result<InvestmentPosition> {
        let index = self
            .investments
            .iter()
            .position(|p| p.id == id)
            .ok_or(PortfolioError::PositionNotFound(id))?;

        let position = self.investments.remove(index);

        info!(
            id = %position.id,
            symbol = %position.symbol,
            value = %position.current_value(),
            "Investment position closed"
        );

        Ok(position)
    }

    /// Value of all positions at their last evaluated prices.
    pub fn positions_value(&self) -> Decimal {
        let trading: Decimal = self.trading.iter().map(|p| p.current_value()).sum();
        let investments: Decimal = self.investments.iter().map(|p| p.current_value()).sum();
        trading + investments
    }

    /// Cash plus the value of every position.
    pub fn equity(&self) -> Decimal {
        self.balance + self.positions_value()
    }

    /// Unrealized P&L across all positions.
    pub fn total_pnl(&self) -> Decimal {
        let trading: Decimal = self.trading.iter().map(|p| p.pnl()).sum();
        let investments: Decimal = self.investments.iter().map(|p| p.pnl()).sum();
        trading + investments
    }

    // ==================== Tick evaluation ====================

    /// Take-profit is checked before stop-loss: if one tick satisfies
    /// both (malformed thresholds in persisted state), take-profit wins.
    fn tick_trading(
        position: &mut TradingPosition,
        live_price: Decimal,
        balance: &mut Decimal,
        investments: &mut Vec<InvestmentPosition>,
    ) -> Option<TickEvent> {
        if position.status != PositionStatus::Active {
            return None;
        }

        if live_price >= position.take_profit {
            position.status = PositionStatus::TakeProfitHit;
            position.current_price = live_price;

            let event = Self::split_profit(position, investments, balance);
            return Some(event);
        }

        if live_price <= position.stop_loss {
            position.status = PositionStatus::StopLossHit;
            position.current_price = live_price;

            let credited = position.amount * position.stop_loss;
            *balance += credited;

            warn!(
                id = %position.id,
                symbol = %position.symbol,
                stop = %position.stop_loss,
                credited = %credited,
                "Stop loss hit"
            );

            return Some(TickEvent::StopLoss {
                position_id: position.id,
                symbol: position.symbol.clone(),
                credited,
            });
        }

        position.current_price = live_price;
        None
    }

    /// Split realized profit: principal plus the retained share goes back
    /// to the wallet, the invested share becomes a new investment position
    /// targeting twice the take-profit level. Single step, no intermediate
    /// state is observable.
    fn split_profit(
        position: &TradingPosition,
        investments: &mut Vec<InvestmentPosition>,
        balance: &mut Decimal,
    ) -> TickEvent {
        let exit_value = position.amount * position.take_profit;
        let gross_profit = exit_value - position.amount * position.entry_price;
        let invested_share = gross_profit * INVESTED_PROFIT_SHARE;

        let credited = exit_value - invested_share;
        *balance += credited;

        let investment = InvestmentPosition {
            id: Uuid::new_v4(),
            symbol: position.symbol.clone(),
            amount: invested_share / position.take_profit,
            entry_price: position.take_profit,
            current_price: position.take_profit,
            investment_tp: position.take_profit * INVESTMENT_TP_MULTIPLIER,
            status: InvestmentStatus::Active,
            created_at: Utc::now(),
            origin_trading_id: position.id,
        };

        info!(
            id = %position.id,
            symbol = %position.symbol,
            gross_profit = %gross_profit,
            retained = %(gross_profit * RETAINED_PROFIT_SHARE),
            invested = %invested_share,
            investment_id = %investment.id,
            "Take profit hit, profit split applied"
        );

        let event = TickEvent::TakeProfit {
            position_id: position.id,
            symbol: position.symbol.clone(),
            gross_profit,
            credited,
            investment_id: investment.id,
        };

        investments.push(investment);
        event
    }

    fn tick_investment(
        position: &mut InvestmentPosition,
        live_price: Decimal,
    ) -> Option<TickEvent> {
        if position.status != InvestmentStatus::Active {
            return None;
        }

        position.current_price = live_price;

        if live_price >= position.investment_tp {
            position.status = InvestmentStatus::TakeProfitHit;

            debug!(
                id = %position.id,
                symbol = %position.symbol,
                target = %position.investment_tp,
                "Investment target reached"
            );

            return Some(TickEvent::InvestmentTarget {
                position_id: position.id,
                symbol: position.symbol.clone(),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn funded_wallet() -> Wallet {
        Wallet::new(dec!(10000))
    }

    fn open_btc(wallet: &mut Wallet) -> Uuid {
        wallet
            .open_position(OpenPositionRequest {
                symbol: "BTC".to_string(),
                entry_price: dec!(100),
                take_profit: dec!(150),
                stop_loss: dec!(90),
                allocation_type: AllocationType::Btc,
            })
            .unwrap()
            .id
    }

    fn quotes(entries: &[(&str, Decimal)]) -> HashMap<String, Quote> {
        entries
            .iter()
            .map(|(s, p)| (s.to_string(), Quote::new(*p, Decimal::ZERO)))
            .collect()
    }

    #[test]
    fn test_open_position_sizing_and_debit() {
        let mut wallet = funded_wallet();
        let id = open_btc(&mut wallet);

        // 20% of 10000 = 2000 at entry 100 -> 20 units
        let position = wallet.trading.iter().find(|p| p.id == id).unwrap();
        assert_eq!(position.amount, dec!(20));
        assert_eq!(wallet.balance, dec!(8000));
        assert_eq!(position.status, PositionStatus::Active);
    }

    #[test]
    fn test_open_position_rejects_bad_thresholds() {
        let mut wallet = funded_wallet();

        let err = wallet
            .open_position(OpenPositionRequest {
                symbol: "BTC".to_string(),
                entry_price: dec!(100),
                take_profit: dec!(95), // below entry
                stop_loss: dec!(90),
                allocation_type: AllocationType::Btc,
            })
            .unwrap_err();

        assert!(matches!(err, PortfolioError::Validation(_)));
        assert_eq!(wallet.balance, dec!(10000));
        assert!(wallet.trading.is_empty());
    }

    #[test]
    fn test_open_position_with_empty_wallet_fails() {
        let mut wallet = Wallet::new(Decimal::ZERO);

        let err = wallet
            .open_position(OpenPositionRequest {
                symbol: "BTC".to_string(),
                entry_price: dec!(100),
                take_profit: dec!(150),
                stop_loss: dec!(90),
                allocation_type: AllocationType::Btc,
            })
            .unwrap_err();

        assert!(matches!(err, PortfolioError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_take_profit_split() {
        let mut wallet = funded_wallet();
        let id = open_btc(&mut wallet);

        let event = wallet.apply_price_tick(id, dec!(150)).unwrap().unwrap();

        // gross = 20*150 - 20*100 = 1000; credited = 3000 - 700 = 2300
        match &event {
            TickEvent::TakeProfit {
                gross_profit,
                credited,
                ..
            } => {
                assert_eq!(*gross_profit, dec!(1000));
                assert_eq!(*credited, dec!(2300));
            }
            other => panic!("expected take profit, got {other:?}"),
        }

        assert_eq!(wallet.balance, dec!(8000) + dec!(2300));

        let position = wallet.trading.iter().find(|p| p.id == id).unwrap();
        assert_eq!(position.status, PositionStatus::TakeProfitHit);

        // Investment side: 700 / 150 tokens targeting 300
        assert_eq!(wallet.investments.len(), 1);
        let investment = &wallet.investments[0];
        assert_eq!(investment.amount, dec!(700) / dec!(150));
        assert_eq!(investment.entry_price, dec!(150));
        assert_eq!(investment.investment_tp, dec!(300));
        assert_eq!(investment.origin_trading_id, id);
        assert_eq!(investment.status, InvestmentStatus::Active);
    }

    #[test]
    fn test_stop_loss_settlement() {
        let mut wallet = funded_wallet();
        let id = open_btc(&mut wallet);

        let event = wallet.apply_price_tick(id, dec!(90)).unwrap().unwrap();

        match &event {
            TickEvent::StopLoss { credited, .. } => assert_eq!(*credited, dec!(1800)),
            other => panic!("expected stop loss, got {other:?}"),
        }

        assert_eq!(wallet.balance, dec!(8000) + dec!(1800));
        let position = wallet.trading.iter().find(|p| p.id == id).unwrap();
        assert_eq!(position.status, PositionStatus::StopLossHit);
        assert!(wallet.investments.is_empty());
    }

    #[test]
    fn test_between_thresholds_updates_price_only() {
        let mut wallet = funded_wallet();
        let id = open_btc(&mut wallet);
        let balance_after_open = wallet.balance;

        let event = wallet.apply_price_tick(id, dec!(120)).unwrap();
        assert!(event.is_none());

        let position = wallet.trading.iter().find(|p| p.id == id).unwrap();
        assert_eq!(position.current_price, dec!(120));
        assert_eq!(position.status, PositionStatus::Active);
        assert_eq!(wallet.balance, balance_after_open);
    }

    #[test]
    fn test_terminal_positions_ignore_ticks() {
        let mut wallet = funded_wallet();
        let id = open_btc(&mut wallet);

        wallet.apply_price_tick(id, dec!(150)).unwrap();
        let balance = wallet.balance;
        let investments = wallet.investments.len();

        // Further ticks must not re-trigger the split
        let event = wallet.apply_price_tick(id, dec!(200)).unwrap();
        assert!(event.is_none());
        assert_eq!(wallet.balance, balance);
        assert_eq!(wallet.investments.len(), investments);
    }

    #[test]
    fn test_take_profit_wins_tie_break_on_malformed_state() {
        // Hand-built malformed position (tp <= sl) as it could exist in
        // old persisted state; open_position would reject it today.
        let mut wallet = Wallet::new(Decimal::ZERO);
        wallet.trading.push(TradingPosition {
            id: Uuid::new_v4(),
            symbol: "BTC".to_string(),
            entry_price: dec!(100),
            amount: dec!(1),
            take_profit: dec!(80),
            stop_loss: dec!(90),
            allocation_type: AllocationType::Btc,
            current_price: dec!(100),
            status: PositionStatus::Active,
            opened_at: Utc::now(),
        });
        let id = wallet.trading[0].id;

        // 85 satisfies both live >= tp and live <= sl
        let event = wallet.apply_price_tick(id, dec!(85)).unwrap().unwrap();
        assert!(matches!(event, TickEvent::TakeProfit { .. }));
    }

    #[test]
    fn test_investment_tick_is_informational() {
        let mut wallet = funded_wallet();
        let id = open_btc(&mut wallet);
        wallet.apply_price_tick(id, dec!(150)).unwrap();

        let investment_id = wallet.investments[0].id;
        let balance = wallet.balance;

        let event = wallet
            .apply_investment_tick(investment_id, dec!(300))
            .unwrap()
            .unwrap();

        assert!(matches!(event, TickEvent::InvestmentTarget { .. }));
        assert_eq!(
            wallet.investments[0].status,
            InvestmentStatus::TakeProfitHit
        );
        // No payout on investment target
        assert_eq!(wallet.balance, balance);
    }

    #[test]
    fn test_close_trading_pays_out_any_status() {
        let mut wallet = funded_wallet();
        let id = open_btc(&mut wallet);
        wallet.apply_price_tick(id, dec!(150)).unwrap();
        let balance = wallet.balance;

        // Closing a tp-hit position still pays out at its last price
        let closed = wallet.close_trading(id).unwrap();
        assert_eq!(closed.status, PositionStatus::TakeProfitHit);
        assert_eq!(wallet.balance, balance + dec!(20) * dec!(150));
        assert!(wallet.trading.is_empty());
    }

    #[test]
    fn test_close_investment_credits_nothing() {
        let mut wallet = funded_wallet();
        let id = open_btc(&mut wallet);
        wallet.apply_price_tick(id, dec!(150)).unwrap();

        let investment_id = wallet.investments[0].id;
        let balance = wallet.balance;

        wallet.close_investment(investment_id).unwrap();
        assert_eq!(wallet.balance, balance);
        assert!(wallet.investments.is_empty());
    }

    #[test]
    fn test_apply_prices_uniform_snapshot() {
        let mut wallet = funded_wallet();
        let btc = open_btc(&mut wallet);
        let eth = wallet
            .open_position(OpenPositionRequest {
                symbol: "ETH".to_string(),
                entry_price: dec!(50),
                take_profit: dec!(80),
                stop_loss: dec!(40),
                allocation_type: AllocationType::Eth,
            })
            .unwrap()
            .id;

        // BTC triggers take profit, ETH only updates, SOL has no position
        let events = wallet.apply_prices(&quotes(&[
            ("BTC", dec!(160)),
            ("ETH", dec!(60)),
            ("SOL", dec!(98)),
        ]));

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TickEvent::TakeProfit { position_id, .. } if position_id == btc));

        let eth_position = wallet.trading.iter().find(|p| p.id == eth).unwrap();
        assert_eq!(eth_position.current_price, dec!(60));
        assert_eq!(eth_position.status, PositionStatus::Active);
    }

    #[test]
    fn test_deposit_validation() {
        let mut wallet = Wallet::default();
        assert!(wallet.deposit(dec!(-5)).is_err());
        wallet.deposit(dec!(500)).unwrap();
        assert_eq!(wallet.balance, dec!(500));
    }
}
