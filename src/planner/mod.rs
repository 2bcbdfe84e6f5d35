//! Allocation calculator: capital in, allocation plan out.
//!
//! Two regimes:
//! - Large portfolios (>= $50k) use fixed percentage tables, with an
//!   optional airdrop/presale carve-out that rescales everything else.
//! - Smaller portfolios spread capital equally over BTC, ETH, and a
//!   priority-ordered altcoin list capped by the token limit.

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{PortfolioError, Result};
use crate::models::{AllocationPlan, MarketCondition, TokenAllocation};

/// Minimum capital accepted by the planner.
pub const MIN_CAPITAL: Decimal = dec!(500);

/// At or above this, the fixed percentage tables apply.
const LARGE_PORTFOLIO_THRESHOLD: Decimal = dec!(50000);

/// Fixed table for large portfolios: (bucket, percentage, DCA weeks).
const LARGE_STANDARD: [(&str, Decimal, u32); 6] = [
    ("BTC", dec!(30), 60),
    ("ETH", dec!(10), 65),
    ("CORE", dec!(10), 70),
    ("SOL", dec!(10), 65),
    ("MEDIUM-RISK", dec!(30), 85),
    ("HIGH-RISK", dec!(10), 100),
];

/// Altcoin-season variant: BTC is omitted, weight shifts to alts.
const LARGE_ALTCOIN_SEASON: [(&str, Decimal, u32); 5] = [
    ("ETH", dec!(20), 65),
    ("CORE", dec!(15), 70),
    ("SOL", dec!(15), 65),
    ("TOP30", dec!(40), 85),
    ("HIGH-RISK", dec!(10), 100),
];

/// Airdrop/presale carve-out: 5% over 100 weeks; every other bucket is
/// scaled by 0.95 so the plan still totals 100%.
const AIRDROP_BUCKET: (&str, Decimal, u32) = ("AIRDROP", dec!(5), 100);
const AIRDROP_SCALE: Decimal = dec!(0.95);

/// Priority order for small-portfolio altcoin slots after BTC and ETH.
const SMALL_PRIORITY: [&str; 6] = ["SOL", "CORE", "ADA", "DOT", "LINK", "UNI"];

/// Inputs to a plan calculation.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Total investable capital in USD
    pub capital: Decimal,

    /// Market regime, recorded with the plan
    pub market_condition: MarketCondition,

    /// Use the altcoin-season table for large portfolios
    pub altcoin_season: bool,

    /// Carve out the airdrop/presale bucket
    pub airdrop_participation: bool,
}

/// The allocation calculator. Pure: the same request always yields the
/// same plan, modulo the creation timestamp.
pub struct Planner;

impl Planner {
    /// Compute an allocation plan for the request.
    pub fn calculate(request: &PlanRequest) -> Result<AllocationPlan> {
        let capital = request.capital;

        if capital < MIN_CAPITAL {
            return Err(PortfolioError::InsufficientCapital {
                capital,
                minimum: MIN_CAPITAL,
            });
        }

        let max_tokens = Self::max_tokens(capital);

        let allocations = if capital >= LARGE_PORTFOLIO_THRESHOLD {
            Self::large_portfolio(capital, request.altcoin_season, request.airdrop_participation)
        } else {
            Self::small_portfolio(capital, max_tokens)
        };

        Ok(AllocationPlan {
            capital,
            max_tokens,
            allocations,
            market_condition: request.market_condition,
            altcoin_season: request.altcoin_season,
            airdrop_participation: request.airdrop_participation,
            created_at: Utc::now(),
        })
    }

    /// Token-count cap as a step function of capital. The breakpoints and
    /// base offsets (4, 12, 17, 23) are authoritative constants.
    pub fn max_tokens(capital: Decimal) -> u32 {
        let step = |over: Decimal, per: Decimal| -> u32 {
            ((capital - over) / per).floor().to_u32().unwrap_or(0)
        };

        if capital <= dec!(2000) {
            4
        } else if capital <= dec!(10000) {
            4 + step(dec!(2000), dec!(1000))
        } else if capital <= dec!(20000) {
            12 + step(dec!(10000), dec!(2000))
        } else if capital <= dec!(39000) {
            17 + step(dec!(20000), dec!(3000))
        } else {
            23
        }
    }

    /// Fixed-table allocation for large portfolios.
    fn large_portfolio(capital: Decimal, altcoin_season: bool, airdrop: bool) -> Vec<TokenAllocation> {
        let table: &[(&str, Decimal, u32)] = if altcoin_season {
            &LARGE_ALTCOIN_SEASON
        } else {
            &LARGE_STANDARD
        };

        let mut allocations: Vec<TokenAllocation> = table
            .iter()
            .map(|(symbol, percentage, weeks)| {
                TokenAllocation::new(*symbol, *percentage, capital, *weeks)
            })
            .collect();

        if airdrop {
            for alloc in &mut allocations {
                alloc.percentage *= AIRDROP_SCALE;
                alloc.amount *= AIRDROP_SCALE;
            }
            let (symbol, percentage, weeks) = AIRDROP_BUCKET;
            allocations.push(TokenAllocation::new(symbol, percentage, capital, weeks));
        }

        allocations
    }

    /// Equal-split allocation for small portfolios: BTC and ETH always,
    /// then the priority list up to the token cap.
    fn small_portfolio(capital: Decimal, max_tokens: u32) -> Vec<TokenAllocation> {
        let extra_slots = max_tokens.saturating_sub(2) as usize;

        let mut symbols = vec!["BTC", "ETH"];
        symbols.extend(SMALL_PRIORITY.iter().take(extra_slots));

        let percentage = dec!(100) / Decimal::from(symbols.len() as u32);

        symbols
            .into_iter()
            .map(|symbol| {
                let weeks = Self::small_portfolio_weeks(symbol, max_tokens);
                TokenAllocation::new(symbol, percentage, capital, weeks)
            })
            .collect()
    }

    /// DCA duration per token in the small-portfolio regime.
    fn small_portfolio_weeks(symbol: &str, max_tokens: u32) -> u32 {
        match symbol {
            "BTC" => 60,
            "ETH" | "SOL" => 65,
            "CORE" => 70,
            _ if max_tokens <= 4 => 85,
            _ => 100,
        }
    }
}
