//! Error types shared by the portfolio engines.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::feed::FeedError;

pub type Result<T> = std::result::Result<T, PortfolioError>;

/// Errors surfaced by the planner, DCA tracker, and position engine.
///
/// Every operation aborts with no state change when it returns an error;
/// partial updates are never observable.
#[derive(Debug, Error)]
pub enum PortfolioError {
    /// Missing or out-of-range input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Capital below the planner's minimum.
    #[error("capital {capital} is below the {minimum} minimum")]
    InsufficientCapital { capital: Decimal, minimum: Decimal },

    /// Wallet cannot cover the requested position size.
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// No allocation plan exists for this session yet.
    #[error("no allocation plan exists; run `plan` first")]
    PlanMissing,

    /// Token is not part of the current allocation plan.
    #[error("token {0} is not part of the allocation plan")]
    UnknownToken(String),

    /// Position lookup by id failed.
    #[error("position {0} not found")]
    PositionNotFound(Uuid),

    /// Price feed failure; non-fatal for the polling loop, which degrades
    /// to last-known prices, but fatal for one-shot price queries.
    #[error("price feed error: {0}")]
    Feed(#[from] FeedError),
}
