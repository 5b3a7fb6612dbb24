use std::fmt;

use thiserror::Error;

use crate::exchange::ExchangeError;

/// Top-level error for one trade/configuration processing attempt.
///
/// Errors never cross configuration boundaries: the dispatcher logs a
/// configuration's error and continues the batch, and only trade-level
/// failures (side parse, config load, ledger write) surface from `handle`.
#[derive(Debug, Error)]
pub enum CopyError {
    /// Missing account/leader/token or an unreachable market endpoint.
    /// Skips the single configuration; the batch continues.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// An exchange read (order book, market lookup) failed. Transient; the
    /// configuration is skipped for this trade.
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// Exchange submission failed after the bounded retry budget.
    #[error("submission failed: {0}")]
    Submit(#[from] SubmitError),

    /// The feed delivered a side string the dispatcher cannot interpret.
    #[error("unknown trade side: {0}")]
    UnknownSide(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Stable rejection codes for filter and risk checks.
///
/// The `code()` string is what gets persisted to the audit table and pushed
/// in notifications; it must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    PriceOutsideRange,
    SpreadTooWide,
    EmptyBook,
    InsufficientTopDepth,
    InsufficientBookDepth,
    PositionCountExceeded,
    PositionValueExceeded,
    BelowMinOrderNotional,
    NoSellersAvailable,
    AskAboveLimit,
    DailyOrderCapReached,
    DailyLossCapReached,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::PriceOutsideRange => "price_outside_range",
            RejectReason::SpreadTooWide => "spread_too_wide",
            RejectReason::EmptyBook => "empty_book",
            RejectReason::InsufficientTopDepth => "insufficient_top_depth",
            RejectReason::InsufficientBookDepth => "insufficient_book_depth",
            RejectReason::PositionCountExceeded => "position_count_exceeded",
            RejectReason::PositionValueExceeded => "position_value_exceeded",
            RejectReason::BelowMinOrderNotional => "below_min_order_notional",
            RejectReason::NoSellersAvailable => "no_sellers_available",
            RejectReason::AskAboveLimit => "ask_above_limit",
            RejectReason::DailyOrderCapReached => "daily_order_cap_reached",
            RejectReason::DailyLossCapReached => "daily_loss_cap_reached",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure classes of one exchange submission attempt. Both are retryable
/// under the same bounded budget.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// HTTP-level failure: request error, non-2xx status, undecodable body.
    #[error("transport error: {0}")]
    Transport(String),

    /// The exchange answered but declined the order, returned no id, or
    /// returned an id that does not match the exchange id format.
    #[error("exchange rejected order: {0}")]
    Rejected(String),
}
