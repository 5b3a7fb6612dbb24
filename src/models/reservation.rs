use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for copy_reservations table.
///
/// One buy-side copy fill scoped to (config, market, outcome). The row is
/// written `pending` while position headroom is reserved and the exchange
/// order is in flight; a failed submission deletes it, a confirmed one
/// promotes it to `filled`. Sell matching then draws it down FIFO.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CopyReservation {
    pub id: Uuid,
    pub config_id: Uuid,
    pub market_id: String,
    pub token_id: String,
    pub outcome_index: i32,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Leader's own fill size when this reservation was opened. Denominator
    /// for the fixed-mode actual-ratio computation on the sell side.
    pub leader_quantity: Decimal,
    pub matched_quantity: Decimal,
    pub status: String,
    pub exchange_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CopyReservation {
    /// Quantity still available for sell matching.
    pub fn remaining(&self) -> Decimal {
        self.quantity - self.matched_quantity
    }
}

/// Reservation status constants.
///
/// State machine: `pending` → `filled` → `partially_matched` → `fully_matched`.
/// A `pending` row whose submission fails is deleted, never advanced.
pub mod reservation_status {
    pub const PENDING: &str = "pending";
    pub const FILLED: &str = "filled";
    pub const PARTIALLY_MATCHED: &str = "partially_matched";
    pub const FULLY_MATCHED: &str = "fully_matched";

    use rust_decimal::Decimal;

    /// Status a reservation lands in once `matched` of `quantity` is sold.
    pub fn after_matching(quantity: Decimal, matched: Decimal) -> &'static str {
        if matched >= quantity {
            FULLY_MATCHED
        } else if matched > Decimal::ZERO {
            PARTIALLY_MATCHED
        } else {
            FILLED
        }
    }
}
