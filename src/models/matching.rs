use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for match_records table.
///
/// One confirmed sell submission, aggregating the reservations it drew down.
/// Written together with its details in a single transaction; immutable.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchRecord {
    pub id: Uuid,
    pub config_id: Uuid,
    pub market_id: String,
    pub token_id: String,
    pub quantity: Decimal,
    pub sell_price: Decimal,
    pub realized_pnl: Decimal,
    pub exchange_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Database row for match_details table — one reservation's contribution
/// to a match record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchDetail {
    pub id: Uuid,
    pub match_id: Uuid,
    pub reservation_id: Uuid,
    pub quantity: Decimal,
    pub realized_pnl: Decimal,
}
