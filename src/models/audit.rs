use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for processed_trades table — the dedup ledger.
///
/// At most one row per (leader_id, leader_trade_id), ever; the unique
/// constraint is the dedup mechanism.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessedTrade {
    pub id: Uuid,
    pub leader_id: Uuid,
    pub leader_trade_id: String,
    pub processed_at: DateTime<Utc>,
}

/// Database row for filtered_orders table.
///
/// Audit record for a candidate trade the filter or risk checks rejected.
/// Write-once; never read back by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FilteredOrder {
    pub id: Uuid,
    pub config_id: Uuid,
    pub market_id: String,
    pub side: String,
    pub leader_price: Decimal,
    pub reason: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}
