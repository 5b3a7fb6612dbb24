use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database row for markets table — cached (market, outcome index) → token
/// resolution, filled from the exchange market endpoint on first use.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MarketToken {
    pub market_id: String,
    pub outcome_index: i32,
    pub token_id: String,
    pub outcome_label: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}
