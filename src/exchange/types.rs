use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market / Token
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiToken {
    pub token_id: String,
    pub outcome: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub winner: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiMarket {
    pub condition_id: String,
    pub question: String,
    #[serde(default)]
    pub tokens: Vec<ApiToken>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
}

// ---------------------------------------------------------------------------
// Order Book
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiOrderBookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiOrderBook {
    pub market: Option<String>,
    pub asset_id: Option<String>,
    #[serde(default)]
    pub bids: Vec<ApiOrderBookLevel>,
    #[serde(default)]
    pub asks: Vec<ApiOrderBookLevel>,
    pub hash: Option<String>,
    pub timestamp: Option<String>,
}

// ---------------------------------------------------------------------------
// Order submission / status
// ---------------------------------------------------------------------------

/// Submission time-in-force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Good-til-cancelled limit order.
    Gtc,
    /// Fill-and-kill: take what crosses immediately, cancel the rest.
    Fak,
    /// Fill-or-kill: all or nothing.
    Fok,
}

/// Response from order placement.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    pub status: Option<String>,
    pub transaction_hash: Option<String>,
}

/// Response from the order status endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub size_matched: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub associate_trades: Option<Vec<String>>,
}

/// One fill of an exchange trade.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiTradeFill {
    pub price: Decimal,
    pub size: Decimal,
}

// ---------------------------------------------------------------------------
// Leader activity (data API)
// ---------------------------------------------------------------------------

/// One row of a wallet's trade activity from the data API. Every field is
/// optional; the monitor skips rows it cannot normalize.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiActivity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub outcome_index: Option<i32>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}
