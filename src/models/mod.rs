pub mod audit;
pub mod config;
pub mod market;
pub mod matching;
pub mod reservation;

pub use audit::{FilteredOrder, ProcessedTrade};
pub use config::{CopyConfig, FundedAccount, Leader, SizingMode};
pub use market::MarketToken;
pub use matching::{MatchDetail, MatchRecord};
pub use reservation::{reservation_status, CopyReservation};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" | "0" => Some(Side::Buy),
            "SELL" | "1" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// TradeSource — which feed delivered the event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSource {
    WebSocket,
    Poller,
}

impl TradeSource {
    /// Static label for metrics and structured log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            TradeSource::WebSocket => "websocket",
            TradeSource::Poller => "poller",
        }
    }
}

impl fmt::Display for TradeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

// ---------------------------------------------------------------------------
// LeaderTrade — core pipeline message
// ---------------------------------------------------------------------------

/// One observed leader fill, normalized from whichever feed delivered it.
/// The side is kept as the raw feed string; the dispatcher parses it and
/// rejects trades whose side it cannot interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderTrade {
    pub trade_id: String,
    pub market_id: String,
    pub outcome_index: i32,
    pub side: String,
    pub price: Decimal,
    pub size: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for LeaderTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade: id={} market={} outcome={} side={} size={} price={}",
            &self.trade_id[..12.min(self.trade_id.len())],
            &self.market_id[..12.min(self.market_id.len())],
            self.outcome_index,
            self.side,
            self.size,
            self.price,
        )
    }
}
