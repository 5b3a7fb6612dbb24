use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use crate::exchange::signer::SignatureType;

/// Sizing mode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizingMode {
    /// Copy quantity = leader quantity × ratio.
    Ratio,
    /// Copy quantity = fixed notional ÷ leader price.
    Fixed,
}

impl SizingMode {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fixed" => SizingMode::Fixed,
            _ => SizingMode::Ratio,
        }
    }
}

impl fmt::Display for SizingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizingMode::Ratio => write!(f, "ratio"),
            SizingMode::Fixed => write!(f, "fixed"),
        }
    }
}

/// Database row for copy_configs table.
///
/// One (account, leader) following relationship with its own sizing, risk
/// and filter rules. Read-only to the trade-processing core: each decision
/// loads the row once and uses it as an immutable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CopyConfig {
    pub id: Uuid,
    pub account_id: Uuid,
    pub leader_id: Uuid,
    pub sizing_mode: String,
    pub ratio: Decimal,
    pub fixed_notional: Decimal,
    pub min_order_notional: Option<Decimal>,
    pub max_order_notional: Option<Decimal>,
    pub max_daily_orders: Option<i64>,
    pub max_daily_loss: Option<Decimal>,
    pub price_tolerance_pct: Option<Decimal>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub max_spread: Option<Decimal>,
    pub min_top_depth: Option<Decimal>,
    pub min_book_depth: Option<Decimal>,
    pub max_position_value: Option<Decimal>,
    pub max_position_count: Option<i64>,
    pub follow_sells: bool,
    pub order_delay_secs: i64,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CopyConfig {
    pub fn mode(&self) -> SizingMode {
        SizingMode::from_str(&self.sizing_mode)
    }
}

/// Wallet kind constants for accounts.wallet_kind.
pub mod wallet_kind {
    pub const EOA: &str = "eoa";
    pub const POLY_PROXY: &str = "poly_proxy";
    pub const POLY_GNOSIS_SAFE: &str = "poly_gnosis_safe";
}

/// Database row for accounts table — one funded exchange wallet.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FundedAccount {
    pub id: Uuid,
    pub wallet_address: String,
    pub proxy_address: Option<String>,
    pub wallet_kind: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl FundedAccount {
    /// Order signature type for this wallet kind.
    pub fn signature_type(&self) -> SignatureType {
        match self.wallet_kind.as_str() {
            wallet_kind::POLY_PROXY => SignatureType::Poly,
            wallet_kind::POLY_GNOSIS_SAFE => SignatureType::PolyGnosisSafe,
            _ => SignatureType::Eoa,
        }
    }

    /// The maker address orders are placed under: the proxy wallet when one
    /// exists for a proxy-style account, the signing wallet otherwise.
    pub fn maker_address(&self) -> &str {
        match (&self.proxy_address, self.wallet_kind.as_str()) {
            (Some(proxy), wallet_kind::POLY_PROXY) => proxy,
            (Some(proxy), wallet_kind::POLY_GNOSIS_SAFE) => proxy,
            _ => &self.wallet_address,
        }
    }
}

/// Database row for leaders table — a market participant being copied.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Leader {
    pub id: Uuid,
    pub wallet_address: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(kind: &str, proxy: Option<&str>) -> FundedAccount {
        FundedAccount {
            id: Uuid::new_v4(),
            wallet_address: "0xabc".into(),
            proxy_address: proxy.map(String::from),
            wallet_kind: kind.into(),
            created_at: None,
        }
    }

    #[test]
    fn sizing_mode_parse() {
        assert_eq!(SizingMode::from_str("fixed"), SizingMode::Fixed);
        assert_eq!(SizingMode::from_str("FIXED"), SizingMode::Fixed);
        assert_eq!(SizingMode::from_str("ratio"), SizingMode::Ratio);
        assert_eq!(SizingMode::from_str("anything"), SizingMode::Ratio);
    }

    #[test]
    fn signature_type_follows_wallet_kind() {
        assert_eq!(account(wallet_kind::EOA, None).signature_type(), SignatureType::Eoa);
        assert_eq!(
            account(wallet_kind::POLY_PROXY, None).signature_type(),
            SignatureType::Poly
        );
        assert_eq!(
            account(wallet_kind::POLY_GNOSIS_SAFE, None).signature_type(),
            SignatureType::PolyGnosisSafe
        );
        assert_eq!(account("unknown", None).signature_type(), SignatureType::Eoa);
    }

    #[test]
    fn maker_prefers_proxy_for_proxy_wallets() {
        assert_eq!(
            account(wallet_kind::POLY_PROXY, Some("0xproxy")).maker_address(),
            "0xproxy"
        );
        assert_eq!(account(wallet_kind::POLY_PROXY, None).maker_address(), "0xabc");
        assert_eq!(account(wallet_kind::EOA, Some("0xproxy")).maker_address(), "0xabc");
    }
}
