use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::errors::RejectReason;
use crate::models::Side;

/// Telegram notification service. Failures are logged but never block the main flow.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }

    /// Send a Telegram message. Failures are logged as warnings.
    pub async fn send(&self, message: &str) {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token
        );

        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    tracing::warn!(
                        status = %resp.status(),
                        "Telegram sendMessage returned non-2xx"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send Telegram notification");
            }
        }
    }
}

fn short_market(market_id: &str) -> &str {
    &market_id[..16.min(market_id.len())]
}

/// Format a filter/risk rejection notification.
pub fn format_filtered_order(
    config_id: Uuid,
    market_id: &str,
    side: Side,
    leader_price: Decimal,
    reason: RejectReason,
) -> String {
    format!(
        "*Order Filtered*\nConfig: `{}`\nSide: {}\nLeader Price: {}\nReason: {}\nMarket: `{}`",
        config_id,
        side,
        leader_price,
        reason.code(),
        short_market(market_id),
    )
}

/// Format a submission-failure notification, sent once the retry budget is
/// spent and the reservation is rolled back.
pub fn format_order_failed(config_id: Uuid, market_id: &str, side: Side, error: &str) -> String {
    format!(
        "*Order Failed*\nConfig: `{}`\nSide: {}\nMarket: `{}`\nError: {}",
        config_id,
        side,
        short_market(market_id),
        error,
    )
}

/// Format a confirmed-submission notification.
pub fn format_order_submitted(
    side: Side,
    quantity: Decimal,
    price: Decimal,
    market_id: &str,
    order_id: &str,
) -> String {
    format!(
        "*Order Submitted*\nSide: {}\nSize: {} @ {}\nMarket: `{}`\nOrder: `{}`",
        side,
        quantity,
        price,
        short_market(market_id),
        order_id,
    )
}

/// Format a completed sell match with its realized P&L.
pub fn format_match_result(
    market_id: &str,
    quantity: Decimal,
    price: Decimal,
    realized_pnl: Decimal,
) -> String {
    format!(
        "*Position Closed*\nSize: {} @ {}\nRealized PnL: {} USDC\nMarket: `{}`",
        quantity,
        price,
        realized_pnl.round_dp(2),
        short_market(market_id),
    )
}
