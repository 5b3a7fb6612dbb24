use metrics::counter;
use std::time::Duration;
use tokio::time::sleep;

use crate::errors::SubmitError;
use crate::exchange::{ExchangeApi, OrderArgs, OrderSigner, OrderType};

/// Total submission attempts per order, first try included.
pub const MAX_SUBMIT_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct SubmitPolicy {
    /// Fixed wait between attempts.
    pub backoff: Duration,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
        }
    }
}

/// Sign and submit one order under the bounded retry budget.
///
/// Every attempt re-signs from scratch: the salt and nonce must be fresh,
/// since the exchange treats a replayed signature as a duplicate order.
/// Transport failures and exchange rejections are both retryable; whatever
/// failed last is returned once the budget is spent.
pub async fn submit_with_retry(
    exchange: &dyn ExchangeApi,
    signer: &dyn OrderSigner,
    args: &OrderArgs,
    order_type: OrderType,
    policy: &SubmitPolicy,
) -> Result<String, SubmitError> {
    let mut last_err = SubmitError::Transport("no submission attempted".into());

    for attempt in 1..=MAX_SUBMIT_ATTEMPTS {
        if attempt > 1 {
            counter!("order_submit_retries_total").increment(1);
            sleep(policy.backoff).await;
        }

        match attempt_once(exchange, signer, args, order_type).await {
            Ok(order_id) => return Ok(order_id),
            Err(e) => {
                tracing::warn!(
                    attempt,
                    token_id = %args.token_id,
                    error = %e,
                    "order submission attempt failed"
                );
                last_err = e;
            }
        }
    }

    Err(last_err)
}

async fn attempt_once(
    exchange: &dyn ExchangeApi,
    signer: &dyn OrderSigner,
    args: &OrderArgs,
    order_type: OrderType,
) -> Result<String, SubmitError> {
    let order = signer
        .sign(args)
        .await
        .map_err(|e| SubmitError::Transport(format!("signing failed: {e}")))?;

    let resp = exchange
        .submit_order(&order, order_type)
        .await
        .map_err(|e| SubmitError::Transport(e.to_string()))?;

    if !resp.success {
        let msg = if resp.error_msg.is_empty() {
            resp.status.unwrap_or_else(|| "order not accepted".into())
        } else {
            resp.error_msg
        };
        return Err(SubmitError::Rejected(msg));
    }

    match resp.order_id {
        Some(id) if is_valid_order_id(&id) => Ok(id),
        Some(id) => Err(SubmitError::Rejected(format!("malformed order id: {id}"))),
        None => Err(SubmitError::Rejected("no order id returned".into())),
    }
}

/// Exchange order ids are 0x-prefixed 32-byte hex strings. Anything else
/// is treated as a failed submission and rolled back.
pub fn is_valid_order_id(id: &str) -> bool {
    id.len() == 66
        && id.starts_with("0x")
        && id[2..].chars().all(|c| c.is_ascii_hexdigit())
}
