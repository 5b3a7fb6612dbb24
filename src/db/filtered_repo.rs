use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::RejectReason;
use crate::models::Side;

/// Write one audit row for a rejected candidate trade.
pub async fn record(
    pool: &PgPool,
    config_id: Uuid,
    market_id: &str,
    side: Side,
    leader_price: Decimal,
    reason: RejectReason,
    detail: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO filtered_orders (config_id, market_id, side, leader_price, reason, detail)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(config_id)
    .bind(market_id)
    .bind(side.to_string())
    .bind(leader_price)
    .bind(reason.code())
    .bind(detail)
    .execute(pool)
    .await?;

    Ok(())
}
