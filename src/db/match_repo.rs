use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::MatchRecord;

/// One reservation's contribution to a match, as computed by the sell
/// planner.
#[derive(Debug, Clone)]
pub struct MatchDetailInput {
    pub reservation_id: Uuid,
    pub quantity: Decimal,
    pub realized_pnl: Decimal,
}

/// Persist one confirmed sell: the aggregate record plus one detail row per
/// contributing reservation, atomically.
#[allow(clippy::too_many_arguments)]
pub async fn record_match(
    pool: &PgPool,
    config_id: Uuid,
    market_id: &str,
    token_id: &str,
    quantity: Decimal,
    sell_price: Decimal,
    realized_pnl: Decimal,
    exchange_order_id: &str,
    details: &[MatchDetailInput],
) -> anyhow::Result<MatchRecord> {
    let mut tx = pool.begin().await?;

    let record = sqlx::query_as::<_, MatchRecord>(
        r#"
        INSERT INTO match_records
            (config_id, market_id, token_id, quantity, sell_price, realized_pnl, exchange_order_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(config_id)
    .bind(market_id)
    .bind(token_id)
    .bind(quantity)
    .bind(sell_price)
    .bind(realized_pnl)
    .bind(exchange_order_id)
    .fetch_one(&mut *tx)
    .await?;

    for detail in details {
        sqlx::query(
            r#"
            INSERT INTO match_details (match_id, reservation_id, quantity, realized_pnl)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.id)
        .bind(detail.reservation_id)
        .bind(detail.quantity)
        .bind(detail.realized_pnl)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(record)
}

/// Sell orders recorded today for the daily-order cap.
pub async fn matches_today(pool: &PgPool, config_id: Uuid) -> anyhow::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM match_records
        WHERE config_id = $1 AND created_at >= CURRENT_DATE
        "#,
    )
    .bind(config_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Today's realized P&L for the daily-loss cap.
pub async fn realized_pnl_today(pool: &PgPool, config_id: Uuid) -> anyhow::Result<Decimal> {
    let row: (Option<Decimal>,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(realized_pnl), 0) FROM match_records
        WHERE config_id = $1 AND created_at >= CURRENT_DATE
        "#,
    )
    .bind(config_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0.unwrap_or(Decimal::ZERO))
}
