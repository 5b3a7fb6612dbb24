use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::CopyReservation;

/// Open a `pending` reservation. The row doubles as the position-headroom
/// claim, so it is written inside the caller's position lock.
#[allow(clippy::too_many_arguments)]
pub async fn insert_pending(
    pool: &PgPool,
    config_id: Uuid,
    market_id: &str,
    token_id: &str,
    outcome_index: i32,
    quantity: Decimal,
    price: Decimal,
    leader_quantity: Decimal,
) -> anyhow::Result<CopyReservation> {
    let reservation = sqlx::query_as::<_, CopyReservation>(
        r#"
        INSERT INTO copy_reservations
            (config_id, market_id, token_id, outcome_index, quantity, price, leader_quantity, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
        RETURNING *
        "#,
    )
    .bind(config_id)
    .bind(market_id)
    .bind(token_id)
    .bind(outcome_index)
    .bind(quantity)
    .bind(price)
    .bind(leader_quantity)
    .fetch_one(pool)
    .await?;

    Ok(reservation)
}

/// Promote a pending reservation once the exchange confirms the order.
pub async fn mark_filled(pool: &PgPool, id: Uuid, exchange_order_id: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE copy_reservations
        SET status = 'filled', exchange_order_id = $2
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(exchange_order_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Release a reservation whose submission failed. Only `pending` rows are
/// eligible; anything later in the state machine stays.
pub async fn delete_pending(pool: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM copy_reservations WHERE id = $1 AND status = 'pending'")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Confirmed reservations with quantity left to sell, oldest first. Pending
/// rows are excluded: an unconfirmed buy cannot back a sell.
pub async fn outstanding_fifo(
    pool: &PgPool,
    config_id: Uuid,
    market_id: &str,
    outcome_index: i32,
) -> anyhow::Result<Vec<CopyReservation>> {
    let reservations = sqlx::query_as::<_, CopyReservation>(
        r#"
        SELECT * FROM copy_reservations
        WHERE config_id = $1
          AND market_id = $2
          AND outcome_index = $3
          AND status IN ('filled', 'partially_matched')
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(config_id)
    .bind(market_id)
    .bind(outcome_index)
    .fetch_all(pool)
    .await?;

    Ok(reservations)
}

/// Open position count and unmatched value for (config, market). Pending
/// rows count: the headroom they reserved is spoken for until they resolve.
#[derive(Debug, sqlx::FromRow)]
pub struct OpenExposure {
    pub count: i64,
    pub value: Decimal,
}

pub async fn open_exposure(
    pool: &PgPool,
    config_id: Uuid,
    market_id: &str,
) -> anyhow::Result<OpenExposure> {
    let exposure = sqlx::query_as::<_, OpenExposure>(
        r#"
        SELECT COUNT(*) AS count,
               COALESCE(SUM((quantity - matched_quantity) * price), 0) AS value
        FROM copy_reservations
        WHERE config_id = $1 AND market_id = $2 AND status != 'fully_matched'
        "#,
    )
    .bind(config_id)
    .bind(market_id)
    .fetch_one(pool)
    .await?;

    Ok(exposure)
}

/// Reservations opened today for the daily-order cap.
pub async fn opened_today(pool: &PgPool, config_id: Uuid) -> anyhow::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM copy_reservations
        WHERE config_id = $1 AND created_at >= CURRENT_DATE
        "#,
    )
    .bind(config_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Apply a planned FIFO drawdown in one transaction. The status is derived
/// from the updated matched quantity in SQL so the rows stay consistent
/// even if the caller's snapshot is stale.
pub async fn apply_drawdown(pool: &PgPool, draws: &[(Uuid, Decimal)]) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for (id, quantity) in draws {
        sqlx::query(
            r#"
            UPDATE copy_reservations
            SET matched_quantity = matched_quantity + $2,
                status = CASE
                    WHEN matched_quantity + $2 >= quantity THEN 'fully_matched'
                    WHEN matched_quantity + $2 > 0 THEN 'partially_matched'
                    ELSE 'filled'
                END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(())
}

/// Undo a drawdown after a failed sell submission. Reverse order of the
/// apply so FIFO shape is restored exactly.
pub async fn revert_drawdown(pool: &PgPool, draws: &[(Uuid, Decimal)]) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    for (id, quantity) in draws.iter().rev() {
        sqlx::query(
            r#"
            UPDATE copy_reservations
            SET matched_quantity = matched_quantity - $2,
                status = CASE
                    WHEN matched_quantity - $2 >= quantity THEN 'fully_matched'
                    WHEN matched_quantity - $2 > 0 THEN 'partially_matched'
                    ELSE 'filled'
                END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(())
}
