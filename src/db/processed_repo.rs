use sqlx::PgPool;
use uuid::Uuid;

/// Whether a dedup ledger row exists for (leader, trade id).
pub async fn exists(pool: &PgPool, leader_id: Uuid, leader_trade_id: &str) -> anyhow::Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM processed_trades
        WHERE leader_id = $1 AND leader_trade_id = $2
        "#,
    )
    .bind(leader_id)
    .bind(leader_trade_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// Write the dedup ledger row. Returns `false` when the uniqueness
/// constraint fires, meaning another delivery path got there first; that is
/// an expected race, not an error.
pub async fn insert(pool: &PgPool, leader_id: Uuid, leader_trade_id: &str) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO processed_trades (leader_id, leader_trade_id)
        VALUES ($1, $2)
        "#,
    )
    .bind(leader_id)
    .bind(leader_trade_id)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
        Err(e) => Err(e.into()),
    }
}
