use sqlx::PgPool;

use crate::models::MarketToken;

/// Cached token mapping for (market, outcome index), if known.
pub async fn get_token(
    pool: &PgPool,
    market_id: &str,
    outcome_index: i32,
) -> anyhow::Result<Option<MarketToken>> {
    let token = sqlx::query_as::<_, MarketToken>(
        "SELECT * FROM markets WHERE market_id = $1 AND outcome_index = $2",
    )
    .bind(market_id)
    .bind(outcome_index)
    .fetch_optional(pool)
    .await?;

    Ok(token)
}

/// Cache a token mapping resolved from the exchange.
pub async fn upsert_token(
    pool: &PgPool,
    market_id: &str,
    outcome_index: i32,
    token_id: &str,
    outcome_label: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO markets (market_id, outcome_index, token_id, outcome_label)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (market_id, outcome_index)
        DO UPDATE SET token_id = $3, outcome_label = $4, updated_at = NOW()
        "#,
    )
    .bind(market_id)
    .bind(outcome_index)
    .bind(token_id)
    .bind(outcome_label)
    .execute(pool)
    .await?;

    Ok(())
}
