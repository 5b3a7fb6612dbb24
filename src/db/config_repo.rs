use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CopyConfig, FundedAccount, Leader};

/// Active copy configs following one leader.
pub async fn active_configs_for_leader(
    pool: &PgPool,
    leader_id: Uuid,
) -> anyhow::Result<Vec<CopyConfig>> {
    let configs = sqlx::query_as::<_, CopyConfig>(
        r#"
        SELECT * FROM copy_configs
        WHERE leader_id = $1 AND is_active = TRUE
        ORDER BY created_at
        "#,
    )
    .bind(leader_id)
    .fetch_all(pool)
    .await?;

    Ok(configs)
}

/// Funded account backing a config.
pub async fn get_account(pool: &PgPool, account_id: Uuid) -> anyhow::Result<Option<FundedAccount>> {
    let account = sqlx::query_as::<_, FundedAccount>("SELECT * FROM accounts WHERE id = $1")
        .bind(account_id)
        .fetch_optional(pool)
        .await?;

    Ok(account)
}

/// All leaders with at least one follower, for the activity monitor.
pub async fn active_leaders(pool: &PgPool) -> anyhow::Result<Vec<Leader>> {
    let leaders = sqlx::query_as::<_, Leader>(
        r#"
        SELECT DISTINCT l.* FROM leaders l
        JOIN copy_configs c ON c.leader_id = l.id AND c.is_active = TRUE
        WHERE l.is_active = TRUE
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(leaders)
}
