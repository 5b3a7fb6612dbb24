use metrics::{counter, histogram};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

use crate::db::{config_repo, processed_repo};
use crate::engine::CopyEngine;
use crate::errors::CopyError;
use crate::models::{Leader, LeaderTrade, Side, TradeSource};

use super::KeyedLocks;

/// What `handle` did with a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// First delivery: pipelines ran and the dedup row was written.
    Processed,
    /// The trade was already handled, by this delivery path or another.
    Duplicate,
}

/// Entry point for every observed leader trade, from any feed.
///
/// One trade is processed exactly once across all deliveries: a per
/// (leader, trade id) lock serializes redeliveries, and a dedup ledger row
/// makes later ones no-ops.
pub struct Dispatcher {
    pool: PgPool,
    engine: Arc<CopyEngine>,
    trade_locks: KeyedLocks<(uuid::Uuid, String)>,
}

impl Dispatcher {
    pub fn new(pool: PgPool, engine: Arc<CopyEngine>) -> Self {
        Self {
            pool,
            engine,
            trade_locks: KeyedLocks::new(),
        }
    }

    /// Drop uncontended lock entries here and in the engine.
    pub async fn purge_locks(&self) {
        self.trade_locks.purge().await;
        self.engine.purge_locks().await;
    }

    /// Process one leader trade: dedup check, per-config pipeline fan-out,
    /// dedup ledger write.
    ///
    /// Per-config failures are logged and isolated; only trade-level
    /// failures (unknown side, storage) surface, and those leave no ledger
    /// row so a redelivery may retry.
    pub async fn handle(
        &self,
        leader: &Leader,
        trade: &LeaderTrade,
        source: TradeSource,
    ) -> Result<DispatchOutcome, CopyError> {
        counter!("trades_received_total").increment(1);
        let started = Instant::now();

        let _guard = self
            .trade_locks
            .lock((leader.id, trade.trade_id.clone()))
            .await;

        if processed_repo::exists(&self.pool, leader.id, &trade.trade_id).await? {
            counter!("trades_deduplicated_total").increment(1);
            tracing::debug!(
                leader = %leader.wallet_address,
                trade_id = %trade.trade_id,
                source = %source,
                "Trade already processed"
            );
            return Ok(DispatchOutcome::Duplicate);
        }

        let side = Side::from_api_str(&trade.side)
            .ok_or_else(|| CopyError::UnknownSide(trade.side.clone()))?;

        tracing::info!(
            leader = %leader.wallet_address,
            trade = %trade,
            side = %side,
            source = %source,
            "Processing leader trade"
        );

        let configs = config_repo::active_configs_for_leader(&self.pool, leader.id).await?;
        if configs.is_empty() {
            tracing::debug!(leader = %leader.wallet_address, "No active followers");
        }

        for config in &configs {
            let account = match config_repo::get_account(&self.pool, config.account_id).await {
                Ok(Some(account)) => account,
                Ok(None) => {
                    tracing::warn!(
                        config_id = %config.id,
                        account_id = %config.account_id,
                        "Account missing; skipping config"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::error!(config_id = %config.id, error = %e, "Account load failed");
                    continue;
                }
            };

            let result = match side {
                Side::Buy => self.engine.process_buy(config, &account, trade).await,
                Side::Sell => {
                    if !config.follow_sells {
                        tracing::debug!(config_id = %config.id, "Config does not follow sells");
                        continue;
                    }
                    self.engine.process_sell(config, &account, trade).await
                }
            };

            match result {
                Ok(outcome) => {
                    tracing::debug!(config_id = %config.id, outcome = ?outcome, "Config done")
                }
                Err(e) => {
                    tracing::error!(config_id = %config.id, error = %e, "Config failed")
                }
            }
        }

        // Best-effort ledger write: losing a uniqueness race just means the
        // trade was handled somewhere else in the meantime.
        let inserted = processed_repo::insert(&self.pool, leader.id, &trade.trade_id).await?;
        histogram!("trade_processing_seconds").record(started.elapsed().as_secs_f64());

        if inserted {
            Ok(DispatchOutcome::Processed)
        } else {
            counter!("trades_deduplicated_total").increment(1);
            Ok(DispatchOutcome::Duplicate)
        }
    }
}
