pub mod buy;
pub mod filter;
pub mod pricing;
pub mod sell;
pub mod sizing;
pub mod submit;

pub use filter::{FilterInput, FilterVerdict};
pub use submit::{SubmitPolicy, MAX_SUBMIT_ATTEMPTS};

use metrics::counter;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{filtered_repo, market_repo};
use crate::dispatch::KeyedLocks;
use crate::errors::{CopyError, RejectReason};
use crate::exchange::{ExchangeApi, OrderSigner};
use crate::models::{CopyConfig, LeaderTrade, Side};
use crate::services::notifier::{self, Notifier};

/// Engine-wide knobs, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub submit_policy: SubmitPolicy,
    /// Validate the full pipeline but release every reservation instead of
    /// submitting to the exchange.
    pub dry_run: bool,
}

/// What one pipeline run did for one configuration.
#[derive(Debug)]
pub enum PipelineOutcome {
    Submitted { order_id: String },
    /// Pipeline validated end to end, order withheld.
    DryRun,
    Filtered(RejectReason),
    Skipped(&'static str),
}

/// Buy and sell pipelines for all configurations. One instance serves every
/// worker; per-(config, market) serialization happens inside.
pub struct CopyEngine {
    pool: PgPool,
    exchange: Arc<dyn ExchangeApi>,
    signer: Arc<dyn OrderSigner>,
    notifier: Option<Arc<Notifier>>,
    /// Serializes the read-check-reserve section per (config, market) so two
    /// concurrent buys cannot both observe the same headroom. Sells reuse it
    /// to keep FIFO drawdown single-writer.
    position_locks: KeyedLocks<(Uuid, String)>,
    settings: EngineSettings,
}

impl CopyEngine {
    pub fn new(
        pool: PgPool,
        exchange: Arc<dyn ExchangeApi>,
        signer: Arc<dyn OrderSigner>,
        notifier: Option<Arc<Notifier>>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            pool,
            exchange,
            signer,
            notifier,
            position_locks: KeyedLocks::new(),
            settings,
        }
    }

    /// Drop lock entries nobody currently holds.
    pub async fn purge_locks(&self) {
        self.position_locks.purge().await;
    }

    /// Exchange token id for (market, outcome index), cached in the markets
    /// table. An index with no matching token is a resolution failure — the
    /// config is skipped rather than guessing a different outcome.
    async fn resolve_token(
        &self,
        market_id: &str,
        outcome_index: i32,
    ) -> Result<String, CopyError> {
        if let Some(token) = market_repo::get_token(&self.pool, market_id, outcome_index).await? {
            return Ok(token.token_id);
        }

        let market = self
            .exchange
            .get_market(market_id)
            .await
            .map_err(|e| CopyError::Resolution(format!("market {market_id} lookup: {e}")))?;

        let token = market
            .tokens
            .get(outcome_index as usize)
            .ok_or_else(|| {
                CopyError::Resolution(format!(
                    "market {market_id} has no outcome index {outcome_index}"
                ))
            })?;

        if let Err(e) = market_repo::upsert_token(
            &self.pool,
            market_id,
            outcome_index,
            &token.token_id,
            Some(&token.outcome),
        )
        .await
        {
            tracing::warn!(market = %market_id, error = %e, "Failed to cache token mapping");
        }

        Ok(token.token_id.clone())
    }

    /// Audit trail and user notification for a rejection. Runs detached so
    /// an unreachable audit store or messenger never stalls the pipeline.
    fn emit_reject(
        &self,
        config: &CopyConfig,
        trade: &LeaderTrade,
        side: Side,
        reason: RejectReason,
        detail: Option<String>,
    ) {
        counter!("orders_filtered_total").increment(1);
        tracing::info!(
            config_id = %config.id,
            market = %trade.market_id,
            side = %side,
            reason = %reason,
            "Order filtered"
        );

        let pool = self.pool.clone();
        let notifier = self.notifier.clone();
        let config_id = config.id;
        let market_id = trade.market_id.clone();
        let leader_price = trade.price;

        tokio::spawn(async move {
            if let Err(e) = filtered_repo::record(
                &pool,
                config_id,
                &market_id,
                side,
                leader_price,
                reason,
                detail.as_deref(),
            )
            .await
            {
                tracing::warn!(error = %e, "Failed to record filtered order");
            }

            if let Some(n) = notifier {
                let msg = notifier::format_filtered_order(config_id, &market_id, side, leader_price, reason);
                n.send(&msg).await;
            }
        });
    }

    /// Failure notification after the retry budget is spent. Detached like
    /// `emit_reject`.
    fn emit_failure(&self, config: &CopyConfig, trade: &LeaderTrade, side: Side, error: String) {
        let notifier = self.notifier.clone();
        let config_id = config.id;
        let market_id = trade.market_id.clone();

        tokio::spawn(async move {
            if let Some(n) = notifier {
                let msg = notifier::format_order_failed(config_id, &market_id, side, &error);
                n.send(&msg).await;
            }
        });
    }

    fn notify_detached(&self, msg: String) {
        if let Some(n) = self.notifier.clone() {
            tokio::spawn(async move {
                n.send(&msg).await;
            });
        }
    }
}
