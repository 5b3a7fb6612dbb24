use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::gauge;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use crate::db::config_repo;
use crate::dispatch::Dispatcher;
use crate::exchange::{ApiActivity, ExchangeApi};
use crate::models::{Leader, LeaderTrade, TradeSource};

/// Activity rows fetched per leader per cycle.
const ACTIVITY_PAGE: u32 = 20;

/// Polls each followed leader's on-chain activity and dispatches new trades.
///
/// The active leader set lives in a watch channel: `restart` reloads it from
/// the database and is safe to call at any time, including while trades are
/// in flight — decisions already keyed to a config snapshot run to
/// completion unaffected.
pub struct LeaderMonitor {
    pool: PgPool,
    exchange: Arc<dyn ExchangeApi>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    limits: Arc<Semaphore>,
    leaders_tx: watch::Sender<Vec<Leader>>,
}

impl LeaderMonitor {
    pub fn new(
        pool: PgPool,
        exchange: Arc<dyn ExchangeApi>,
        dispatcher: Arc<Dispatcher>,
        interval_secs: u64,
        max_concurrent_trades: usize,
    ) -> Self {
        let (leaders_tx, _) = watch::channel(Vec::new());
        Self {
            pool,
            exchange,
            dispatcher,
            interval: Duration::from_secs(interval_secs),
            limits: Arc::new(Semaphore::new(max_concurrent_trades)),
            leaders_tx,
        }
    }

    /// Reload the followed-leader set. Invoked at startup and whenever
    /// configurations change.
    pub async fn restart(&self) -> anyhow::Result<()> {
        let leaders = config_repo::active_leaders(&self.pool).await?;
        gauge!("active_leaders").set(leaders.len() as f64);
        tracing::info!(leader_count = leaders.len(), "Leader set loaded");
        self.leaders_tx.send_replace(leaders);
        Ok(())
    }

    /// Poll loop. Wakes on the polling interval or on a leader-set change,
    /// whichever comes first.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Leader monitor started"
        );

        if let Err(e) = self.restart().await {
            tracing::error!(error = %e, "Initial leader load failed");
        }

        let mut rx = self.leaders_tx.subscribe();
        // Per-leader high-water mark; leaders enter at "now" so only trades
        // made after we started following are copied.
        let mut last_seen: HashMap<Uuid, DateTime<Utc>> = HashMap::new();

        loop {
            tokio::select! {
                _ = sleep(self.interval) => {}
                changed = rx.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Leader channel closed; monitor stopping");
                        return;
                    }
                    tracing::info!("Leader set changed; polling immediately");
                }
            }

            let leaders = rx.borrow_and_update().clone();
            last_seen.retain(|id, _| leaders.iter().any(|l| &l.id == id));
            self.poll_cycle(&leaders, &mut last_seen).await;
        }
    }

    async fn poll_cycle(&self, leaders: &[Leader], last_seen: &mut HashMap<Uuid, DateTime<Utc>>) {
        for leader in leaders {
            let activity = match self
                .exchange
                .get_leader_activity(&leader.wallet_address, ACTIVITY_PAGE)
                .await
            {
                Ok(a) => a,
                Err(e) => {
                    tracing::debug!(
                        leader = %leader.wallet_address,
                        error = %e,
                        "Activity fetch failed"
                    );
                    continue;
                }
            };

            let cutoff = *last_seen.entry(leader.id).or_insert_with(Utc::now);
            let mut latest = cutoff;

            for row in &activity {
                let traded_at =
                    parse_activity_timestamp(row.timestamp.as_ref()).unwrap_or_else(Utc::now);
                if traded_at <= cutoff {
                    continue;
                }
                if traded_at > latest {
                    latest = traded_at;
                }

                let Some(trade) = normalize_activity(row, traded_at) else {
                    tracing::debug!(
                        leader = %leader.wallet_address,
                        "Skipping activity row missing required fields"
                    );
                    continue;
                };

                let permit = match Arc::clone(&self.limits).acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return,
                };
                let dispatcher = Arc::clone(&self.dispatcher);
                let leader = leader.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = dispatcher
                        .handle(&leader, &trade, TradeSource::Poller)
                        .await
                    {
                        tracing::error!(
                            leader = %leader.wallet_address,
                            trade_id = %trade.trade_id,
                            error = %e,
                            "Trade dispatch failed"
                        );
                    }
                });
            }

            if latest > cutoff {
                last_seen.insert(leader.id, latest);
            }
        }
    }
}

/// Turn one activity row into a trade the dispatcher can process. Rows
/// missing an id, market, side or a positive fill are dropped.
fn normalize_activity(row: &ApiActivity, traded_at: DateTime<Utc>) -> Option<LeaderTrade> {
    let trade_id = row
        .id
        .clone()
        .or_else(|| row.transaction_hash.clone())?;
    let market_id = row.condition_id.clone()?;
    let outcome_index = row.outcome_index?;
    let side = row.side.clone()?;
    let price = row.price?;
    let size = row.size?;
    if price <= Decimal::ZERO || size <= Decimal::ZERO {
        return None;
    }

    Some(LeaderTrade {
        trade_id,
        market_id,
        outcome_index,
        side,
        price,
        size,
        timestamp: traded_at,
    })
}

fn parse_activity_timestamp(ts: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    ts.and_then(|t| match t {
        serde_json::Value::Number(n) => {
            let secs = n.as_i64()?;
            // If >1e12, it's milliseconds
            if secs > 1_000_000_000_000 {
                chrono::DateTime::from_timestamp(secs / 1000, ((secs % 1000) * 1_000_000) as u32)
            } else {
                chrono::DateTime::from_timestamp(secs, 0)
            }
        }
        serde_json::Value::String(s) => {
            if let Ok(secs) = s.parse::<i64>() {
                if secs > 1_000_000_000_000 {
                    return chrono::DateTime::from_timestamp(
                        secs / 1000,
                        ((secs % 1000) * 1_000_000) as u32,
                    );
                }
                return chrono::DateTime::from_timestamp(secs, 0);
            }
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    })
}
