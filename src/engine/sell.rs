use metrics::counter;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::{match_repo, reservation_repo};
use crate::errors::CopyError;
use crate::exchange::{OrderArgs, OrderType};
use crate::models::{reservation_status, CopyConfig, CopyReservation, FundedAccount, LeaderTrade, Side};
use crate::services::notifier;

use super::{filter, pricing, sizing, submit, CopyEngine, PipelineOutcome};

/// One reservation's share of a planned sell.
#[derive(Debug, Clone)]
pub struct PlannedMatch {
    pub reservation_id: Uuid,
    pub reservation_price: Decimal,
    pub quantity: Decimal,
    pub realized_pnl: Decimal,
    pub new_matched: Decimal,
    pub new_status: &'static str,
}

/// Walk the FIFO list consuming `min(remaining, still needed)` from each
/// reservation until the needed quantity is exhausted. P&L per reservation
/// is `(sell price − entry price) × matched quantity`.
pub fn match_plan(
    outstanding: &[CopyReservation],
    needed: Decimal,
    sell_price: Decimal,
) -> Vec<PlannedMatch> {
    let mut plan = Vec::new();
    let mut still_needed = needed;

    for reservation in outstanding {
        if still_needed <= Decimal::ZERO {
            break;
        }
        let take = reservation.remaining().min(still_needed);
        if take <= Decimal::ZERO {
            continue;
        }

        let new_matched = reservation.matched_quantity + take;
        plan.push(PlannedMatch {
            reservation_id: reservation.id,
            reservation_price: reservation.price,
            quantity: take,
            realized_pnl: (sell_price - reservation.price) * take,
            new_matched,
            new_status: reservation_status::after_matching(reservation.quantity, new_matched),
        });
        still_needed -= take;
    }

    plan
}

/// Recompute per-reservation P&L against the price the exchange actually
/// confirmed.
fn reprice(plan: &[PlannedMatch], confirmed_price: Decimal) -> Vec<PlannedMatch> {
    plan.iter()
        .map(|p| PlannedMatch {
            realized_pnl: (confirmed_price - p.reservation_price) * p.quantity,
            ..p.clone()
        })
        .collect()
}

impl CopyEngine {
    /// Close part of a copied position against one leader sell.
    ///
    /// FIFO drawdown is applied under the (config, market) position lock
    /// before submission; a failed submission reverts it. The aggregate
    /// order goes out fill-and-kill so no resting remainder is left to
    /// contend with future leader activity.
    pub async fn process_sell(
        &self,
        config: &CopyConfig,
        account: &FundedAccount,
        trade: &LeaderTrade,
    ) -> Result<PipelineOutcome, CopyError> {
        // 1. Resolve the exchange token for (market, outcome)
        let token_id = self
            .resolve_token(&trade.market_id, trade.outcome_index)
            .await?;

        // 2. Sell price from the live book; marked-down leader price if the
        // book is unavailable
        let best_bid = match self.exchange.get_order_book(&token_id).await {
            Ok(book) => filter::best_bid(&book),
            Err(e) => {
                tracing::warn!(
                    token_id = %token_id,
                    error = %e,
                    "Order book unavailable for sell; falling back to marked-down leader price"
                );
                None
            }
        };
        let sell_price = pricing::sell_execution_price(best_bid, trade.price);

        // 3. Critical section: read outstanding reservations, plan, draw down
        let plan = {
            let _guard = self
                .position_locks
                .lock((config.id, trade.market_id.clone()))
                .await;

            let outstanding = reservation_repo::outstanding_fifo(
                &self.pool,
                config.id,
                &trade.market_id,
                trade.outcome_index,
            )
            .await?;
            if outstanding.is_empty() {
                tracing::debug!(
                    config_id = %config.id,
                    market = %trade.market_id,
                    "No open position to sell against"
                );
                return Ok(PipelineOutcome::Skipped("no open position"));
            }

            let Some(needed) = sizing::sell_quantity(config, trade.size, &outstanding) else {
                tracing::warn!(config_id = %config.id, "Unusable sizing inputs; skipping config");
                return Ok(PipelineOutcome::Skipped("unusable sizing inputs"));
            };

            let plan = match_plan(&outstanding, needed, sell_price);
            if plan.is_empty() {
                return Ok(PipelineOutcome::Skipped("nothing to match"));
            }

            let draws: Vec<(Uuid, Decimal)> =
                plan.iter().map(|p| (p.reservation_id, p.quantity)).collect();
            reservation_repo::apply_drawdown(&self.pool, &draws).await?;
            plan
        };

        let total_quantity: Decimal = plan.iter().map(|p| p.quantity).sum();

        if self.settings.dry_run {
            tracing::info!(
                config_id = %config.id,
                quantity = %total_quantity,
                "Dry run: reverting sell drawdown without submitting"
            );
            self.revert_plan(&plan).await?;
            return Ok(PipelineOutcome::DryRun);
        }

        // 4. Submit the aggregate sell outside the lock
        let args = OrderArgs {
            token_id: token_id.clone(),
            side: Side::Sell,
            price: sell_price,
            size: total_quantity,
            maker: account.maker_address().to_string(),
            signature_type: account.signature_type(),
        };

        let order_id = match submit::submit_with_retry(
            self.exchange.as_ref(),
            self.signer.as_ref(),
            &args,
            OrderType::Fak,
            &self.settings.submit_policy,
        )
        .await
        {
            Ok(order_id) => order_id,
            Err(e) => {
                counter!("orders_failed_total").increment(1);
                tracing::error!(
                    config_id = %config.id,
                    error = %e,
                    "Sell submission failed; reverting drawdown"
                );
                self.revert_plan(&plan).await?;
                self.emit_failure(config, trade, Side::Sell, e.to_string());
                return Err(CopyError::Submit(e));
            }
        };

        // 5. Ledger write with the confirmed fill price when the exchange
        // reports one
        let confirmed_price = self
            .confirmed_fill_price(&order_id)
            .await
            .unwrap_or(sell_price);
        let final_plan = if confirmed_price == sell_price {
            plan
        } else {
            tracing::info!(
                order_id = %order_id,
                submitted = %sell_price,
                confirmed = %confirmed_price,
                "Confirmed fill price differs from submitted price"
            );
            reprice(&plan, confirmed_price)
        };

        let total_pnl: Decimal = final_plan.iter().map(|p| p.realized_pnl).sum();
        let details: Vec<match_repo::MatchDetailInput> = final_plan
            .iter()
            .map(|p| match_repo::MatchDetailInput {
                reservation_id: p.reservation_id,
                quantity: p.quantity,
                realized_pnl: p.realized_pnl,
            })
            .collect();

        let record = match_repo::record_match(
            &self.pool,
            config.id,
            &trade.market_id,
            &token_id,
            total_quantity,
            confirmed_price,
            total_pnl,
            &order_id,
            &details,
        )
        .await?;

        counter!("orders_submitted_total").increment(1);
        counter!("matches_recorded_total").increment(1);
        tracing::info!(
            match_id = %record.id,
            order_id = %order_id,
            quantity = %total_quantity,
            price = %confirmed_price,
            pnl = %total_pnl,
            "Sell matched against open reservations"
        );
        self.notify_detached(notifier::format_match_result(
            &trade.market_id,
            total_quantity,
            confirmed_price,
            total_pnl,
        ));

        Ok(PipelineOutcome::Submitted { order_id })
    }

    async fn revert_plan(&self, plan: &[PlannedMatch]) -> Result<(), CopyError> {
        let draws: Vec<(Uuid, Decimal)> =
            plan.iter().map(|p| (p.reservation_id, p.quantity)).collect();
        reservation_repo::revert_drawdown(&self.pool, &draws)
            .await
            .map_err(CopyError::from)
    }

    /// Actual fill price for a submitted order: the status endpoint's price
    /// when present, else the size-weighted average over its associated
    /// trades. `None` leaves the caller on the submitted price.
    async fn confirmed_fill_price(&self, order_id: &str) -> Option<Decimal> {
        let status = match self.exchange.get_order_status(order_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(order_id = %order_id, error = %e, "Order status unavailable");
                return None;
            }
        };

        if let Some(price) = status.price {
            return Some(price);
        }

        let trade_ids = status.associate_trades?;
        let mut notional = Decimal::ZERO;
        let mut size = Decimal::ZERO;
        for trade_id in &trade_ids {
            match self.exchange.get_trades(trade_id).await {
                Ok(fills) => {
                    for fill in fills {
                        notional += fill.price * fill.size;
                        size += fill.size;
                    }
                }
                Err(e) => {
                    tracing::debug!(trade_id = %trade_id, error = %e, "Trade fills unavailable");
                }
            }
        }

        if size > Decimal::ZERO {
            Some(notional / size)
        } else {
            None
        }
    }
}
