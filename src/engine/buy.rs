use metrics::counter;
use std::time::Duration;
use tokio::time::sleep;

use crate::db::{match_repo, reservation_repo};
use crate::errors::{CopyError, RejectReason};
use crate::exchange::{OrderArgs, OrderType};
use crate::models::{CopyConfig, FundedAccount, LeaderTrade, Side, SizingMode};
use crate::services::notifier;

use super::{filter, pricing, sizing, submit, CopyEngine, FilterInput, PipelineOutcome};

impl CopyEngine {
    /// Copy one leader buy for one configuration.
    ///
    /// Filtering, risk checks and the headroom reservation happen under the
    /// (config, market) position lock; the exchange submission happens after
    /// it is released. The `pending` reservation written inside the lock is
    /// itself the consumed headroom, which is why releasing the lock before
    /// the network call is safe.
    pub async fn process_buy(
        &self,
        config: &CopyConfig,
        account: &FundedAccount,
        trade: &LeaderTrade,
    ) -> Result<PipelineOutcome, CopyError> {
        // 1. Resolve the exchange token for (market, outcome)
        let token_id = self
            .resolve_token(&trade.market_id, trade.outcome_index)
            .await?;

        // 2. Candidate size and tolerance-adjusted limit price
        let Some(mut quantity) = sizing::buy_quantity(config, trade.size, trade.price) else {
            tracing::warn!(config_id = %config.id, "Unusable sizing inputs; skipping config");
            return Ok(PipelineOutcome::Skipped("unusable sizing inputs"));
        };
        let tolerance = pricing::tolerance_or_default(config.price_tolerance_pct);
        let limit_price = pricing::buy_limit_price(trade.price, tolerance);

        // 3. Critical section: filter, risk checks, headroom reservation
        let reservation = {
            let _guard = self
                .position_locks
                .lock((config.id, trade.market_id.clone()))
                .await;

            let input = FilterInput {
                config,
                market_id: &trade.market_id,
                token_id: &token_id,
                side: Side::Buy,
                leader_price: trade.price,
                candidate_notional: quantity * limit_price,
            };
            let verdict = filter::evaluate(self.exchange.as_ref(), &self.pool, &input, None).await?;

            if let Some(reason) = verdict.reject {
                self.emit_reject(config, trade, Side::Buy, reason, None);
                return Ok(PipelineOutcome::Filtered(reason));
            }

            if let Some(headroom) = verdict.value_headroom {
                quantity = headroom / limit_price;
                tracing::info!(
                    config_id = %config.id,
                    headroom = %headroom,
                    quantity = %quantity,
                    "Shrunk order to remaining position headroom"
                );
            }

            // Notional re-validation applies to ratio sizing only; fixed
            // sizing already pins the notional.
            if config.mode() == SizingMode::Ratio {
                if let Some(max) = config.max_order_notional {
                    if quantity * limit_price > max {
                        quantity = max / limit_price;
                    }
                }
                if let Some(min) = config.min_order_notional {
                    if quantity * limit_price < min {
                        self.emit_reject(
                            config,
                            trade,
                            Side::Buy,
                            RejectReason::BelowMinOrderNotional,
                            Some(format!("notional {} below min {min}", quantity * limit_price)),
                        );
                        return Ok(PipelineOutcome::Filtered(RejectReason::BelowMinOrderNotional));
                    }
                }
            }

            // Confirm the top of book can fill at our limit
            let book = verdict.book.unwrap_or_default();
            match filter::best_ask(&book) {
                None => {
                    self.emit_reject(config, trade, Side::Buy, RejectReason::NoSellersAvailable, None);
                    return Ok(PipelineOutcome::Filtered(RejectReason::NoSellersAvailable));
                }
                Some(ask) if ask > limit_price => {
                    self.emit_reject(
                        config,
                        trade,
                        Side::Buy,
                        RejectReason::AskAboveLimit,
                        Some(format!("best ask {ask} above limit {limit_price}")),
                    );
                    return Ok(PipelineOutcome::Filtered(RejectReason::AskAboveLimit));
                }
                Some(_) => {}
            }

            // Daily risk caps
            if let Some(cap) = config.max_daily_orders {
                let opened = reservation_repo::opened_today(&self.pool, config.id).await?;
                let matched = match_repo::matches_today(&self.pool, config.id).await?;
                if opened + matched >= cap {
                    self.emit_reject(
                        config,
                        trade,
                        Side::Buy,
                        RejectReason::DailyOrderCapReached,
                        Some(format!("{} orders today, cap {cap}", opened + matched)),
                    );
                    return Ok(PipelineOutcome::Filtered(RejectReason::DailyOrderCapReached));
                }
            }
            if let Some(cap) = config.max_daily_loss {
                let pnl = match_repo::realized_pnl_today(&self.pool, config.id).await?;
                if pnl < -cap {
                    self.emit_reject(
                        config,
                        trade,
                        Side::Buy,
                        RejectReason::DailyLossCapReached,
                        Some(format!("realized pnl {pnl}, cap -{cap}")),
                    );
                    return Ok(PipelineOutcome::Filtered(RejectReason::DailyLossCapReached));
                }
            }

            // The reservation is the headroom claim; once the row exists the
            // lock can be released.
            reservation_repo::insert_pending(
                &self.pool,
                config.id,
                &trade.market_id,
                &token_id,
                trade.outcome_index,
                quantity,
                limit_price,
                trade.size,
            )
            .await?
        };

        counter!("reservations_opened_total").increment(1);
        tracing::info!(
            reservation_id = %reservation.id,
            config_id = %config.id,
            market = %trade.market_id,
            quantity = %quantity,
            price = %limit_price,
            "Reservation opened"
        );

        // 4. Outside the lock: configured delay, then submission
        if config.order_delay_secs > 0 {
            sleep(Duration::from_secs(config.order_delay_secs.max(0) as u64)).await;
        }

        if self.settings.dry_run {
            tracing::info!(
                reservation_id = %reservation.id,
                "Dry run: releasing reservation without submitting"
            );
            reservation_repo::delete_pending(&self.pool, reservation.id).await?;
            counter!("reservations_released_total").increment(1);
            return Ok(PipelineOutcome::DryRun);
        }

        let args = OrderArgs {
            token_id,
            side: Side::Buy,
            price: limit_price,
            size: quantity,
            maker: account.maker_address().to_string(),
            signature_type: account.signature_type(),
        };

        match submit::submit_with_retry(
            self.exchange.as_ref(),
            self.signer.as_ref(),
            &args,
            OrderType::Gtc,
            &self.settings.submit_policy,
        )
        .await
        {
            Ok(order_id) => {
                reservation_repo::mark_filled(&self.pool, reservation.id, &order_id).await?;
                counter!("orders_submitted_total").increment(1);
                tracing::info!(
                    reservation_id = %reservation.id,
                    order_id = %order_id,
                    "Buy order submitted"
                );
                self.notify_detached(notifier::format_order_submitted(
                    Side::Buy,
                    quantity,
                    limit_price,
                    &trade.market_id,
                    &order_id,
                ));
                Ok(PipelineOutcome::Submitted { order_id })
            }
            Err(e) => {
                // Release the headroom: a pending row with no live order
                // must not keep blocking future buys.
                reservation_repo::delete_pending(&self.pool, reservation.id).await?;
                counter!("orders_failed_total").increment(1);
                counter!("reservations_released_total").increment(1);
                tracing::error!(
                    reservation_id = %reservation.id,
                    config_id = %config.id,
                    error = %e,
                    "Buy submission failed; reservation released"
                );
                self.emit_failure(config, trade, Side::Buy, e.to_string());
                Err(CopyError::Submit(e))
            }
        }
    }
}
