mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use mirrorbot::engine::{CopyEngine, PipelineOutcome};
use mirrorbot::errors::CopyError;
use mirrorbot::exchange::{ExchangeApi, ExchangeError, OrderSigner, OrderStatusResponse};
use mirrorbot::models::{CopyConfig, CopyReservation, FundedAccount, MatchDetail, MatchRecord};

use common::{MockExchange, MockSigner};

const MARKET: &str = "0xmarket_sell_tests";
const TOKEN: &str = "token_sell_tests";

struct Setup {
    pool: PgPool,
    config: CopyConfig,
    account: FundedAccount,
    exchange: Arc<MockExchange>,
    signer: Arc<MockSigner>,
}

async fn setup(sizing_mode: &str, ratio: Decimal, fixed_notional: Decimal) -> Setup {
    let pool = common::setup_test_db().await;
    let leader = common::seed_leader(&pool, "0xLEADER_SELL").await;
    let account = common::seed_account(&pool, "0xACCOUNT_SELL").await;
    let config =
        common::seed_config(&pool, account.id, leader.id, sizing_mode, ratio, fixed_notional)
            .await;
    common::seed_market_token(&pool, MARKET, 1, TOKEN).await;

    Setup {
        pool,
        config,
        account,
        exchange: Arc::new(MockExchange::new()),
        signer: Arc::new(MockSigner::default()),
    }
}

fn build_engine(s: &Setup, dry_run: bool) -> CopyEngine {
    let mut settings = common::test_settings();
    settings.dry_run = dry_run;
    CopyEngine::new(
        s.pool.clone(),
        Arc::clone(&s.exchange) as Arc<dyn ExchangeApi>,
        Arc::clone(&s.signer) as Arc<dyn OrderSigner>,
        None,
        settings,
    )
}

async fn get_reservation(pool: &PgPool, id: Uuid) -> CopyReservation {
    sqlx::query_as::<_, CopyReservation>("SELECT * FROM copy_reservations WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("DB query should succeed")
}

async fn all_matches(pool: &PgPool) -> Vec<MatchRecord> {
    sqlx::query_as::<_, MatchRecord>("SELECT * FROM match_records ORDER BY created_at")
        .fetch_all(pool)
        .await
        .expect("DB query should succeed")
}

async fn all_details(pool: &PgPool) -> Vec<MatchDetail> {
    sqlx::query_as::<_, MatchDetail>("SELECT * FROM match_details")
        .fetch_all(pool)
        .await
        .expect("DB query should succeed")
}

#[tokio::test]
async fn test_partial_sell_draws_down_reservation() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let reservation = common::seed_reservation(
        &s.pool,
        s.config.id,
        MARKET,
        TOKEN,
        Decimal::from(50),
        Decimal::new(42, 2),
        Decimal::from(100),
        "filled",
        120,
    )
    .await;
    s.exchange.set_book(
        vec![common::level(Decimal::new(48, 2), 500)],
        vec![common::level(Decimal::new(50, 2), 500)],
    );
    let engine = build_engine(&s, false);

    // Leader sells 80 at ratio 0.5 → 40 copied shares at the 0.48 best bid
    let trade = common::make_trade("t-sell-1", MARKET, "SELL", 80, Decimal::new(47, 2));
    let outcome = engine
        .process_sell(&s.config, &s.account, &trade)
        .await
        .expect("Sell pipeline should succeed");

    assert!(matches!(outcome, PipelineOutcome::Submitted { .. }));

    let updated = get_reservation(&s.pool, reservation.id).await;
    assert_eq!(updated.matched_quantity, Decimal::from(40));
    assert_eq!(updated.status, "partially_matched");

    let matches = all_matches(&s.pool).await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].quantity, Decimal::from(40));
    assert_eq!(matches[0].sell_price, Decimal::new(48, 2));
    assert_eq!(matches[0].realized_pnl, Decimal::new(24, 1)); // (0.48-0.42)*40
    assert_eq!(matches[0].exchange_order_id.as_deref(), Some(common::ORDER_ID));

    let details = all_details(&s.pool).await;
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].reservation_id, reservation.id);
    assert_eq!(details[0].quantity, Decimal::from(40));

    let orders = s.exchange.submitted_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, "SELL");
}

#[tokio::test]
async fn test_fifo_spans_reservations_oldest_first() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let oldest = common::seed_reservation(
        &s.pool,
        s.config.id,
        MARKET,
        TOKEN,
        Decimal::from(30),
        Decimal::new(40, 2),
        Decimal::from(60),
        "filled",
        200,
    )
    .await;
    let newer = common::seed_reservation(
        &s.pool,
        s.config.id,
        MARKET,
        TOKEN,
        Decimal::from(30),
        Decimal::new(50, 2),
        Decimal::from(60),
        "filled",
        100,
    )
    .await;
    s.exchange.set_book(
        vec![common::level(Decimal::new(45, 2), 500)],
        vec![common::level(Decimal::new(47, 2), 500)],
    );
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-sell-2", MARKET, "SELL", 80, Decimal::new(45, 2));
    let outcome = engine
        .process_sell(&s.config, &s.account, &trade)
        .await
        .expect("Sell pipeline should succeed");

    assert!(matches!(outcome, PipelineOutcome::Submitted { .. }));

    // 40 needed: the oldest is consumed in full before the newer is touched
    let first = get_reservation(&s.pool, oldest.id).await;
    assert_eq!(first.matched_quantity, Decimal::from(30));
    assert_eq!(first.status, "fully_matched");

    let second = get_reservation(&s.pool, newer.id).await;
    assert_eq!(second.matched_quantity, Decimal::from(10));
    assert_eq!(second.status, "partially_matched");

    // (0.45-0.40)*30 + (0.45-0.50)*10 = 1.0
    let matches = all_matches(&s.pool).await;
    assert_eq!(matches[0].realized_pnl, Decimal::from(1));

    let details = all_details(&s.pool).await;
    assert_eq!(details.len(), 2);
    let old_detail = details
        .iter()
        .find(|d| d.reservation_id == oldest.id)
        .expect("Oldest reservation should have a detail row");
    assert_eq!(old_detail.realized_pnl, Decimal::new(15, 1));
    let new_detail = details
        .iter()
        .find(|d| d.reservation_id == newer.id)
        .expect("Newer reservation should have a detail row");
    assert_eq!(new_detail.realized_pnl, Decimal::new(-5, 1));
}

#[tokio::test]
async fn test_no_open_position_skips() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-sell-3", MARKET, "SELL", 80, Decimal::new(45, 2));
    let outcome = engine
        .process_sell(&s.config, &s.account, &trade)
        .await
        .expect("Sell pipeline should succeed");

    assert!(matches!(outcome, PipelineOutcome::Skipped(_)));
    assert!(s.exchange.submitted_orders().is_empty());
}

#[tokio::test]
async fn test_pending_reservations_are_not_sellable() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let pending = common::seed_reservation(
        &s.pool,
        s.config.id,
        MARKET,
        TOKEN,
        Decimal::from(50),
        Decimal::new(42, 2),
        Decimal::from(100),
        "pending",
        60,
    )
    .await;
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-sell-4", MARKET, "SELL", 80, Decimal::new(45, 2));
    let outcome = engine
        .process_sell(&s.config, &s.account, &trade)
        .await
        .expect("Sell pipeline should succeed");

    assert!(matches!(outcome, PipelineOutcome::Skipped(_)));
    assert!(s.exchange.submitted_orders().is_empty());
    let untouched = get_reservation(&s.pool, pending.id).await;
    assert_eq!(untouched.matched_quantity, Decimal::ZERO);
    assert_eq!(untouched.status, "pending");
}

#[tokio::test]
async fn test_sell_failure_reverts_drawdown() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let reservation = common::seed_reservation(
        &s.pool,
        s.config.id,
        MARKET,
        TOKEN,
        Decimal::from(50),
        Decimal::new(42, 2),
        Decimal::from(100),
        "filled",
        120,
    )
    .await;
    s.exchange
        .queue_submit(Err(ExchangeError::Unexpected("down".into())));
    s.exchange
        .queue_submit(Err(ExchangeError::Unexpected("still down".into())));
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-sell-5", MARKET, "SELL", 80, Decimal::new(45, 2));
    let err = engine
        .process_sell(&s.config, &s.account, &trade)
        .await
        .expect_err("Exhausted retries should surface an error");

    assert!(matches!(err, CopyError::Submit(_)));
    let reverted = get_reservation(&s.pool, reservation.id).await;
    assert_eq!(reverted.matched_quantity, Decimal::ZERO);
    assert_eq!(reverted.status, "filled");
    assert!(all_matches(&s.pool).await.is_empty());
}

#[tokio::test]
async fn test_fixed_mode_sells_at_realized_ratio() {
    let s = setup("fixed", Decimal::ZERO, Decimal::from(100)).await;
    let first = common::seed_reservation(
        &s.pool,
        s.config.id,
        MARKET,
        TOKEN,
        Decimal::from(50),
        Decimal::new(40, 2),
        Decimal::from(100),
        "filled",
        200,
    )
    .await;
    common::seed_reservation(
        &s.pool,
        s.config.id,
        MARKET,
        TOKEN,
        Decimal::from(40),
        Decimal::new(45, 2),
        Decimal::from(80),
        "filled",
        100,
    )
    .await;
    s.exchange.set_book(
        vec![common::level(Decimal::new(48, 2), 500)],
        vec![common::level(Decimal::new(50, 2), 500)],
    );
    let engine = build_engine(&s, false);

    // Copied 90 against 180 of leader volume → realized ratio 0.5, so a
    // 45-share leader sell closes 22.5 copied shares
    let trade = common::make_trade("t-sell-6", MARKET, "SELL", 45, Decimal::new(47, 2));
    let outcome = engine
        .process_sell(&s.config, &s.account, &trade)
        .await
        .expect("Sell pipeline should succeed");

    assert!(matches!(outcome, PipelineOutcome::Submitted { .. }));
    let matches = all_matches(&s.pool).await;
    assert_eq!(matches[0].quantity, Decimal::new(225, 1));

    let drawn = get_reservation(&s.pool, first.id).await;
    assert_eq!(drawn.matched_quantity, Decimal::new(225, 1));
    assert_eq!(drawn.status, "partially_matched");
}

#[tokio::test]
async fn test_dry_run_reverts_drawdown() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let reservation = common::seed_reservation(
        &s.pool,
        s.config.id,
        MARKET,
        TOKEN,
        Decimal::from(50),
        Decimal::new(42, 2),
        Decimal::from(100),
        "filled",
        120,
    )
    .await;
    let engine = build_engine(&s, true);

    let trade = common::make_trade("t-sell-7", MARKET, "SELL", 80, Decimal::new(45, 2));
    let outcome = engine
        .process_sell(&s.config, &s.account, &trade)
        .await
        .expect("Sell pipeline should succeed");

    assert!(matches!(outcome, PipelineOutcome::DryRun));
    assert!(s.exchange.submitted_orders().is_empty());
    assert!(all_matches(&s.pool).await.is_empty());
    let reverted = get_reservation(&s.pool, reservation.id).await;
    assert_eq!(reverted.matched_quantity, Decimal::ZERO);
    assert_eq!(reverted.status, "filled");
}

#[tokio::test]
async fn test_confirmed_fill_price_adjusts_recorded_pnl() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    common::seed_reservation(
        &s.pool,
        s.config.id,
        MARKET,
        TOKEN,
        Decimal::from(50),
        Decimal::new(42, 2),
        Decimal::from(100),
        "filled",
        120,
    )
    .await;
    s.exchange.set_book(
        vec![common::level(Decimal::new(48, 2), 500)],
        vec![common::level(Decimal::new(50, 2), 500)],
    );
    s.exchange.set_status(OrderStatusResponse {
        id: common::ORDER_ID.into(),
        status: "matched".into(),
        size_matched: Some(Decimal::from(40)),
        price: Some(Decimal::new(50, 2)),
        associate_trades: None,
    });
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-sell-8", MARKET, "SELL", 80, Decimal::new(47, 2));
    let outcome = engine
        .process_sell(&s.config, &s.account, &trade)
        .await
        .expect("Sell pipeline should succeed");

    assert!(matches!(outcome, PipelineOutcome::Submitted { .. }));
    // Ledger reflects the exchange-confirmed 0.50, not the submitted 0.48
    let matches = all_matches(&s.pool).await;
    assert_eq!(matches[0].sell_price, Decimal::new(50, 2));
    assert_eq!(matches[0].realized_pnl, Decimal::new(32, 1)); // (0.50-0.42)*40
}
