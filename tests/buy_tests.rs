mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::PgPool;

use mirrorbot::engine::{CopyEngine, PipelineOutcome};
use mirrorbot::errors::{CopyError, RejectReason};
use mirrorbot::exchange::{ExchangeApi, ExchangeError, OrderSigner};
use mirrorbot::models::{CopyConfig, CopyReservation, FundedAccount};

use common::{MockExchange, MockSigner};

const MARKET: &str = "0xmarket_buy_tests";
const TOKEN: &str = "token_buy_tests";

struct Setup {
    pool: PgPool,
    config: CopyConfig,
    account: FundedAccount,
    exchange: Arc<MockExchange>,
    signer: Arc<MockSigner>,
}

async fn setup(sizing_mode: &str, ratio: Decimal, fixed_notional: Decimal) -> Setup {
    let pool = common::setup_test_db().await;
    let leader = common::seed_leader(&pool, "0xLEADER_BUY").await;
    let account = common::seed_account(&pool, "0xACCOUNT_BUY").await;
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

async fn all_reservations(pool: &PgPool) -> Vec<CopyReservation> {
    sqlx::query_as::<_, CopyReservation>(
        "SELECT * FROM copy_reservations ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await
    .expect("DB query should succeed")
}

#[tokio::test]
async fn test_ratio_buy_creates_filled_reservation() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let engine = build_engine(&s, false);

    // Leader buys 100 @ 0.40; default tolerance 5% → limit 0.42, ask 0.41 fits
    let trade = common::make_trade("t-buy-1", MARKET, "BUY", 100, Decimal::new(40, 2));
    let outcome = engine
        .process_buy(&s.config, &s.account, &trade)
        .await
        .expect("Buy pipeline should succeed");

    match outcome {
        PipelineOutcome::Submitted { order_id } => assert_eq!(order_id, common::ORDER_ID),
        other => panic!("Expected submission, got {other:?}"),
    }

    let rows = all_reservations(&s.pool).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].quantity, Decimal::from(50));
    assert_eq!(rows[0].price, Decimal::new(42, 2));
    assert_eq!(rows[0].leader_quantity, Decimal::from(100));
    assert_eq!(rows[0].status, "filled");
    assert_eq!(rows[0].exchange_order_id.as_deref(), Some(common::ORDER_ID));

    let orders = s.exchange.submitted_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].token_id, TOKEN);
    assert_eq!(orders[0].side, "BUY");
}

#[tokio::test]
async fn test_fixed_buy_sizes_from_notional() {
    let s = setup("fixed", Decimal::ZERO, Decimal::from(100)).await;
    let engine = build_engine(&s, false);

    // 100 USDC at leader price 0.40 → 250 shares
    let trade = common::make_trade("t-buy-2", MARKET, "BUY", 900, Decimal::new(40, 2));
    let outcome = engine
        .process_buy(&s.config, &s.account, &trade)
        .await
        .expect("Buy pipeline should succeed");

    assert!(matches!(outcome, PipelineOutcome::Submitted { .. }));
    let rows = all_reservations(&s.pool).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].quantity, Decimal::from(250));
    assert_eq!(rows[0].leader_quantity, Decimal::from(900));
}

#[tokio::test]
async fn test_ask_above_limit_is_filtered() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let mut config = s.config.clone();
    config.price_tolerance_pct = Some(Decimal::ZERO);
    s.exchange.set_book(
        vec![common::level(Decimal::new(39, 2), 500)],
        vec![common::level(Decimal::new(45, 2), 500)],
    );
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-buy-3", MARKET, "BUY", 100, Decimal::new(40, 2));
    let outcome = engine
        .process_buy(&config, &s.account, &trade)
        .await
        .expect("Buy pipeline should succeed");

    assert!(matches!(
        outcome,
        PipelineOutcome::Filtered(RejectReason::AskAboveLimit)
    ));
    assert!(all_reservations(&s.pool).await.is_empty());
    assert!(s.exchange.submitted_orders().is_empty());

    // Audit write is detached; give it a beat
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM filtered_orders")
        .fetch_one(&s.pool)
        .await
        .expect("DB query should succeed");
    assert_eq!(count, 1);
    let (reason,): (String,) = sqlx::query_as("SELECT reason FROM filtered_orders LIMIT 1")
        .fetch_one(&s.pool)
        .await
        .expect("DB query should succeed");
    assert_eq!(reason, "ask_above_limit");
}

#[tokio::test]
async fn test_price_outside_range_is_filtered() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let mut config = s.config.clone();
    config.min_price = Some(Decimal::new(30, 2));
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-buy-4", MARKET, "BUY", 100, Decimal::new(20, 2));
    let outcome = engine
        .process_buy(&config, &s.account, &trade)
        .await
        .expect("Buy pipeline should succeed");

    assert!(matches!(
        outcome,
        PipelineOutcome::Filtered(RejectReason::PriceOutsideRange)
    ));
    assert!(s.exchange.submitted_orders().is_empty());
}

#[tokio::test]
async fn test_position_count_cap_rejects() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let mut config = s.config.clone();
    config.max_position_count = Some(1);
    common::seed_reservation(
        &s.pool,
        config.id,
        MARKET,
        TOKEN,
        Decimal::from(10),
        Decimal::new(40, 2),
        Decimal::from(20),
        "filled",
        60,
    )
    .await;
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-buy-5", MARKET, "BUY", 100, Decimal::new(40, 2));
    let outcome = engine
        .process_buy(&config, &s.account, &trade)
        .await
        .expect("Buy pipeline should succeed");

    assert!(matches!(
        outcome,
        PipelineOutcome::Filtered(RejectReason::PositionCountExceeded)
    ));
    assert_eq!(all_reservations(&s.pool).await.len(), 1);
}

#[tokio::test]
async fn test_value_cap_shrinks_quantity_to_headroom() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let mut config = s.config.clone();
    config.price_tolerance_pct = Some(Decimal::ZERO);
    config.max_position_value = Some(Decimal::from(20));
    // Existing open value: 20 shares @ 0.50 = 10 USDC
    common::seed_reservation(
        &s.pool,
        config.id,
        MARKET,
        TOKEN,
        Decimal::from(20),
        Decimal::new(50, 2),
        Decimal::from(40),
        "filled",
        60,
    )
    .await;
    s.exchange.set_book(
        vec![common::level(Decimal::new(48, 2), 500)],
        vec![common::level(Decimal::new(50, 2), 500)],
    );
    let engine = build_engine(&s, false);

    // Candidate 50 @ 0.50 = 25 USDC against 10 remaining headroom → 20 shares
    let trade = common::make_trade("t-buy-6", MARKET, "BUY", 100, Decimal::new(50, 2));
    let outcome = engine
        .process_buy(&config, &s.account, &trade)
        .await
        .expect("Buy pipeline should succeed");

    assert!(matches!(outcome, PipelineOutcome::Submitted { .. }));
    let rows = all_reservations(&s.pool).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].quantity, Decimal::from(20));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_buys_respect_value_cap() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let mut config = s.config.clone();
    config.price_tolerance_pct = Some(Decimal::ZERO);
    config.max_position_value = Some(Decimal::from(100));
    s.exchange.set_book(
        vec![common::level(Decimal::new(48, 2), 10_000)],
        vec![common::level(Decimal::new(50, 2), 10_000)],
    );
    let engine = Arc::new(build_engine(&s, false));

    // Eight concurrent 25-USDC candidates against a 100-USDC cap: the
    // position lock must let exactly four through.
    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        let config = config.clone();
        let account = s.account.clone();
        let trade = common::make_trade(
            &format!("t-conc-{i}"),
            MARKET,
            "BUY",
            100,
            Decimal::new(50, 2),
        );
        handles.push(tokio::spawn(async move {
            engine.process_buy(&config, &account, &trade).await
        }));
    }

    let mut submitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("Task should not panic") {
            Ok(PipelineOutcome::Submitted { .. }) => submitted += 1,
            Ok(PipelineOutcome::Filtered(RejectReason::PositionValueExceeded)) => rejected += 1,
            other => panic!("Unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(submitted, 4);
    assert_eq!(rejected, 4);

    let rows = all_reservations(&s.pool).await;
    let reserved: Decimal = rows.iter().map(|r| r.quantity * r.price).sum();
    assert_eq!(reserved, Decimal::from(100));
}

#[tokio::test]
async fn test_below_min_notional_is_filtered() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let mut config = s.config.clone();
    config.price_tolerance_pct = Some(Decimal::ZERO);
    config.min_order_notional = Some(Decimal::from(50));
    s.exchange.set_book(
        vec![common::level(Decimal::new(48, 2), 500)],
        vec![common::level(Decimal::new(50, 2), 500)],
    );
    let engine = build_engine(&s, false);

    // 10 shares @ 0.50 = 5 USDC, below the 50 USDC floor
    let trade = common::make_trade("t-buy-7", MARKET, "BUY", 20, Decimal::new(50, 2));
    let outcome = engine
        .process_buy(&config, &s.account, &trade)
        .await
        .expect("Buy pipeline should succeed");

    assert!(matches!(
        outcome,
        PipelineOutcome::Filtered(RejectReason::BelowMinOrderNotional)
    ));
    assert!(all_reservations(&s.pool).await.is_empty());
}

#[tokio::test]
async fn test_daily_order_cap_rejects() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let mut config = s.config.clone();
    config.max_daily_orders = Some(1);
    common::seed_reservation(
        &s.pool,
        config.id,
        MARKET,
        TOKEN,
        Decimal::from(10),
        Decimal::new(40, 2),
        Decimal::from(20),
        "filled",
        60,
    )
    .await;
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-buy-8", MARKET, "BUY", 100, Decimal::new(40, 2));
    let outcome = engine
        .process_buy(&config, &s.account, &trade)
        .await
        .expect("Buy pipeline should succeed");

    assert!(matches!(
        outcome,
        PipelineOutcome::Filtered(RejectReason::DailyOrderCapReached)
    ));
}

#[tokio::test]
async fn test_no_sellers_is_filtered() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    s.exchange
        .set_book(vec![common::level(Decimal::new(39, 2), 500)], vec![]);
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-buy-9", MARKET, "BUY", 100, Decimal::new(40, 2));
    let outcome = engine
        .process_buy(&s.config, &s.account, &trade)
        .await
        .expect("Buy pipeline should succeed");

    assert!(matches!(
        outcome,
        PipelineOutcome::Filtered(RejectReason::NoSellersAvailable)
    ));
}

#[tokio::test]
async fn test_submit_failure_releases_reservation() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    s.exchange
        .queue_submit(Err(ExchangeError::Unexpected("down".into())));
    s.exchange
        .queue_submit(Err(ExchangeError::Unexpected("still down".into())));
    let engine = build_engine(&s, false);

    let trade = common::make_trade("t-buy-10", MARKET, "BUY", 100, Decimal::new(40, 2));
    let err = engine
        .process_buy(&s.config, &s.account, &trade)
        .await
        .expect_err("Exhausted retries should surface an error");

    assert!(matches!(err, CopyError::Submit(_)));
    // Both attempts went out, each freshly signed
    assert_eq!(s.exchange.submit_calls.load(Ordering::SeqCst), 2);
    assert_eq!(s.signer.calls.load(Ordering::SeqCst), 2);
    // The pending reservation was released
    assert!(all_reservations(&s.pool).await.is_empty());
}

#[tokio::test]
async fn test_dry_run_validates_without_submitting() {
    let s = setup("ratio", Decimal::new(5, 1), Decimal::ZERO).await;
    let engine = build_engine(&s, true);

    let trade = common::make_trade("t-buy-11", MARKET, "BUY", 100, Decimal::new(40, 2));
    let outcome = engine
        .process_buy(&s.config, &s.account, &trade)
        .await
        .expect("Buy pipeline should succeed");

    assert!(matches!(outcome, PipelineOutcome::DryRun));
    assert!(s.exchange.submitted_orders().is_empty());
    assert!(all_reservations(&s.pool).await.is_empty());
}
