mod config;
mod db;
mod dispatch;
mod engine;
mod errors;
mod exchange;
mod metrics;
mod models;
mod services;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::engine::{CopyEngine, EngineSettings, SubmitPolicy};
use crate::exchange::{ClobClient, Eip712Signer, ExchangeApi, ExchangeAuth, OrderSigner};
use crate::services::monitor::LeaderMonitor;
use crate::services::notifier::Notifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    metrics::init_metrics(config.metrics_addr);

    tracing::info!("Connecting to database...");
    let db = db::init_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    let mut dry_run = config.dry_run;

    // Shared HTTP client for every exchange call.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let auth = if config.has_polymarket_auth() {
        ExchangeAuth::new(
            config.polymarket_api_key.clone().unwrap(),
            config.polymarket_api_secret.clone().unwrap(),
            config.polymarket_passphrase.clone().unwrap(),
        )
    } else {
        tracing::warn!("No Polymarket API credentials — forcing dry-run mode");
        dry_run = true;
        ExchangeAuth::new(String::new(), String::new(), String::new())
    };
    let exchange: Arc<dyn ExchangeApi> = Arc::new(ClobClient::new(http, auth));

    let signer: Arc<dyn OrderSigner> = match config.private_key.as_deref() {
        Some(key) => {
            let signer = Eip712Signer::new(key, config.chain_id)?;
            tracing::info!(address = %signer.address(), "Order signer ready");
            Arc::new(signer)
        }
        None => {
            tracing::warn!("No PRIVATE_KEY — forcing dry-run mode");
            dry_run = true;
            Arc::new(Eip712Signer::ephemeral(config.chain_id))
        }
    };

    let notifier = if config.has_telegram() {
        Some(Arc::new(Notifier::new(
            config.telegram_bot_token.clone().unwrap(),
            config.telegram_chat_id.clone().unwrap(),
        )))
    } else {
        tracing::info!("Telegram not configured — notifications disabled");
        None
    };

    let settings = EngineSettings {
        submit_policy: SubmitPolicy {
            backoff: Duration::from_millis(config.submit_backoff_ms),
        },
        dry_run,
    };
    let engine = Arc::new(CopyEngine::new(
        db.clone(),
        Arc::clone(&exchange),
        signer,
        notifier,
        settings,
    ));
    let dispatcher = Arc::new(Dispatcher::new(db.clone(), engine));

    // Sweep idle per-key locks so the maps don't grow unbounded.
    {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            loop {
                tick.tick().await;
                dispatcher.purge_locks().await;
            }
        });
    }

    let monitor = LeaderMonitor::new(
        db,
        exchange,
        dispatcher,
        config.poll_interval_secs,
        config.max_concurrent_trades,
    );
    tokio::spawn(async move {
        monitor.run().await;
    });

    tracing::info!(dry_run, "Copy trading engine running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
