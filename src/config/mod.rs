use std::env;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,

    // Polymarket API credentials (optional — required for authenticated endpoints)
    pub polymarket_api_key: Option<String>,
    pub polymarket_api_secret: Option<String>,
    pub polymarket_passphrase: Option<String>,

    // Order signing
    pub private_key: Option<String>,
    pub chain_id: u64,

    // Monitoring
    pub poll_interval_secs: u64,
    pub max_concurrent_trades: usize,
    pub http_timeout_secs: u64,
    pub submit_backoff_ms: u64,
    pub metrics_addr: Option<SocketAddr>,

    // Notifications
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    pub dry_run: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,

            polymarket_api_key: env::var("POLYMARKET_API_KEY").ok(),
            polymarket_api_secret: env::var("POLYMARKET_API_SECRET").ok(),
            polymarket_passphrase: env::var("POLYMARKET_PASSPHRASE").ok(),

            private_key: env::var("PRIVATE_KEY").ok(),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "137".into())
                .parse()
                .unwrap_or(137),

            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap_or(10),
            max_concurrent_trades: env::var("MAX_CONCURRENT_TRADES")
                .unwrap_or_else(|_| "8".into())
                .parse()
                .unwrap_or(8),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .unwrap_or(30),
            submit_backoff_ms: env::var("SUBMIT_BACKOFF_MS")
                .unwrap_or_else(|_| "1000".into())
                .parse()
                .unwrap_or(1000),
            metrics_addr: env::var("METRICS_ADDR").ok().and_then(|s| s.parse().ok()),

            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),

            dry_run: env::var("DRY_RUN")
                .unwrap_or_else(|_| "false".into())
                .parse()
                .unwrap_or(false),
        })
    }

    /// Returns true if all Polymarket API credentials are configured.
    pub fn has_polymarket_auth(&self) -> bool {
        self.polymarket_api_key.is_some()
            && self.polymarket_api_secret.is_some()
            && self.polymarket_passphrase.is_some()
    }

    pub fn has_telegram(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }
}
