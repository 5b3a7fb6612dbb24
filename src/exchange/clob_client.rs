use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use thiserror::Error;

use super::auth::ExchangeAuth;
use super::signer::SignedOrder;
use super::types::{
    ApiActivity, ApiMarket, ApiOrderBook, ApiTradeFill, OrderResponse, OrderStatusResponse,
    OrderType,
};

const CLOB_API_BASE: &str = "https://clob.polymarket.com";
const DATA_API_BASE: &str = "https://data-api.polymarket.com";

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication error: {0}")]
    Auth(#[from] super::auth::AuthError),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Order submission request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderPayload<'a> {
    order: &'a SignedOrder,
    owner: &'a str,
    order_type: OrderType,
}

/// Exchange surface the engine depends on. Production traffic goes through
/// [`ClobClient`]; tests substitute a scripted double.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn get_order_book(&self, token_id: &str) -> Result<ApiOrderBook, ExchangeError>;

    async fn get_market(&self, condition_id: &str) -> Result<ApiMarket, ExchangeError>;

    async fn submit_order(
        &self,
        order: &SignedOrder,
        order_type: OrderType,
    ) -> Result<OrderResponse, ExchangeError>;

    async fn get_order_status(&self, order_id: &str)
        -> Result<OrderStatusResponse, ExchangeError>;

    async fn get_trades(&self, trade_id: &str) -> Result<Vec<ApiTradeFill>, ExchangeError>;

    async fn get_leader_activity(
        &self,
        wallet: &str,
        limit: u32,
    ) -> Result<Vec<ApiActivity>, ExchangeError>;
}

#[derive(Debug, Clone)]
pub struct ClobClient {
    http: Client,
    auth: ExchangeAuth,
    base_url: String,
    data_url: String,
}

impl ClobClient {
    pub fn new(http: Client, auth: ExchangeAuth) -> Self {
        Self {
            http,
            auth,
            base_url: CLOB_API_BASE.into(),
            data_url: DATA_API_BASE.into(),
        }
    }

    /// Build an authenticated GET request with HMAC signature headers.
    fn authenticated_get(&self, path: &str) -> Result<RequestBuilder, ExchangeError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.auth.sign(&timestamp, "GET", path, "")?;

        let url = format!("{}{}", self.base_url, path);
        let req = self
            .http
            .get(&url)
            .header("POLY-API-KEY", &self.auth.api_key)
            .header("POLY-SIGNATURE", signature)
            .header("POLY-TIMESTAMP", &timestamp)
            .header("POLY-PASSPHRASE", &self.auth.passphrase);

        Ok(req)
    }

    /// Build an authenticated POST. The signature covers the exact body
    /// bytes sent, so the body is serialized once here.
    fn authenticated_post(
        &self,
        path: &str,
        body: String,
    ) -> Result<RequestBuilder, ExchangeError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.auth.sign(&timestamp, "POST", path, &body)?;

        let url = format!("{}{}", self.base_url, path);
        let req = self
            .http
            .post(&url)
            .header("POLY-API-KEY", &self.auth.api_key)
            .header("POLY-SIGNATURE", signature)
            .header("POLY-TIMESTAMP", &timestamp)
            .header("POLY-PASSPHRASE", &self.auth.passphrase)
            .header("Content-Type", "application/json")
            .body(body);

        Ok(req)
    }
}

#[async_trait]
impl ExchangeApi for ClobClient {
    /// Fetch order book for a specific token.
    async fn get_order_book(&self, token_id: &str) -> Result<ApiOrderBook, ExchangeError> {
        let path = format!("/book?token_id={token_id}");
        let resp = self
            .authenticated_get(&path)?
            .send()
            .await?
            .error_for_status()?;

        let book: ApiOrderBook = resp.json().await?;
        Ok(book)
    }

    /// Fetch a single market by condition ID.
    async fn get_market(&self, condition_id: &str) -> Result<ApiMarket, ExchangeError> {
        let path = format!("/markets/{condition_id}");
        let resp = self
            .authenticated_get(&path)?
            .send()
            .await?
            .error_for_status()?;

        let market: ApiMarket = resp.json().await?;
        Ok(market)
    }

    /// Post a signed order. Client-error statuses carry a structured
    /// rejection body; that is returned as a normal response so callers can
    /// read `error_msg` instead of a bare status code.
    async fn submit_order(
        &self,
        order: &SignedOrder,
        order_type: OrderType,
    ) -> Result<OrderResponse, ExchangeError> {
        let payload = OrderPayload {
            order,
            owner: &self.auth.api_key,
            order_type,
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| ExchangeError::Unexpected(format!("payload encode: {e}")))?;

        let resp = self.authenticated_post("/order", body)?.send().await?;
        let status = resp.status();

        if status.is_success() || status.is_client_error() {
            let text = resp.text().await?;
            serde_json::from_str(&text)
                .map_err(|_| ExchangeError::Unexpected(format!("{status} - {text}")))
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(ExchangeError::Unexpected(format!("{status} - {text}")))
        }
    }

    /// Fetch the current status of a submitted order.
    async fn get_order_status(
        &self,
        order_id: &str,
    ) -> Result<OrderStatusResponse, ExchangeError> {
        let path = format!("/order/{order_id}");
        let resp = self
            .authenticated_get(&path)?
            .send()
            .await?
            .error_for_status()?;

        let order: OrderStatusResponse = resp.json().await?;
        Ok(order)
    }

    /// Fetch the fills recorded under one exchange trade ID.
    async fn get_trades(&self, trade_id: &str) -> Result<Vec<ApiTradeFill>, ExchangeError> {
        let path = format!("/data/trades?id={trade_id}");
        let resp = self
            .authenticated_get(&path)?
            .send()
            .await?
            .error_for_status()?;

        let fills: Vec<ApiTradeFill> = resp.json().await?;
        Ok(fills)
    }

    /// Fetch recent on-chain activity for a wallet address, newest first.
    async fn get_leader_activity(
        &self,
        wallet: &str,
        limit: u32,
    ) -> Result<Vec<ApiActivity>, ExchangeError> {
        let url = format!("{}/activity", self.data_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("user", wallet),
                ("limit", &limit.to_string()),
                ("type", "TRADE"),
                ("sortBy", "TIMESTAMP"),
                ("sortDirection", "DESC"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let activity: Vec<ApiActivity> = resp.json().await?;
        Ok(activity)
    }
}
