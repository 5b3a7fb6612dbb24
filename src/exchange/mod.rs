pub mod auth;
pub mod clob_client;
pub mod signer;
pub mod types;

pub use auth::ExchangeAuth;
pub use clob_client::{ClobClient, ExchangeApi, ExchangeError};
pub use signer::{Eip712Signer, OrderArgs, OrderSigner, SignatureType, SignedOrder, SignerError};
pub use types::{
    ApiActivity, ApiMarket, ApiOrderBook, ApiOrderBookLevel, ApiToken, ApiTradeFill, OrderResponse,
    OrderStatusResponse, OrderType,
};
