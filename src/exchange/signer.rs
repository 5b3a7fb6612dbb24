use alloy_primitives::{keccak256, Address, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

use crate::models::Side;

/// Exchange contract the order digest is bound to.
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";
/// Zero address: any taker may fill.
const PUBLIC_TAKER: &str = "0x0000000000000000000000000000000000000000";
/// Order lifetime baked into the signature.
const ORDER_TTL_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("invalid uint256 value {0}")]
    InvalidUint(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Order signature scheme, selected by the funding wallet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    Eoa = 0,
    Poly = 1,
    PolyGnosisSafe = 2,
}

impl SignatureType {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Parameters of one order to sign. The maker is the funded account's
/// order address (proxy wallet where applicable); the signer address comes
/// from the private key.
#[derive(Debug, Clone)]
pub struct OrderArgs {
    pub token_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub maker: String,
    pub signature_type: SignatureType,
}

/// Signed order payload in the exchange's wire format.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: String,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub side: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    pub signature_type: u8,
    pub signature: String,
}

/// Produces signed, exchange-valid order payloads. Every call must use a
/// fresh salt and nonce — a reused signature on a retry is rejected by the
/// exchange or, worse, accepted as a duplicate order.
#[async_trait]
pub trait OrderSigner: Send + Sync {
    async fn sign(&self, args: &OrderArgs) -> Result<SignedOrder, SignerError>;
}

/// EIP-712 signer over an Ethereum key, covering EOA and proxy-wallet
/// signature kinds.
pub struct Eip712Signer {
    key: PrivateKeySigner,
    chain_id: u64,
}

impl Eip712Signer {
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self, SignerError> {
        let pk = private_key.strip_prefix("0x").unwrap_or(private_key);
        let key = PrivateKeySigner::from_str(pk)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self { key, chain_id })
    }

    /// Throwaway random key. Only meaningful in dry-run wiring where the
    /// produced signatures are never submitted.
    pub fn ephemeral(chain_id: u64) -> Self {
        Self {
            key: PrivateKeySigner::random(),
            chain_id,
        }
    }

    pub fn address(&self) -> Address {
        self.key.address()
    }

    fn order_struct_hash(&self, order: &SignedOrder) -> Result<[u8; 32], SignerError> {
        let type_hash = keccak256(
            b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)"
        );

        let side = match order.side.as_str() {
            "BUY" => 0u8,
            _ => 1u8,
        };

        let mut encoded = Vec::with_capacity(13 * 32);
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(&encode_uint256(&order.salt)?);
        encoded.extend_from_slice(&encode_address(&order.maker)?);
        encoded.extend_from_slice(&encode_address(&order.signer)?);
        encoded.extend_from_slice(&encode_address(&order.taker)?);
        encoded.extend_from_slice(&encode_uint256(&order.token_id)?);
        encoded.extend_from_slice(&encode_uint256(&order.maker_amount)?);
        encoded.extend_from_slice(&encode_uint256(&order.taker_amount)?);
        encoded.extend_from_slice(&encode_uint256(&order.expiration)?);
        encoded.extend_from_slice(&encode_uint256(&order.nonce)?);
        encoded.extend_from_slice(&encode_uint256(&order.fee_rate_bps)?);
        encoded.extend_from_slice(&encode_uint8(side));
        encoded.extend_from_slice(&encode_uint8(order.signature_type));

        Ok(keccak256(&encoded).0)
    }

    fn domain_separator(&self) -> Result<[u8; 32], SignerError> {
        let type_hash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let name_hash = keccak256(b"Polymarket CTF Exchange");
        let version_hash = keccak256(b"1");

        let mut encoded = Vec::with_capacity(5 * 32);
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(name_hash.as_slice());
        encoded.extend_from_slice(version_hash.as_slice());
        encoded.extend_from_slice(&encode_uint256(&self.chain_id.to_string())?);
        encoded.extend_from_slice(&encode_address(CTF_EXCHANGE)?);

        Ok(keccak256(&encoded).0)
    }
}

#[async_trait]
impl OrderSigner for Eip712Signer {
    async fn sign(&self, args: &OrderArgs) -> Result<SignedOrder, SignerError> {
        // Amounts in the exchange's 6-decimal units. Buying: the maker pays
        // collateral and receives shares; selling: the reverse.
        let notional = args.size * args.price;
        let (maker_amount, taker_amount) = match args.side {
            Side::Buy => (to_units(notional), to_units(args.size)),
            Side::Sell => (to_units(args.size), to_units(notional)),
        };

        let expiration = (Utc::now().timestamp() + ORDER_TTL_SECS).to_string();

        let mut order = SignedOrder {
            salt: fresh_entropy(),
            maker: args.maker.clone(),
            signer: format!("{:?}", self.key.address()),
            taker: PUBLIC_TAKER.to_string(),
            token_id: args.token_id.clone(),
            maker_amount,
            taker_amount,
            side: args.side.to_string(),
            expiration,
            nonce: fresh_entropy(),
            fee_rate_bps: "0".to_string(),
            signature_type: args.signature_type.as_u8(),
            signature: String::new(),
        };

        let struct_hash = self.order_struct_hash(&order)?;
        let domain_hash = self.domain_separator()?;

        // keccak256("\x19\x01" || domainSeparator || structHash)
        let mut message = Vec::with_capacity(2 + 64);
        message.extend_from_slice(&[0x19, 0x01]);
        message.extend_from_slice(&domain_hash);
        message.extend_from_slice(&struct_hash);
        let digest = keccak256(&message);

        let signature = self
            .key
            .sign_hash(&digest)
            .await
            .map_err(|e| SignerError::Signing(e.to_string()))?;

        order.signature = format!("0x{}", hex::encode(signature.as_bytes()));
        Ok(order)
    }
}

/// Random 128-bit value for salts and nonces.
fn fresh_entropy() -> String {
    uuid::Uuid::new_v4().as_u128().to_string()
}

/// Scale a decimal amount to the exchange's 6-decimal integer units.
fn to_units(amount: Decimal) -> String {
    (amount * Decimal::from(1_000_000u64)).trunc().to_string()
}

fn encode_address(addr: &str) -> Result<[u8; 32], SignerError> {
    let parsed = Address::from_str(addr.strip_prefix("0x").unwrap_or(addr))
        .map_err(|_| SignerError::InvalidAddress(addr.to_string()))?;
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(parsed.as_slice());
    Ok(buf)
}

fn encode_uint256(value: &str) -> Result<[u8; 32], SignerError> {
    let n = U256::from_str(value).map_err(|_| SignerError::InvalidUint(value.to_string()))?;
    Ok(n.to_be_bytes())
}

fn encode_uint8(value: u8) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[31] = value;
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    // Well-known test key (first account of the standard dev mnemonic).
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn args() -> OrderArgs {
        OrderArgs {
            token_id: "123456789".into(),
            side: Side::Buy,
            price: Decimal::new(42, 2),
            size: Decimal::from(50),
            maker: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into(),
            signature_type: SignatureType::Eoa,
        }
    }

    #[test]
    fn to_units_truncates_to_six_decimals() {
        assert_eq!(to_units(Decimal::new(1005, 1)), "100500000"); // 100.5
        assert_eq!(to_units(Decimal::new(42, 2)), "420000"); // 0.42
        assert_eq!(to_units(Decimal::ZERO), "0");
    }

    #[test]
    fn encode_uint8_pads_left() {
        let encoded = encode_uint8(2);
        assert_eq!(encoded[31], 2);
        assert!(encoded[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn encode_uint256_rejects_garbage() {
        assert!(encode_uint256("123456789").is_ok());
        assert!(encode_uint256("not-a-number").is_err());
    }

    #[tokio::test]
    async fn sign_uses_fresh_salt_and_nonce_every_call() {
        let signer = Eip712Signer::new(TEST_KEY, 137).unwrap();

        let a = signer.sign(&args()).await.unwrap();
        let b = signer.sign(&args()).await.unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.signature, b.signature);
    }

    #[tokio::test]
    async fn buy_and_sell_swap_amounts() {
        let signer = Eip712Signer::new(TEST_KEY, 137).unwrap();

        let buy = signer.sign(&args()).await.unwrap();
        // 50 shares at 0.42: collateral 21.0 → 21_000_000 units, shares → 50_000_000
        assert_eq!(buy.maker_amount, "21000000");
        assert_eq!(buy.taker_amount, "50000000");

        let sell = signer
            .sign(&OrderArgs {
                side: Side::Sell,
                ..args()
            })
            .await
            .unwrap();
        assert_eq!(sell.maker_amount, "50000000");
        assert_eq!(sell.taker_amount, "21000000");
        assert_eq!(sell.side, "SELL");
    }

    #[tokio::test]
    async fn signature_type_carried_through() {
        let signer = Eip712Signer::new(TEST_KEY, 137).unwrap();
        let order = signer
            .sign(&OrderArgs {
                signature_type: SignatureType::Poly,
                ..args()
            })
            .await
            .unwrap();
        assert_eq!(order.signature_type, 1);
    }
}
