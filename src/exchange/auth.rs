use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE as BASE64_URL_SAFE},
    Engine,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid base64 secret: {0}")]
    InvalidSecret(#[from] base64::DecodeError),

    #[error("HMAC computation failed: {0}")]
    HmacError(String),
}

/// API credentials and request-signing for the exchange's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct ExchangeAuth {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl ExchangeAuth {
    pub fn new(api_key: String, api_secret: String, passphrase: String) -> Self {
        Self {
            api_key,
            api_secret,
            passphrase,
        }
    }

    /// HMAC-SHA256 request signature over `{timestamp}{method}{path}{body}`.
    /// The secret is base64-decoded before use; exchange secrets come in
    /// URL-safe base64, so that alphabet is tried first.
    pub fn sign(
        &self,
        timestamp: &str,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<String, AuthError> {
        let secret_bytes = BASE64_URL_SAFE
            .decode(&self.api_secret)
            .or_else(|_| BASE64.decode(&self.api_secret))?;

        let message = format!("{timestamp}{method}{path}{body}");

        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| AuthError::HmacError(e.to_string()))?;

        mac.update(message.as_bytes());
        let result = mac.finalize();

        Ok(BASE64.encode(result.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_produces_base64_output() {
        let secret = BASE64.encode(b"copy-engine-test-secret");
        let auth = ExchangeAuth::new("key".into(), secret, "pass".into());

        let sig = auth.sign("1750000000", "POST", "/order", "{}").unwrap();

        // 32 HMAC bytes → 44 base64 chars
        assert!(BASE64.decode(&sig).is_ok());
        assert_eq!(sig.len(), 44);
    }

    #[test]
    fn sign_accepts_url_safe_secret() {
        let secret = BASE64_URL_SAFE.encode(b"\xfb\xff\xfe secret bytes");
        let auth = ExchangeAuth::new("key".into(), secret, "pass".into());

        assert!(auth.sign("1750000000", "GET", "/book", "").is_ok());
    }
}
