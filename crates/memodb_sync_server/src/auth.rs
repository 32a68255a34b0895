//! Authentication support for the sync server.
//!
//! Bearer tokens bind an account to one client id and carry their issue
//! time for expiry checks.
//!
//! ## Token Format
//!
//! Tokens are the URL-safe base64 (no padding) encoding of:
//! - username, a NUL byte, client id
//! - 8 bytes: timestamp (Unix millis, big-endian)
//! - 32 bytes: HMAC-SHA256 signature over everything before it

use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_LEN: usize = 32;
const TIMESTAMP_LEN: usize = 8;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Identity proven by a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Account name.
    pub username: String,
    /// Client the token was issued to.
    pub client_id: String,
    /// Issue time, Unix millis.
    pub issued_at_ms: u64,
}

/// Issues and checks bearer tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a token for `client_id` in the `username` account.
    pub fn create_token(&self, username: &str, client_id: &str) -> ServerResult<String> {
        if username.contains('\0') || client_id.contains('\0') {
            return Err(ServerError::InvalidRequest(
                "username and client id must not contain NUL".into(),
            ));
        }

        let mut data = Vec::with_capacity(username.len() + client_id.len() + 1 + TIMESTAMP_LEN);
        data.extend_from_slice(username.as_bytes());
        data.push(0);
        data.extend_from_slice(client_id.as_bytes());
        data.extend_from_slice(&now_millis().to_be_bytes());

        let signature = self.mac(&data)?.finalize().into_bytes();
        data.extend_from_slice(&signature);
        Ok(URL_SAFE_NO_PAD.encode(data))
    }

    /// Validates a token and returns the identity it carries.
    pub fn validate_token(&self, token: &str) -> ServerResult<TokenClaims> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| ServerError::AuthenticationFailed("malformed token".into()))?;
        if raw.len() < SIGNATURE_LEN + TIMESTAMP_LEN + 1 {
            return Err(ServerError::AuthenticationFailed("invalid token length".into()));
        }

        let (data, signature) = raw.split_at(raw.len() - SIGNATURE_LEN);
        self.mac(data)?
            .verify_slice(signature)
            .map_err(|_| ServerError::AuthenticationFailed("invalid signature".into()))?;

        let (identity, timestamp) = data.split_at(data.len() - TIMESTAMP_LEN);
        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(timestamp);
        let issued_at_ms = u64::from_be_bytes(ts);

        let expiry_ms = u64::try_from(self.config.token_expiry.as_millis()).unwrap_or(u64::MAX);
        if now_millis() > issued_at_ms.saturating_add(expiry_ms) {
            return Err(ServerError::AuthenticationFailed("token expired".into()));
        }

        let identity = std::str::from_utf8(identity)
            .map_err(|_| ServerError::AuthenticationFailed("malformed token".into()))?;
        let (username, client_id) = identity
            .split_once('\0')
            .ok_or_else(|| ServerError::AuthenticationFailed("malformed token".into()))?;

        Ok(TokenClaims {
            username: username.to_string(),
            client_id: client_id.to_string(),
            issued_at_ms,
        })
    }

    fn mac(&self, data: &[u8]) -> ServerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("invalid auth secret: {e}")))?;
        mac.update(data);
        Ok(mac)
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("token_expiry", &self.config.token_expiry)
            .finish_non_exhaustive()
    }
}

fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}
