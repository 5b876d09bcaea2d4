//! Inbound callback authentication.
//!
//! The provider signs `"{timestamp}\n{body}"` with a shared key. A callback
//! is authentic only when its timestamp is inside the freshness window and
//! the hex HMAC matches under a constant-time comparison. Every failure path
//! returns an [`AuthError`]; nothing here can report a bad callback as valid.

use crate::config::CallbackConfig;
use crate::error::AuthError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_FRESHNESS_SECS: i64 = 300;

pub struct CallbackAuthenticator {
    key: Vec<u8>,
    freshness_secs: i64,
}

impl CallbackAuthenticator {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            freshness_secs: DEFAULT_FRESHNESS_SECS,
        }
    }

    pub fn from_config(config: &CallbackConfig) -> Self {
        Self {
            key: config.key.as_bytes().to_vec(),
            freshness_secs: config.freshness_secs,
        }
    }

    pub fn verify(&self, body: &[u8], signature: &str, timestamp: i64) -> Result<(), AuthError> {
        self.verify_at(body, signature, timestamp, chrono::Utc::now().timestamp())
    }

    /// Verify against an explicit `now` (unix seconds).
    pub fn verify_at(
        &self,
        body: &[u8],
        signature: &str,
        timestamp: i64,
        now: i64,
    ) -> Result<(), AuthError> {
        if self.key.is_empty() {
            return Err(AuthError::MissingKey);
        }
        if now.abs_diff(timestamp) > self.freshness_secs.unsigned_abs() {
            return Err(AuthError::Stale {
                claimed: timestamp,
                now,
                window: self.freshness_secs,
            });
        }

        let claimed = hex::decode(signature.trim()).map_err(|_| AuthError::MalformedSignature)?;

        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| AuthError::MissingKey)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b"\n");
        mac.update(body);

        // verify_slice compares in constant time
        mac.verify_slice(&claimed).map_err(|_| AuthError::Mismatch)
    }

    /// Produce the signature a sender would attach. Used by tests and tooling.
    pub fn sign(&self, body: &[u8], timestamp: i64) -> Result<String, AuthError> {
        let message = [timestamp.to_string().as_bytes(), b"\n".as_slice(), body].concat();
        let mac = crate::signer::hmac_sha256(&self.key, &message).map_err(|_| AuthError::MissingKey)?;
        Ok(hex::encode(mac))
    }
}
