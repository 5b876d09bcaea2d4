//! TC3-HMAC-SHA256 request signing.
//!
//! Every outbound call is signed in four dependent stages:
//!
//! 1. a canonical request over the method, URI, fixed header block and the
//!    SHA-256 of the exact body bytes;
//! 2. a string-to-sign binding that digest to a timestamp and a credential
//!    scope of `{date}/{service}/tc3_request`;
//! 3. a signing key derived through three chained HMACs (date, service,
//!    terminator), each stage keyed with the previous stage's raw bytes;
//! 4. the hex HMAC of the string-to-sign under that key.
//!
//! The date is always the UTC calendar day of the timestamp, and the same
//! date is used for the scope and the key derivation.

use crate::config::{ProviderConfig, SigningConfig};
use crate::error::{ConfigError, SignError};
use chrono::DateTime;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "TC3-HMAC-SHA256";
const KEY_PREFIX: &str = "TC3";
const TERMINATOR: &str = "tc3_request";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const SIGNED_HEADERS: &str = "content-type;host;x-tc-action";
const METHOD: &str = "POST";
const CANONICAL_URI: &str = "/";

/// Long-lived API credentials. Emptiness is checked when signing.
#[derive(Clone)]
pub struct Credentials {
    secret_id: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
        }
    }

    fn ensure_present(&self) -> Result<(), ConfigError> {
        if self.secret_id.trim().is_empty() {
            return Err(ConfigError::MissingSecret("secret_id"));
        }
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::MissingSecret("secret_key"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// A single provider action to sign. `payload` is the exact body to send.
#[derive(Debug, Clone, Copy)]
pub struct ActionRequest<'a> {
    pub action: &'a str,
    pub version: &'a str,
    pub payload: &'a str,
    pub region: Option<&'a str>,
    /// Unix seconds; the current time when `None`.
    pub timestamp: Option<i64>,
}

/// A fully signed POST, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: &'static str,
    pub host: String,
    pub uri: &'static str,
    pub body: String,
    pub headers: BTreeMap<&'static str, String>,
}

impl SignedRequest {
    pub fn url(&self) -> String {
        format!("https://{}{}", self.host, self.uri)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn authorization(&self) -> Option<&str> {
        self.header("Authorization")
    }
}

pub struct RequestSigner {
    credentials: Credentials,
    host: String,
    service: String,
}

impl RequestSigner {
    pub fn new(
        credentials: Credentials,
        host: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            host: host.into(),
            service: service.into(),
        }
    }

    pub fn from_config(signing: &SigningConfig, provider: &ProviderConfig) -> Self {
        Self::new(
            Credentials::new(&signing.secret_id, &signing.secret_key),
            &provider.host,
            &provider.service,
        )
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn sign(&self, request: ActionRequest<'_>) -> Result<SignedRequest, SignError> {
        self.credentials.ensure_present()?;

        let timestamp = request
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        let date = DateTime::from_timestamp(timestamp, 0)
            .ok_or(SignError::InvalidTimestamp(timestamp))?
            .format("%Y-%m-%d")
            .to_string();

        let canonical = canonical_request(&self.host, request.action, request.payload);
        let scope = credential_scope(&date, &self.service);
        let to_sign = string_to_sign(timestamp, &scope, &canonical);
        let key = derive_signing_key(&self.credentials.secret_key, &date, &self.service)?;
        let signature = hex::encode(hmac_sha256(&key, to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            self.credentials.secret_id
        );

        let mut headers = BTreeMap::new();
        headers.insert("Authorization", authorization);
        headers.insert("Content-Type", CONTENT_TYPE.to_string());
        headers.insert("Host", self.host.clone());
        headers.insert("X-TC-Action", request.action.to_string());
        headers.insert("X-TC-Timestamp", timestamp.to_string());
        headers.insert("X-TC-Version", request.version.to_string());
        if let Some(region) = request.region {
            headers.insert("X-TC-Region", region.to_string());
        }

        Ok(SignedRequest {
            method: METHOD,
            host: self.host.clone(),
            uri: CANONICAL_URI,
            body: request.payload.to_string(),
            headers,
        })
    }

    /// Serialize `payload` once and sign those exact bytes.
    pub fn sign_json<T: Serialize>(
        &self,
        action: &str,
        version: &str,
        payload: &T,
        region: Option<&str>,
        timestamp: Option<i64>,
    ) -> Result<SignedRequest, SignError> {
        let body = serde_json::to_string(payload)?;
        self.sign(ActionRequest {
            action,
            version,
            payload: &body,
            region,
            timestamp,
        })
    }
}

pub(crate) fn canonical_request(host: &str, action: &str, payload: &str) -> String {
    let canonical_headers = format!(
        "content-type:{CONTENT_TYPE}\nhost:{host}\nx-tc-action:{}\n",
        action.to_lowercase()
    );
    let hashed_payload = sha256::digest(payload);

    // query string is always empty for POST
    [
        METHOD,
        CANONICAL_URI,
        "",
        &canonical_headers,
        SIGNED_HEADERS,
        &hashed_payload,
    ]
    .join("\n")
}

fn credential_scope(date: &str, service: &str) -> String {
    format!("{date}/{service}/{TERMINATOR}")
}

fn string_to_sign(timestamp: i64, scope: &str, canonical: &str) -> String {
    format!(
        "{ALGORITHM}\n{timestamp}\n{scope}\n{}",
        sha256::digest(canonical)
    )
}

fn derive_signing_key(secret_key: &str, date: &str, service: &str) -> Result<[u8; 32], InvalidLength> {
    let secret_date = hmac_sha256(
        format!("{KEY_PREFIX}{secret_key}").as_bytes(),
        date.as_bytes(),
    )?;
    let secret_service = hmac_sha256(&secret_date, service.as_bytes())?;
    hmac_sha256(&secret_service, TERMINATOR.as_bytes())
}

pub(crate) fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; 32], InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(message);

    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}
