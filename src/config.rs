//! Service configuration.
//!
//! Values come from an optional TOML file and are then overlaid by
//! environment variables, so secrets never need to live on disk.
//! [`AppConfig::validate`] must pass before anything is wired up.

use crate::error::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "ess.tencentcloudapi.com";
pub const DEFAULT_SERVICE: &str = "ess";
pub const DEFAULT_VERSION: &str = "2020-11-11";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub signing: SigningConfig,
    pub callback: CallbackConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

/// Where and how to reach the provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub host: String,
    pub service: String,
    pub version: String,
    pub region: Option<String>,
    /// User id of the operator acting on behalf of Party A.
    pub operator_id: String,
    pub requests_per_second: u32,
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            service: DEFAULT_SERVICE.to_string(),
            version: DEFAULT_VERSION.to_string(),
            region: None,
            operator_id: String::new(),
            requests_per_second: 20,
            timeout_ms: 10_000,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct SigningConfig {
    pub secret_id: String,
    pub secret_key: String,
}

// secrets stay out of logs
impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    pub key: String,
    pub path: String,
    /// Maximum allowed distance between the callback timestamp and now.
    pub freshness_secs: i64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            path: "/callback".to_string(),
            freshness_secs: 300,
        }
    }
}

impl std::fmt::Debug for CallbackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackConfig")
            .field("key", &"<redacted>")
            .field("path", &self.path)
            .field("freshness_secs", &self.freshness_secs)
            .finish()
    }
}

/// Capped exponential backoff for transient provider failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub json_logs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "esign-sync.db".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load the file if given, then apply `ESIGN_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ESIGN_SECRET_ID") {
            self.signing.secret_id = v;
        }
        if let Some(v) = lookup("ESIGN_SECRET_KEY") {
            self.signing.secret_key = v;
        }
        if let Some(v) = lookup("ESIGN_CALLBACK_KEY") {
            self.callback.key = v;
        }
        if let Some(v) = lookup("ESIGN_OPERATOR_ID") {
            self.provider.operator_id = v;
        }
        if let Some(v) = lookup("ESIGN_HOST") {
            self.provider.host = v;
        }
        if let Some(v) = lookup("ESIGN_REGION") {
            self.provider.region = Some(v).filter(|r| !r.is_empty());
        }
        if let Some(v) = lookup("ESIGN_DB_PATH") {
            self.storage.path = v;
        }
        if let Some(v) = lookup("ESIGN_BIND") {
            self.server.bind = v.parse::<SocketAddr>().map_err(|_| ConfigError::InvalidBind(v))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing.secret_id.trim().is_empty() {
            return Err(ConfigError::MissingSecret("secret_id"));
        }
        if self.signing.secret_key.trim().is_empty() {
            return Err(ConfigError::MissingSecret("secret_key"));
        }
        if self.callback.key.trim().is_empty() {
            return Err(ConfigError::MissingCallbackKey);
        }
        if self.provider.operator_id.trim().is_empty() {
            return Err(ConfigError::MissingOperator);
        }
        if self.provider.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "requests_per_second cannot be 0".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry("max_attempts cannot be 0".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidRetry(
                "base_delay_ms exceeds max_delay_ms".into(),
            ));
        }
        Ok(())
    }
}
