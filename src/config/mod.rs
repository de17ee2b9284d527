//! Environment-driven configuration for the gateway clients.
//!
//! ```rust,no_run
//! use textbill::config::BillingConfig;
//!
//! # fn example() -> Result<(), textbill::config::ConfigError> {
//! let config = BillingConfig::from_env()?;
//! let http = config.http_client()?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const ENV_WALLET_URL: &str = "TEXTBILL_WALLET_URL";
const ENV_CATALOG_URL: &str = "TEXTBILL_CATALOG_URL";
const ENV_INFERENCE_URL: &str = "TEXTBILL_INFERENCE_URL";
const ENV_AUTH_TOKEN: &str = "TEXTBILL_AUTH_TOKEN";
const ENV_HTTP_TIMEOUT_SECS: &str = "TEXTBILL_HTTP_TIMEOUT_SECS";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required variable missing.
    #[error("missing environment variable: {key}")]
    Missing { key: &'static str },

    /// Variable present but unusable.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    /// HTTP client construction failed.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Endpoints and credentials for the three HTTP collaborators.
#[derive(Debug)]
pub struct BillingConfig {
    pub wallet_url: Url,
    pub catalog_url: Url,
    pub inference_url: Url,
    pub auth_token: Option<SecretString>,
    pub http_timeout: Duration,
}

impl BillingConfig {
    /// Load from `TEXTBILL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            wallet_url: required_url(ENV_WALLET_URL)?,
            catalog_url: required_url(ENV_CATALOG_URL)?,
            inference_url: required_url(ENV_INFERENCE_URL)?,
            auth_token: std::env::var(ENV_AUTH_TOKEN).ok().map(SecretString::from),
            http_timeout: optional_timeout(ENV_HTTP_TIMEOUT_SECS)?,
        })
    }

    /// Shared HTTP client for all three gateways.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        Ok(reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()?)
    }
}

fn required_url(key: &'static str) -> Result<Url, ConfigError> {
    let raw = std::env::var(key).map_err(|_| ConfigError::Missing { key })?;
    parse_base_url(&raw).map_err(|message| ConfigError::InvalidValue { key, message })
}

/// Base URLs must end in `/` so `Url::join` appends instead of replacing
/// the last path segment.
fn parse_base_url(raw: &str) -> Result<Url, String> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| e.to_string())
}

fn optional_timeout(key: &'static str) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key,
                message: format!("expected seconds as integer, got {raw:?}"),
            })?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(DEFAULT_HTTP_TIMEOUT),
    }
}
