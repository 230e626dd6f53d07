//! Cart API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CART_API_BASE_URL` - Base URL of the remote cart API (e.g., `https://api.example.com/api/cart`)
//!
//! ## Optional
//! - `CART_API_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `CART_RESYNC_DELAY_MS` - Delay before the reload that follows a failed
//!   optimistic mutation (default: 1500)
//! - `CART_UPDATE_ENDPOINTS` - Update candidates, e.g. `PUT /{cartItemId},POST /update`
//! - `CART_REMOVE_ENDPOINTS` - Remove candidates, e.g. `DELETE /{cartItemId}`
//! - `CART_CLEAR_ENDPOINTS` - Clear candidates, e.g. `DELETE /clear`

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::api::{EndpointCandidates, parse_candidates};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RESYNC_DELAY_MS: u64 = 1500;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Remote cart API configuration.
#[derive(Debug, Clone)]
pub struct CartApiConfig {
    /// Base URL; every route is appended to it.
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Delay before a resynchronizing reload after a failed mutation.
    pub resync_delay: Duration,
    /// Candidate routes for update/remove/clear.
    pub endpoints: EndpointCandidates,
}

impl CartApiConfig {
    /// Configuration with default timeouts and endpoint candidates.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            resync_delay: Duration::from_millis(DEFAULT_RESYNC_DELAY_MS),
            endpoints: EndpointCandidates::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_base = lookup("CART_API_BASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("CART_API_BASE_URL".to_string()))?;
        let base_url = Url::parse(&raw_base).map_err(|e| {
            ConfigError::InvalidEnvVar("CART_API_BASE_URL".to_string(), e.to_string())
        })?;

        let mut config = Self::new(base_url);

        if let Some(secs) = parse_u64(&lookup, "CART_API_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, "CART_RESYNC_DELAY_MS")? {
            config.resync_delay = Duration::from_millis(ms);
        }

        if let Some(update) = parse_endpoints(&lookup, "CART_UPDATE_ENDPOINTS")? {
            config.endpoints.update = update;
        }
        if let Some(remove) = parse_endpoints(&lookup, "CART_REMOVE_ENDPOINTS")? {
            config.endpoints.remove = remove;
        }
        if let Some(clear) = parse_endpoints(&lookup, "CART_CLEAR_ENDPOINTS")? {
            config.endpoints.clear = clear;
        }

        Ok(config)
    }

    /// Absolute URL for a path relative to the base URL.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
        .transpose()
}

fn parse_endpoints<F>(
    lookup: &F,
    key: &str,
) -> Result<Option<Vec<crate::api::EndpointCandidate>>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            parse_candidates(&value)
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
        .transpose()
}
