use std::time::Duration;

use sift_core::AppError;

use crate::loader::ProxyLoader;
use crate::store::RestPatternStore;

/// Connection settings for the rule repository and the sandbox proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub store_url: String,
    pub proxy_url: Option<String>,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SIFT_STORE_URL` (required)
    /// - `SIFT_PROXY_URL` (optional)
    /// - `SIFT_API_TOKEN` (optional)
    /// - `SIFT_HTTP_TIMEOUT_SECS` (optional, defaults to 30)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let store_url = non_empty("SIFT_STORE_URL").ok_or_else(|| {
            AppError::ConfigError("SIFT_STORE_URL not set. Required for rule operations.".into())
        })?;

        let timeout_secs = match non_empty("SIFT_HTTP_TIMEOUT_SECS") {
            None => 30,
            Some(raw) => {
                let parsed: u64 = raw.trim().parse().map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid SIFT_HTTP_TIMEOUT_SECS '{raw}': must be a positive integer"
                    ))
                })?;
                if parsed == 0 {
                    return Err(AppError::ConfigError(
                        "SIFT_HTTP_TIMEOUT_SECS must be at least 1".into(),
                    ));
                }
                parsed
            }
        };

        Ok(Self {
            store_url,
            proxy_url: non_empty("SIFT_PROXY_URL"),
            api_token: non_empty("SIFT_API_TOKEN"),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn store(&self) -> Result<RestPatternStore, AppError> {
        let store = RestPatternStore::with_timeout(&self.store_url, self.timeout)?;
        Ok(match &self.api_token {
            Some(token) => store.with_token(token.clone()),
            None => store,
        })
    }

    pub fn loader(&self) -> Result<ProxyLoader, AppError> {
        let endpoint = self.proxy_url.as_deref().ok_or_else(|| {
            AppError::ConfigError("SIFT_PROXY_URL not set. Required to load pages.".into())
        })?;
        ProxyLoader::with_timeout(endpoint, self.timeout)
    }
}
