use std::time::Duration;

use reqwest::Client;
use sift_core::error::AppError;
use sift_core::models::{Page, Site};
use sift_core::traits::PageLoader;
use url::Url;

/// Loads pages through the sandbox proxy, which fetches the target with the
/// site's credentials and returns the HTML.
#[derive(Clone)]
pub struct ProxyLoader {
    client: Client,
    endpoint: Url,
    timeout_secs: u64,
}

impl ProxyLoader {
    pub fn new(endpoint: &str) -> Result<Self, AppError> {
        Self::with_timeout(endpoint, Duration::from_secs(30))
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, AppError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AppError::ConfigError(format!("Invalid proxy URL '{endpoint}': {e}")))?;
        match endpoint.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::ConfigError(format!(
                    "Proxy URL scheme '{scheme}' is not allowed (only http/https)"
                )));
            }
        }

        let client = Client::builder()
            .user_agent("Sift/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// The proxy request for `page`: the target URL plus whichever of the
    /// site's connection settings are present.
    pub fn request_url(&self, site: &Site, page: &Page) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("url", &page.url);
            let settings = [
                ("proxy_url", &site.proxy_url),
                ("proxy_username", &site.proxy_username),
                ("proxy_password", &site.proxy_password),
                ("auth_username", &site.auth_username),
                ("auth_password", &site.auth_password),
                ("cookies", &site.cookies),
            ];
            for (name, value) in settings {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    query.append_pair(name, value);
                }
            }
        }
        url
    }
}

impl PageLoader for ProxyLoader {
    async fn load(&self, site: &Site, page: &Page) -> Result<String, AppError> {
        if page.site_id != site.id {
            return Err(AppError::Generic(format!(
                "page {} belongs to site {}, not {}",
                page.id, page.site_id, site.id
            )));
        }

        let response = self
            .client
            .get(self.request_url(site, page))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} from proxy for {}",
                status.as_u16(),
                page.url
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;
        tracing::info!(page_id = %page.id, url = %page.url, bytes = html.len(), "Page loaded");
        Ok(html)
    }
}
