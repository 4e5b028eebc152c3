use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use sift_core::error::AppError;
use sift_core::models::{ExtractionReport, NewPattern, PageId, Pattern, RuleId};
use sift_core::traits::{ExtractionTrigger, PatternStore};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// REST client for the external rule repository.
///
/// Also triggers extraction, which the repository exposes as
/// `POST /rules/{id}/extract`.
#[derive(Clone)]
pub struct RestPatternStore {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    timeout_secs: u64,
}

impl RestPatternStore {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("Sift/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: None,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, AppError> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })
    }

    /// Send and turn a non-success status into `StoreError`.
    async fn send_ok(&self, builder: RequestBuilder) -> Result<Response, AppError> {
        let response = self.send(builder).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::StoreError {
            status_code,
            message: error_message(status_code, &body),
        })
    }

    async fn list(&self, query: &str) -> Result<Vec<Pattern>, AppError> {
        let response = self
            .send_ok(self.request(Method::GET, &format!("/rules?{query}")))
            .await?;
        response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse rule list: {e}")))
    }
}

// ---- Wire types ----

#[derive(Serialize)]
struct SelectorUpdate<'a> {
    selector: &'a str,
}

/// Error bodies seen from the repository and the extraction executor.
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<serde_json::Value>,
    detail: Option<serde_json::Value>,
    message: Option<serde_json::Value>,
}

/// Best human-readable message for a failed response.
pub(crate) fn error_message(status_code: u16, body: &str) -> String {
    let field = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.detail).or(b.message));

    match field {
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
        None if body.trim().is_empty() => format!("HTTP {status_code}"),
        None => format!("HTTP {status_code}: {}", body.trim()),
    }
}

impl PatternStore for RestPatternStore {
    async fn create(&self, rule: &NewPattern) -> Result<Pattern, AppError> {
        let response = self
            .send_ok(self.request(Method::POST, "/rules").json(rule))
            .await?;
        let created: Pattern = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse created rule: {e}")))?;

        tracing::debug!(rule_id = %created.id, selector = %created.selector, "Rule stored");
        Ok(created)
    }

    async fn update_selector(&self, id: RuleId, selector: &str) -> Result<(), AppError> {
        self.send_ok(
            self.request(Method::PUT, &format!("/rules/{id}"))
                .json(&SelectorUpdate { selector }),
        )
        .await?;
        tracing::debug!(rule_id = %id, %selector, "Rule selector updated");
        Ok(())
    }

    async fn list_for_page(&self, page: PageId) -> Result<Vec<Pattern>, AppError> {
        self.list(&format!("sourcePage={page}")).await
    }

    async fn list_children(&self, parent: RuleId) -> Result<Vec<Pattern>, AppError> {
        self.list(&format!("parentPattern={parent}")).await
    }

    async fn delete(&self, id: RuleId) -> Result<(), AppError> {
        self.send_ok(self.request(Method::DELETE, &format!("/rules/{id}")))
            .await?;
        tracing::debug!(rule_id = %id, "Rule deleted");
        Ok(())
    }
}

impl ExtractionTrigger for RestPatternStore {
    async fn extract(&self, id: RuleId) -> Result<ExtractionReport, AppError> {
        let response = self
            .send(self.request(Method::POST, &format!("/rules/{id}/extract")))
            .await?;

        let status_code = response.status().as_u16();
        let success = response.status().is_success();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;

        if !success {
            tracing::warn!(rule_id = %id, status = status_code, "Extraction rejected");
            return Err(AppError::ExtractionFailed {
                status_code,
                message: error_message(status_code, &body),
            });
        }

        tracing::info!(rule_id = %id, status = status_code, "Extraction triggered");
        Ok(ExtractionReport {
            rule_id: id,
            status_code,
            message: Some(body).filter(|b| !b.trim().is_empty()),
        })
    }
}
