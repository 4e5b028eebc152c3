use thiserror::Error;

use crate::models::RuleId;

/// Application-wide error types for Sift.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (rule store or page proxy).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The rule store rejected a create/update/delete/list call.
    #[error("Rule store error (HTTP {status_code}): {message}")]
    StoreError { status_code: u16, message: String },

    /// The extraction executor reported a failure for a rule.
    #[error("Extraction failed (HTTP {status_code}): {message}")]
    ExtractionFailed { status_code: u16, message: String },

    /// The HTML engine could not parse a selector.
    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    /// A full selector does not continue the base selector it is folded into.
    #[error("Selector '{full}' does not start with base selector '{base}'")]
    SelectorMismatch { base: String, full: String },

    /// A rule id is not present in the pattern tree.
    #[error("Rule not found: {0}")]
    NotFound(RuleId),

    /// A mapping does not fit the page it is bound on.
    #[error("Binding error: {0}")]
    Binding(String),

    /// The click handler ran without a hovered candidate element.
    #[error("No candidate element selected")]
    NoCandidate,

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// HTTP status relayed from the store or the extraction executor, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AppError::StoreError { status_code, .. }
            | AppError::ExtractionFailed { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Returns true if the remote side blamed the request (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status_code()
            .is_some_and(|code| (400..500).contains(&code))
    }
}
