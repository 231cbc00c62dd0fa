//! Client error types.

use thiserror::Error;

/// Hint shown next to quota errors.
pub const QUOTA_HELP: &str = "Check your API key at https://makersuite.google.com/app/apikey \
     or the plan limits at https://ai.google.dev/pricing, then try again later.";

/// Error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with an error status.
    #[error("{message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Human-readable message taken from the response.
        message: String,
    },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The stream carried an error frame.
    #[error("{0}")]
    Remote(String),
}

impl ClientError {
    /// Whether the failure is an exhausted upstream quota.
    #[must_use]
    pub fn is_quota(&self) -> bool {
        match self {
            Self::Api { status: 429, .. } => true,
            Self::Api { message, .. } | Self::Remote(message) => mentions_quota(message),
            Self::Http(_) | Self::Parse(_) => false,
        }
    }

    /// Contextual help for the user, if any.
    #[must_use]
    pub fn help(&self) -> Option<&'static str> {
        self.is_quota().then_some(QUOTA_HELP)
    }
}

fn mentions_quota(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("quota") || lower.contains("resource_exhausted") || lower.contains("할당량")
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
