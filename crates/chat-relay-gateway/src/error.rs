//! API error types and responses.
//!
//! Every non-success response carries a flat `{"error": "..."}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use chat_relay_core::ErrorReply;

use crate::provider::ProviderError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request body.
    #[error("{0}")]
    BadRequest(String),

    /// The upstream API key is not configured.
    #[error("The model API key is not configured. Set GOOGLE_GEMINI_API_KEY on the server.")]
    NotConfigured,

    /// The upstream quota is exhausted.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The upstream rejected the configured API key.
    #[error("Authentication failed: {0}")]
    UpstreamAuth(String),

    /// Any other upstream failure.
    #[error("{0}")]
    Upstream(String),

    /// The model returned no text, even after a retry.
    #[error("The model returned an empty reply.")]
    EmptyReply,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotConfigured | Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamAuth(_) => StatusCode::UNAUTHORIZED,
            Self::EmptyReply => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorReply {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::MissingCredentials => Self::NotConfigured,
            ProviderError::Auth(message) => Self::UpstreamAuth(message),
            ProviderError::RateLimited(message) => Self::QuotaExceeded(message),
            ProviderError::Api { message, .. } => Self::Upstream(message),
            ProviderError::Transport(_) | ProviderError::Decode(_) => {
                tracing::error!(error = %err, "Upstream call failed");
                Self::Upstream(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::BadRequest("test".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotConfigured.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::QuotaExceeded("test".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::UpstreamAuth("test".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Upstream("test".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::EmptyReply.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn provider_errors_map_to_api_errors() {
        assert!(matches!(
            ApiError::from(ProviderError::MissingCredentials),
            ApiError::NotConfigured
        ));
        assert!(matches!(
            ApiError::from(ProviderError::RateLimited("slow down".into())),
            ApiError::QuotaExceeded(m) if m == "slow down"
        ));
        assert!(matches!(
            ApiError::from(ProviderError::Auth("bad key".into())),
            ApiError::UpstreamAuth(_)
        ));
        let upstream = ApiError::from(ProviderError::Api {
            status: 503,
            message: "overloaded".into(),
        });
        assert_eq!(upstream.to_string(), "overloaded");
        assert_eq!(upstream.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn quota_message_mentions_quota() {
        let err = ApiError::QuotaExceeded("limit: 0".into());
        assert!(err.to_string().starts_with("Quota exceeded"));
    }
}
