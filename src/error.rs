use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::rate_limiter::RateLimitTier;
use crate::upstream::{UpstreamError, UpstreamErrorCategory};
use crate::validation::ValidationError;

/// Application-wide error type with a fixed client-facing rendering.
///
/// Middleware resolves its own failures into one of these variants and
/// terminates the chain. Upstream failures arrive already classified; only
/// their category influences the response, never the provider's text.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: valid API key required")]
    Unauthorized,

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Rate limit exceeded on {tier} tier, retry after {retry_after_secs}s")]
    RateLimited {
        tier: RateLimitTier,
        retry_after_secs: u64,
    },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            retry_after: None,
        }
    }
}

impl AppError {
    /// HTTP status this error renders to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(err) => match err.category {
                UpstreamErrorCategory::RateLimit => StatusCode::TOO_MANY_REQUESTS,
                UpstreamErrorCategory::AuthFailure => StatusCode::UNAUTHORIZED,
                UpstreamErrorCategory::BadRequest => StatusCode::BAD_REQUEST,
                UpstreamErrorCategory::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing body. Never includes internal or provider detail.
    pub fn body(&self) -> ErrorResponse {
        match self {
            AppError::Unauthorized => ErrorResponse::new("Unauthorized", "Valid API key required"),
            AppError::Validation(err) => {
                ErrorResponse::new("Validation Error", err.client_message())
            }
            AppError::RateLimited {
                tier,
                retry_after_secs,
            } => {
                let (error, message) = match tier {
                    RateLimitTier::Global => (
                        "Too Many Requests",
                        "Global rate limit exceeded. Please try again later.",
                    ),
                    RateLimitTier::Api => (
                        "API Rate Limit Exceeded",
                        "Too many API requests. Please slow down.",
                    ),
                };
                ErrorResponse {
                    retry_after: Some(*retry_after_secs),
                    ..ErrorResponse::new(error, message)
                }
            }
            AppError::Upstream(err) => match err.category {
                UpstreamErrorCategory::RateLimit => ErrorResponse::new(
                    "Rate Limit Exceeded",
                    "The generation service is busy. Please try again later.",
                ),
                UpstreamErrorCategory::AuthFailure => ErrorResponse::new(
                    "Authentication Error",
                    "The gateway could not authenticate with the generation service.",
                ),
                UpstreamErrorCategory::BadRequest => ErrorResponse::new(
                    "Bad Request",
                    "The generation service rejected the request.",
                ),
                UpstreamErrorCategory::Unknown => ErrorResponse::new(
                    "Internal Server Error",
                    "An unexpected error occurred. Please try again later.",
                ),
            },
            AppError::NotFound(_) => {
                ErrorResponse::new("Not Found", "The requested resource does not exist.")
            }
            AppError::Internal(_) | AppError::ConfigError(_) => ErrorResponse::new(
                "Internal Server Error",
                "An unexpected error occurred. Please try again later.",
            ),
        }
    }

    /// Seconds a client should wait before retrying, when known.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Upstream detail is logged by the caller after redaction.
        match &self {
            AppError::Internal(_) | AppError::ConfigError(_) => {
                tracing::error!(error = %self, "Request failed");
            }
            AppError::NotFound(_) => tracing::debug!(error = %self, "Request failed"),
            _ => {}
        }

        let retry_after = self.retry_after();
        let mut response = (status, axum::Json(self.body())).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::validation::ValidationReason;

    #[test]
    fn test_unauthorized_body() {
        let err = AppError::Unauthorized;
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["error"], "Unauthorized");
        assert!(body.get("retryAfter").is_none());
    }

    #[test]
    fn test_validation_body_hides_signature() {
        let err = AppError::Validation(ValidationError::new(
            "prompt",
            ValidationReason::InjectionDetected {
                signature: r"ignore\s+previous".to_string(),
            },
        ));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let body = err.body();
        assert_eq!(body.error, "Validation Error");
        assert!(!body.message.contains("ignore"));
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let err = AppError::RateLimited {
            tier: RateLimitTier::Api,
            retry_after_secs: 42,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_rate_limited_body_per_tier() {
        let global = AppError::RateLimited {
            tier: RateLimitTier::Global,
            retry_after_secs: 1,
        }
        .body();
        assert_eq!(global.error, "Too Many Requests");
        assert_eq!(global.retry_after, Some(1));

        let api = AppError::RateLimited {
            tier: RateLimitTier::Api,
            retry_after_secs: 7,
        }
        .body();
        assert_eq!(api.error, "API Rate Limit Exceeded");
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["retryAfter"], 7);
    }

    #[test]
    fn test_upstream_mapping_does_not_leak_detail() {
        use UpstreamErrorCategory::{AuthFailure, BadRequest, RateLimit, Unknown};

        let cases = [
            (RateLimit, StatusCode::TOO_MANY_REQUESTS, "Rate Limit Exceeded"),
            (AuthFailure, StatusCode::UNAUTHORIZED, "Authentication Error"),
            (BadRequest, StatusCode::BAD_REQUEST, "Bad Request"),
            (Unknown, StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        ];
        for (category, status, label) in cases {
            let err = AppError::Upstream(UpstreamError::new(
                category,
                "org-1234 account anthropic overloaded_error",
            ));
            assert_eq!(err.status(), status);
            let body = err.body();
            assert_eq!(body.error, label);
            assert!(!body.message.contains("org-1234"));
            assert!(!body.message.to_lowercase().contains("anthropic"));
        }
    }

    #[test]
    fn test_internal_does_not_leak_detail() {
        let body = AppError::Internal("db password=hunter2".to_string()).body();
        assert_eq!(body.error, "Internal Server Error");
        assert!(!body.message.contains("hunter2"));
    }
}
