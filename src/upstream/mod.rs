//! Upstream text-generation collaborator.
//!
//! The gateway only needs "prompt in, text out". [`TextGenerator`] is the seam
//! the pipeline depends on; [`AnthropicClient`] is the production
//! implementation. Failures are reduced to an [`UpstreamErrorCategory`] so the
//! client-facing response never depends on the provider's error vocabulary.
//! The raw provider detail stays in [`UpstreamError::detail`] for operator
//! logs and must go through the log redactor before it is written.

mod anthropic;

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

pub use anthropic::{ANTHROPIC_VERSION, AnthropicClient, UpstreamSettings};

/// Something that turns a validated prompt into generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError>;
}

/// Client-facing classification of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorCategory {
    RateLimit,
    AuthFailure,
    BadRequest,
    Unknown,
}

impl UpstreamErrorCategory {
    /// Classify from the HTTP status first, then from the error text.
    pub fn classify(status: Option<StatusCode>, detail: &str) -> Self {
        if let Some(status) = status {
            match status.as_u16() {
                429 | 529 => return Self::RateLimit,
                401 | 403 => return Self::AuthFailure,
                400 | 404 | 413 | 422 => return Self::BadRequest,
                _ => {}
            }
        }

        let lowered = detail.to_lowercase();
        if lowered.contains("rate limit")
            || lowered.contains("rate_limit")
            || lowered.contains("quota")
        {
            Self::RateLimit
        } else if lowered.contains("authentication")
            || lowered.contains("unauthorized")
            || lowered.contains("invalid x-api-key")
        {
            Self::AuthFailure
        } else {
            Self::Unknown
        }
    }

    /// Metric/log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::AuthFailure => "auth_failure",
            Self::BadRequest => "bad_request",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UpstreamErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream failure: a category for the client, raw detail for operators.
#[derive(Error, Debug, Clone)]
#[error("upstream {category} failure: {detail}")]
pub struct UpstreamError {
    pub category: UpstreamErrorCategory,
    pub status: Option<u16>,
    pub detail: String,
}

impl UpstreamError {
    pub fn new(category: UpstreamErrorCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            status: None,
            detail: detail.into(),
        }
    }

    /// Build from an HTTP status and response text, classifying both.
    pub fn from_response(status: StatusCode, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            category: UpstreamErrorCategory::classify(Some(status), &detail),
            status: Some(status.as_u16()),
            detail,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        let detail = err.to_string();
        let status = err.status();
        Self {
            category: UpstreamErrorCategory::classify(status, &detail),
            status: status.map(|s| s.as_u16()),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_status() {
        let cases = [
            (429, UpstreamErrorCategory::RateLimit),
            (529, UpstreamErrorCategory::RateLimit),
            (401, UpstreamErrorCategory::AuthFailure),
            (403, UpstreamErrorCategory::AuthFailure),
            (400, UpstreamErrorCategory::BadRequest),
            (404, UpstreamErrorCategory::BadRequest),
            (413, UpstreamErrorCategory::BadRequest),
            (422, UpstreamErrorCategory::BadRequest),
            (500, UpstreamErrorCategory::Unknown),
            (503, UpstreamErrorCategory::Unknown),
        ];
        for (code, expected) in cases {
            let status = StatusCode::from_u16(code).ok();
            assert_eq!(
                UpstreamErrorCategory::classify(status, ""),
                expected,
                "status {code}"
            );
        }
    }

    #[test]
    fn test_classify_by_text_when_status_is_inconclusive() {
        assert_eq!(
            UpstreamErrorCategory::classify(None, "Rate limit reached for requests"),
            UpstreamErrorCategory::RateLimit
        );
        assert_eq!(
            UpstreamErrorCategory::classify(None, "monthly quota exhausted"),
            UpstreamErrorCategory::RateLimit
        );
        assert_eq!(
            UpstreamErrorCategory::classify(
                StatusCode::from_u16(500).ok(),
                "invalid x-api-key"
            ),
            UpstreamErrorCategory::AuthFailure
        );
        assert_eq!(
            UpstreamErrorCategory::classify(None, "connection reset by peer"),
            UpstreamErrorCategory::Unknown
        );
    }

    #[test]
    fn test_status_wins_over_text() {
        assert_eq!(
            UpstreamErrorCategory::classify(StatusCode::from_u16(400).ok(), "rate limit"),
            UpstreamErrorCategory::BadRequest
        );
    }

    #[test]
    fn test_from_response_keeps_status_and_detail() {
        let err = UpstreamError::from_response(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(err.category, UpstreamErrorCategory::RateLimit);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.detail, "slow down");
        assert_eq!(err.to_string(), "upstream rate_limit failure: slow down");
    }
}
