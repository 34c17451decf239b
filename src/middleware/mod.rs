//! HTTP middleware for the gateway pipeline.
//!
//! - **Security headers**: CSP, nosniff, frame deny, HSTS over TLS
//! - **Request ID**: generation and propagation of `X-Request-Id`
//! - **Access log**: one redacted structured line per request
//! - **Rate limiting**: sliding-window limiter per tier (global, api)
//! - **Authentication**: hashed API keys with full-scan constant-time lookup
//!
//! # Architecture
//!
//! ```text
//! Request → Headers → Trace → Request ID → Access Log → CORS
//!         → Global Limit → [/api] Auth → [/api/generate] API Limit → Handler
//!               ↓               ↓                ↓
//!          429 global       401 Unauth       429 api
//! ```

pub mod access_log;
pub mod auth;
pub mod ip;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use access_log::AccessLogLayer;
pub use auth::{AuthDecision, AuthGate, AuthLayer, DenyReason, extract_credential};
pub use ip::{UNKNOWN_IP, client_identity, client_ip};
pub use rate_limit::{RateLimitLayer, TierHeaders};
pub use request_id::{REQUEST_ID_HEADER, RequestIdLayer};
pub use security_headers::SecurityHeadersLayer;
