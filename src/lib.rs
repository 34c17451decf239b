//! # Prompt Gateway
//!
//! An HTTP gateway in front of a generative-text API. Every request is
//! screened before any upstream call is made:
//!
//! - **Authentication**: API keys held only as SHA-256 digests, compared in constant time
//! - **Rate Limiting**: Sliding-window limits at a global tier and a stricter API tier
//! - **Prompt Screening**: Length bounds plus injection signatures and dangerous keywords
//! - **Log Redaction**: Credentials and e-mail addresses scrubbed before anything is logged
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Headers → Request ID → Log → CORS → Limit)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  /api: AuthGate → API-tier limiter → InjectionGuard         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TextGenerator (AnthropicClient)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Upstream Messages API                                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use prompt_gateway::{AnthropicClient, AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let generator = Arc::new(AnthropicClient::new(config.upstream_settings())?);
//!
//!     let state = AppState::new(config, generator)?;
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Security Configuration
//!
//! ```bash
//! ANTHROPIC_API_KEY=sk-... API_KEYS=key-one,key-two cargo run
//! ```
//!
//! Tune the limiters:
//! ```bash
//! RATE_LIMIT_MAX_REQUESTS=100 API_RATE_LIMIT_MAX_REQUESTS=10 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod keystore;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod rate_limiter;
pub mod redaction;
pub mod routes;
pub mod state;
pub mod upstream;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::{Config, LogFormat};
pub use error::{AppError, AppResult};
pub use keystore::KeyStore;
pub use rate_limiter::{RateLimitDecision, RateLimitSettings, RateLimitTier, SlidingWindowLimiter};
pub use redaction::LogRedactor;
pub use routes::build_router;
pub use state::AppState;
pub use upstream::{AnthropicClient, TextGenerator, UpstreamError, UpstreamErrorCategory};
pub use validation::{InjectionGuard, ValidationError, ValidationReason};
