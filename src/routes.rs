//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Security Headers │ ← CSP, nosniff, frame deny, HSTS over TLS
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Catch Panic    │ ← 500 JSON instead of a dropped connection
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← Per-request span
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← X-Request-Id in and out
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Access Log     │ ← One redacted line per request
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Preflight answered here
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Global Rate Limit│ ← 429 + X-RateLimit-*
//! └────────┬─────────┘
//!          ▼
//!   /api ──► Auth (401) ──► /api/generate ──► API Rate Limit (429 + X-API-RateLimit-*)
//! ```
//!
//! # Route Groups
//!
//! - `/`, `/health` - Public
//! - `/api/stats` - Authenticated
//! - `/api/generate` - Authenticated and API-tier limited

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Method, Request, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::handlers;
use crate::middleware::{
    AccessLogLayer, AuthLayer, RateLimitLayer, RequestIdLayer, SecurityHeadersLayer, TierHeaders,
};
use crate::rate_limiter::RateLimitTier;
use crate::redaction::LogRedactor;
use crate::state::AppState;

/// Preflight cache lifetime.
pub const CORS_MAX_AGE: Duration = Duration::from_secs(86_400);

const CORS_ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

const CORS_ALLOWED_HEADERS: [&str; 7] = [
    "origin",
    "x-requested-with",
    "content-type",
    "accept",
    "authorization",
    "x-api-key",
    "x-csrf-token",
];

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    // =========================================================================
    // Routes
    // =========================================================================
    let api = Router::new()
        .route(
            "/generate",
            post(handlers::generate).layer(RateLimitLayer::new(state.api_limiter.clone())),
        )
        .route("/stats", get(handlers::rate_limit_stats))
        .layer(AuthLayer::new(state.auth.clone()));

    let mut router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .nest("/api", api)
        .fallback(not_found);

    info!(
        auth_enabled = state.auth.is_enabled(),
        keys = state.auth.key_count(),
        global_limit = state.global_limiter.is_enabled(),
        api_limit = state.api_limiter.is_enabled(),
        "Gateway pipeline configured"
    );

    // =========================================================================
    // Middleware Stack (order matters - last added runs first)
    // =========================================================================
    info!(
        max_size_mb = config.max_request_body_size / (1024 * 1024),
        "Request body size limit configured"
    );
    router = router
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(RateLimitLayer::new(state.global_limiter.clone()))
        .layer(build_cors_layer(config))
        .layer(AccessLogLayer::new(state.redactor.clone()))
        .layer(RequestIdLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %req.method(),
                path = %req.uri().path(),
                request_id = tracing::field::Empty,
            )
        }))
        .layer(CatchPanicLayer::custom(panic_handler(state.redactor.clone())))
        .layer(SecurityHeadersLayer::new());

    router.with_state(state)
}

/// Build CORS layer from configuration.
///
/// Credentials are allowed, which rules out a literal `*` origin; a wildcard
/// configuration therefore mirrors the request's `Origin` instead.
fn build_cors_layer(config: &Config) -> CorsLayer {
    let allow_origin = if config.cors_allows_any_origin() {
        warn!("CORS allows any origin (ALLOWED_ORIGINS=*); restrict this in production");
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    warn!(origin = %o, "Invalid origin in ALLOWED_ORIGINS, skipping");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    let exposed: Vec<HeaderName> = [RateLimitTier::Global, RateLimitTier::Api]
        .into_iter()
        .flat_map(|tier| {
            let h = TierHeaders::for_tier(tier);
            [h.limit, h.remaining, h.reset]
        })
        .chain([header::RETRY_AFTER, HeaderName::from_static("x-request-id")])
        .collect();

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(CORS_ALLOWED_METHODS.to_vec())
        .allow_headers(CORS_ALLOWED_HEADERS.map(HeaderName::from_static).to_vec())
        .expose_headers(exposed)
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}

/// Turn a handler panic into the generic 500 body.
///
/// The payload is logged once, after redaction; the client sees a fixed
/// message.
fn panic_handler(
    redactor: Arc<LogRedactor>,
) -> impl Fn(Box<dyn Any + Send + 'static>) -> Response + Clone + Send + Sync + 'static {
    move |payload| {
        let detail = panic_detail(&redactor, payload.as_ref());
        error!(panic = %detail, "Request handler panicked");
        AppError::Internal("handler panicked".to_string()).into_response()
    }
}

fn panic_detail(redactor: &LogRedactor, payload: &(dyn Any + Send)) -> String {
    let raw = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic payload"
    };
    redactor.redact_str(raw)
}
