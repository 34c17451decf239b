//! Unauthenticated service endpoints.
//!
//! - `GET /` - Service banner with the endpoint list
//! - `GET /health` - Liveness check with uptime

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{EndpointInfo, HealthResponse, ServiceInfo};
use crate::state::AppState;

const ENDPOINTS: &[(&str, &str, &str, bool)] = &[
    ("GET", "/", "Service information", false),
    ("GET", "/health", "Health check", false),
    ("GET", "/api/stats", "Rate limiter statistics", true),
    ("POST", "/api/generate", "Generate text from a prompt", true),
];

#[instrument]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        endpoints: ENDPOINTS
            .iter()
            .map(|&(method, path, description, authenticated)| EndpointInfo {
                method,
                path,
                description,
                authenticated,
            })
            .collect(),
    })
}

/// Always 200 while the process is serving.
///
/// ```json
/// {
///   "status": "healthy",
///   "timestamp": "2024-01-15T10:30:00Z",
///   "uptime": 3600,
///   "version": "0.1.0"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        uptime: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
