use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rate_limiter::{LimiterStats, SlidingWindowLimiter};

/// Successful generation.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Text returned by the upstream model
    pub result: String,
    pub metadata: GenerationMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    /// Length of the validated (trimmed) prompt in characters
    pub prompt_length: usize,
    pub timestamp: DateTime<Utc>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Seconds since startup
    pub uptime: u64,
    pub version: String,
}

/// Service banner returned by `GET /`.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
    pub authenticated: bool,
}

/// Rate limiter occupancy per tier.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub global: TierStats,
    pub api: TierStats,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub active_clients: usize,
    pub total_requests: usize,
    pub window_ms: u64,
    pub max_requests: u32,
    pub enabled: bool,
}

impl TierStats {
    pub fn from_limiter(limiter: &SlidingWindowLimiter) -> Self {
        let LimiterStats {
            active_clients,
            total_requests,
        } = limiter.stats();
        let settings = limiter.settings();
        Self {
            active_clients,
            total_requests,
            window_ms: u64::try_from(settings.window.as_millis()).unwrap_or(u64::MAX),
            max_requests: settings.max_requests,
            enabled: settings.enabled,
        }
    }
}
