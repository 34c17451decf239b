use axum::Json;
use axum::extract::State;
use tracing::instrument;

use crate::models::{StatsResponse, TierStats};
use crate::state::AppState;

/// `GET /api/stats`: occupancy of both rate-limit tiers.
#[instrument(skip(state))]
pub async fn rate_limit_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        global: TierStats::from_limiter(&state.global_limiter),
        api: TierStats::from_limiter(&state.api_limiter),
    })
}
