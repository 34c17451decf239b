//! `POST /api/generate`.
//!
//! By the time this handler runs the request has passed the global limiter,
//! authentication and the API-tier limiter. The handler validates the prompt,
//! calls the generator, and maps any upstream failure to a fixed category.
//!
//! # Request Body
//!
//! ```json
//! { "prompt": "Write a haiku about the sea" }
//! ```
//!
//! # Response Body
//!
//! ```json
//! {
//!   "result": "...",
//!   "metadata": { "promptLength": 27, "timestamp": "2024-01-15T10:30:00Z" }
//! }
//! ```

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{GenerateResponse, GenerationMetadata};
use crate::state::AppState;
use crate::validation::{ValidationError, ValidationReason};

/// Field holding the prompt in the request body.
pub const PROMPT_FIELD: &str = "prompt";

#[instrument(skip(state, body), fields(body_bytes = body.len()))]
pub async fn generate(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<GenerateResponse>> {
    let payload = parse_object(&body).map_err(reject)?;

    let prompt = state
        .guard
        .validate(
            payload.get(PROMPT_FIELD),
            PROMPT_FIELD,
            &state.config.prompt_options(),
        )
        .map_err(reject)?;
    let prompt_length = prompt.chars().count();

    let result = state.generator.generate(&prompt).await.map_err(|err| {
        error!(
            category = %err.category,
            upstream_status = err.status,
            detail = %state.redactor.redact_str(&err.detail),
            "Upstream generation failed"
        );
        metrics::record_upstream_failure(err.category);
        AppError::from(err)
    })?;

    metrics::record_generation();
    info!(prompt_length, result_length = result.chars().count(), "Generation completed");

    Ok(Json(GenerateResponse {
        result,
        metadata: GenerationMetadata {
            prompt_length,
            timestamp: Utc::now(),
        },
    }))
}

/// The body must be a JSON object; anything else is a malformed request.
fn parse_object(body: &[u8]) -> Result<Value, ValidationError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        _ => Err(ValidationError::new("body", ValidationReason::MalformedBody)),
    }
}

fn reject(err: ValidationError) -> AppError {
    warn!(
        field = %err.field,
        reason = err.reason.label(),
        detail = %err,
        "Validation failed"
    );
    metrics::record_validation_failure(err.reason.label());
    AppError::Validation(err)
}
