//! HTTP Handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use infographic_core::application::worker::constants::{DEFAULT_STYLE, DEFAULT_VARIANT_COUNT};
use infographic_core::application::Orchestrator;

use crate::error::ApiError;
use crate::rate_limiter::RateLimiter;
use crate::types::{GenerateRequest, GenerateResponse, HealthResponse, ServiceInfo};

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    orchestrator: Arc<Orchestrator>,
    rate_limiter: Arc<RateLimiter>,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>, rate_limiter: RateLimiter) -> Self {
        Self {
            orchestrator,
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}

/// POST /generate-infographics
pub async fn generate(
    State(state): State<ApiState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    // Rate limiting check before any work is attempted
    if let Err(wait) = state.rate_limiter.try_acquire() {
        warn!(retry_after_ms = wait.as_millis() as u64, "Generate request rate limited");
        return Err(ApiError::RateLimited {
            retry_after_secs: wait.as_secs().max(1),
        });
    }

    let Json(params) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let style = if params.style_preference.trim().is_empty() {
        DEFAULT_STYLE.to_string()
    } else {
        params.style_preference
    };
    let request = state.orchestrator.accept(
        params.prompt,
        style,
        params.variant_count.unwrap_or(DEFAULT_VARIANT_COUNT),
    )?;

    info!(
        variant_count = request.variant_count(),
        prompt_chars = request.prompt().chars().count(),
        style = %request.style(),
        "Generate request accepted"
    );

    let started = Instant::now();
    match state.orchestrator.run_batch(&request).await {
        Ok(batch) => Ok(Json(GenerateResponse::from_batch(&batch))),
        Err(e) => {
            error!(error = %e, "Batch failed before any variant ran");
            Ok(Json(GenerateResponse::batch_fault(
                format!("Batch failed: {}", e),
                started.elapsed().as_secs_f64(),
            )))
        }
    }
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// GET /
pub async fn root(State(state): State<ApiState>) -> Json<ServiceInfo> {
    Json(ServiceInfo::new(state.orchestrator.config().max_variants))
}
