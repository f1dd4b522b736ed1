use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::auth::require_identity;
use crate::error::ApiError;
use crate::identity::Identity;
use crate::metrics::{AI_LATENCY, RATE_LIMITED};
use crate::models::{Categorization, CategorizeRequest, SearchAnswer, SearchRequest};
use crate::rate_limit::{OperationClass, RateLimitResult};
use crate::state::AppState;

// Rate limit check, the rejected attempt still counts
fn check_rate_limit(state: &AppState, caller: &str, class: OperationClass) -> Result<RateLimitResult, ApiError> {
    let result = state.rate_limiter.check(caller, class);
    if !result.success {
        RATE_LIMITED.with_label_values(&[class.as_str()]).inc();
        warn!(caller, %class, reset_in_ms = result.reset_in, "rate limit exceeded");
        return Err(ApiError::RateLimited(result));
    }
    Ok(result)
}

fn require_text(value: &str) -> Result<&str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest("Invalid request data".into()));
    }
    Ok(value)
}

pub async fn categorize_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    payload: Result<Json<CategorizeRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<Categorization>), ApiError> {
    let caller = require_identity(&identity)?;
    let limit = check_rate_limit(&state, caller, OperationClass::AiCategorize)?;
    let Json(payload) = payload?;
    let command = require_text(&payload.command)?;

    let start_time = Instant::now();
    let result = state.assistant.categorize(command).await;
    AI_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let categorization = result?;
    info!(caller, kind = ?categorization.kind, "categorized command");
    Ok((limit.headers(), Json(categorization)))
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<SearchAnswer>), ApiError> {
    let caller = require_identity(&identity)?;
    let limit = check_rate_limit(&state, caller, OperationClass::AiSearch)?;
    let Json(payload) = payload?;
    let query = require_text(&payload.query)?;

    let start_time = Instant::now();
    let result = state.assistant.search(query).await;
    AI_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let answer = result?;
    info!(caller, sources = answer.sources.len(), "answered search");
    Ok((limit.headers(), Json(answer)))
}
