use crate::config::Config;
use crate::db_storage::ApplicantRecordStore;
use crate::errors::AppError;
use crate::models::{
    ElaborateRequest, ElaborateResult, EvaluationRecord, FilteringRequest, FilteringResult,
};
use crate::pipeline::FilteringPipeline;
use crate::scheme::SchemeMatcher;
use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Blacklist -> customer category -> credit bureau pipeline.
    pub filtering: FilteringPipeline,
    /// Cluster and scheme lookup for elaboration.
    pub elaboration: SchemeMatcher,
    /// Audit record store.
    pub store: Arc<dyn ApplicantRecordStore>,
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "loan-filtering-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Malformed JSON is a validation failure like any other.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// POST /api/v1/filtering
///
/// Runs the blacklist, customer category and credit bureau stages for one
/// application and returns the final verdict.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `body` - The applicant (and spouse, when married) submission.
///
/// # Returns
///
/// * `Result<Json<FilteringResult>, AppError>` - The verdict, or 400 for invalid
///   input, 503 when an upstream or the record store is unavailable (including
///   a pending bureau), 502 for unexpected upstream payloads.
pub async fn submit_filtering(
    State(state): State<Arc<AppState>>,
    body: Result<Json<FilteringRequest>, JsonRejection>,
) -> Result<Json<FilteringResult>, AppError> {
    let received_at = Utc::now();
    let request = json_body(body)?;

    let result = state.filtering.run(request, received_at).await?;
    Ok(Json(result))
}

/// POST /api/v1/elaboration
///
/// Resolves the cluster for the branch and matches the scheme table.
pub async fn submit_elaboration(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ElaborateRequest>, JsonRejection>,
) -> Result<Json<ElaborateResult>, AppError> {
    let received_at = Utc::now();
    let request = json_body(body)?;

    let result = state.elaboration.elaborate(request, received_at).await?;
    Ok(Json(result))
}

/// GET /api/v1/records/:request_id
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<EvaluationRecord>, AppError> {
    let record = state
        .store
        .find(request_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No record {}", request_id)))?;

    Ok(Json(record))
}

/// Rejects requests without a matching `X-Api-Key` when `API_KEY` is set.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ref expected) = state.config.api_key else {
        return Ok(next.run(request).await);
    };

    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Api-Key header".to_string()))?;

    if !constant_time_compare(provided, expected) {
        tracing::warn!("Invalid API key received");
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(next.run(request).await)
}

/// Constant-time string comparison
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// API routes plus `/health`, with state applied. Rate limiting, tracing and
/// CORS are layered on in `main`.
pub fn api_routes(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/v1/filtering", post(submit_filtering))
        .route("/api/v1/elaboration", post(submit_elaboration))
        .route("/api/v1/records/:request_id", get(get_record))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("secret", "secret"));
        assert!(!constant_time_compare("secret", "secreT"));
        assert!(!constant_time_compare("secret", "secret2"));
    }
}
