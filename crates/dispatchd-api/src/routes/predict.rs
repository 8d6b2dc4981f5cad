//! `POST /predict`, `/predict/batch`, `/predict/async`,
//! `/predict/async/batch` — the four engine operations fronted by
//! request/response schemas and `validator`-based validation.

use std::time::Duration;

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use dispatchd_core::PredictParams;

use crate::error::ApiError;
use crate::middleware::request_id::RequestId;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct PredictRequest {
    #[validate(length(min = 1, message = "model must not be empty"))]
    pub model: String,
    pub version: Option<String>,
    pub data: serde_json::Value,
    #[validate(range(min = 1, message = "max_attempts must be >= 1"))]
    pub max_attempts: Option<i64>,
    #[validate(range(min = 0.0, message = "max_runtime_s must be >= 0"))]
    pub max_runtime_s: Option<f64>,
    #[validate(range(min = 0.0, message = "max_total_runtime_s must be >= 0"))]
    pub max_total_runtime_s: Option<f64>,
    /// Per-call timeout in seconds; folded into the engine's effective
    /// timeout alongside `max_runtime_s`.
    pub timeout_s: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PredictBatchRequest {
    #[validate(length(min = 1, message = "model must not be empty"))]
    pub model: String,
    pub version: Option<String>,
    #[validate(length(min = 1, message = "items must not be empty"))]
    pub items: Vec<serde_json::Value>,
    pub max_attempts: Option<i64>,
    pub max_runtime_s: Option<f64>,
    pub max_total_runtime_s: Option<f64>,
    pub timeout_s: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub result: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PredictBatchResponse {
    pub results: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

fn params(
    model: String,
    version: Option<String>,
    request_id: Option<String>,
    max_attempts: Option<i64>,
    max_runtime_s: Option<f64>,
    max_total_runtime_s: Option<f64>,
    timeout_s: Option<f64>,
) -> PredictParams {
    PredictParams {
        model,
        version,
        request_id,
        timeout: timeout_s.map(Duration::from_secs_f64),
        max_attempts,
        max_runtime_s,
        max_total_runtime_s,
    }
}

pub async fn predict(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    body.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
    let p = params(
        body.model,
        body.version,
        Some(request_id.0),
        body.max_attempts,
        body.max_runtime_s,
        body.max_total_runtime_s,
        body.timeout_s,
    );
    let result = state.engine.predict(p, body.data).await?;
    Ok(Json(PredictResponse { result }))
}

pub async fn predict_batch(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<PredictBatchRequest>,
) -> Result<Json<PredictBatchResponse>, ApiError> {
    body.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
    let p = params(
        body.model,
        body.version,
        Some(request_id.0),
        body.max_attempts,
        body.max_runtime_s,
        body.max_total_runtime_s,
        body.timeout_s,
    );
    let results = state.engine.predict_batch(p, body.items).await?;
    Ok(Json(PredictBatchResponse { results }))
}

pub async fn predict_async(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<PredictRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    body.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
    let p = params(
        body.model,
        body.version,
        Some(request_id.0),
        body.max_attempts,
        body.max_runtime_s,
        body.max_total_runtime_s,
        body.timeout_s,
    );
    let job_id = state.facade.submit(p, body.data).await?;
    Ok(Json(SubmitResponse { job_id: job_id.to_string() }))
}

pub async fn predict_async_batch(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<PredictBatchRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    body.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
    let p = params(
        body.model,
        body.version,
        Some(request_id.0),
        body.max_attempts,
        body.max_runtime_s,
        body.max_total_runtime_s,
        body.timeout_s,
    );
    let job_id = state.facade.submit_batch(p, body.items).await?;
    Ok(Json(SubmitResponse { job_id: job_id.to_string() }))
}
