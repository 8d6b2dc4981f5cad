//! `GET /predict/async/{id}`, `GET /jobs/{id}`, `POST /jobs/{id}/cancel`.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use dispatchd_core::Job;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: String,
    pub status: String,
    pub model: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct JobDetailView {
    pub job_id: String,
    pub status: String,
    pub model: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status.to_string(),
            model: job.model_name.clone(),
            version: job.model_version.clone(),
            created_at: job.created_at,
        }
    }
}

impl From<&Job> for JobDetailView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status.to_string(),
            model: job.model_name.clone(),
            version: job.model_version.clone(),
            created_at: job.created_at,
            result: job.result.clone(),
            error_message: job.error_message.clone(),
        }
    }
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::NotFound(format!("job not found: {id}")))
}

/// `GET /predict/async/{id}` — includes `result`/`error_message`.
pub async fn get_async_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobDetailView>, ApiError> {
    let id = parse_id(&id)?;
    let job = state.engine.get_job(id).await?;
    Ok(Json(JobDetailView::from(&job)))
}

/// `GET /jobs/{id}` — the terse status-only view.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let id = parse_id(&id)?;
    let job = state.engine.get_job(id).await?;
    Ok(Json(JobView::from(&job)))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// `POST /jobs/{id}/cancel`. 400 if the job isn't cancellable, 404 if
/// it doesn't exist. A cancel against an already-terminal job is a
/// no-op that still returns 200 with the job's actual terminal state.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let id = parse_id(&id)?;
    let job = state.engine.get_job(id).await?;
    if !job.cancellable && !job.status.is_terminal() {
        return Err(ApiError::Validation(format!("job {id} is not cancellable")));
    }
    let job = state.engine.cancel_job(id, Some("requested via API")).await?;
    Ok(Json(CancelResponse { job_id: job.id.to_string(), status: job.status.to_string(), error_message: job.error_message }))
}
