//! The persistent `Job` entity and its lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = Uuid;

/// Lifecycle status of a job. Transitions form a DAG:
/// `Created -> Pending -> Running -> {Succeeded | Failed | Cancelled | Timeout}`,
/// with `Pending -> Cancelled` also valid. No transition leaves a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Timeout,
}

impl JobStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }

    pub fn is_terminal_with_error(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Created => "created",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// One row per logical submission. See `JobStore` for the persistence
/// contract and `JobService` for the only code allowed to mutate it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: JobId,
    pub model_name: String,
    pub model_version: String,
    pub payload: serde_json::Value,
    pub device: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub attempt_count: i64,
    pub max_attempts: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_retry_reason: Option<String>,
    pub max_runtime_s: Option<f64>,
    pub max_total_runtime_s: Option<f64>,
    pub cancellable: bool,
}

/// Parameters accepted by `JobService::create_job`.
#[derive(Debug, Clone, validator::Validate)]
pub struct NewJob {
    #[validate(length(min = 1, message = "model_name must not be empty"))]
    pub model_name: String,
    #[validate(length(min = 1, message = "model_version must not be empty"))]
    pub model_version: String,
    pub payload: serde_json::Value,
    #[validate(length(min = 1, message = "device must not be empty"))]
    pub device: String,
    #[validate(range(min = 1, message = "max_attempts must be >= 1"))]
    pub max_attempts: i64,
    #[validate(range(min = 0.0, message = "max_runtime_s must be >= 0"))]
    pub max_runtime_s: Option<f64>,
    #[validate(range(min = 0.0, message = "max_total_runtime_s must be >= 0"))]
    pub max_total_runtime_s: Option<f64>,
    pub cancellable: bool,
}

impl Job {
    /// Seconds elapsed since `created_at`, evaluated against `now`.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn has_exceeded_total_budget(&self, now: DateTime<Utc>) -> bool {
        match self.max_total_runtime_s {
            Some(budget) => self.age_secs(now) > budget,
            None => false,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.attempt_count < self.max_attempts
            && self.status != JobStatus::Cancelled
            && !self.status.is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == JobStatus::Cancelled
    }
}
