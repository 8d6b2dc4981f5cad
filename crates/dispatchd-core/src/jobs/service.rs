//! Business rules layered over the `JobStore`. The `PredictionEngine`
//! talks exclusively to this service, never to the store directly.

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::error::{Error, Result};
use crate::jobs::job::{Job, JobId, JobStatus, NewJob};
use crate::jobs::store::JobStore;

#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Inserts the job as CREATED then immediately transitions it to
    /// PENDING, returning the fully materialized job.
    pub async fn create_job(&self, new_job: NewJob) -> Result<Job> {
        new_job.validate().map_err(|e| Error::Config(e.to_string()))?;
        let job = self.store.create(&new_job).await?;
        self.store
            .update_status(job.id, JobStatus::Pending, None, None)
            .await?;
        self.store.get(job.id).await
    }

    pub async fn get(&self, id: JobId) -> Result<Job> {
        self.store.get(id).await
    }

    /// First call wins; calling this on an already-RUNNING job is
    /// idempotent, not an error.
    pub async fn mark_running(&self, id: JobId) -> Result<()> {
        self.store
            .update_status(id, JobStatus::Running, Some(Utc::now()), None)
            .await
    }

    pub async fn mark_succeeded(&self, id: JobId, result: serde_json::Value) -> Result<()> {
        self.store.update_result(id, result, Utc::now()).await
    }

    pub async fn mark_failed(&self, id: JobId, error_type: &str, message: &str) -> Result<()> {
        self.store
            .update_error(id, JobStatus::Failed, error_type, message, Utc::now())
            .await
    }

    pub async fn mark_timeout(&self, id: JobId, message: &str) -> Result<()> {
        self.store
            .update_error(id, JobStatus::Timeout, "ExecutionTimeoutError", message, Utc::now())
            .await
    }

    /// No-op (returns `Ok(())` without writing) if the job is not
    /// cancellable or already terminal.
    pub async fn cancel_job(&self, id: JobId, reason: Option<&str>) -> Result<()> {
        let job = self.store.get(id).await?;
        if !job.cancellable || job.status.is_terminal() {
            return Ok(());
        }
        let message = match reason {
            Some(r) => format!("Cancelled: {r}"),
            None => "Cancelled".to_string(),
        };
        self.store.cancel(id, &message, Utc::now()).await?;
        Ok(())
    }

    pub async fn record_attempt(&self, id: JobId, reason: Option<&str>) -> Result<Job> {
        let job = self.store.get(id).await?;
        let next_attempt = job.attempt_count + 1;
        self.store
            .update_retry_metadata(id, next_attempt, Utc::now(), reason)
            .await?;
        self.store.get(id).await
    }

    pub fn should_retry(&self, job: &Job) -> bool {
        job.should_retry()
    }

    pub fn has_exceeded_total_budget(&self, job: &Job) -> bool {
        job.has_exceeded_total_budget(Utc::now())
    }

    pub fn is_cancelled(&self, job: &Job) -> bool {
        job.is_cancelled()
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Job>> {
        self.store.list_recent(limit).await
    }
}

impl std::fmt::Debug for JobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobService").finish_non_exhaustive()
    }
}

/// Maps an engine-level `Error` onto the job-terminal-state write it
/// implies, used by the prediction engine's `run_once` closure.
pub fn error_type_for(err: &Error) -> &'static str {
    err.error_type()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::SqliteJobStore;

    async fn service() -> JobService {
        let store = SqliteJobStore::connect(":memory:").await.unwrap();
        JobService::new(Arc::new(store))
    }

    fn new_job() -> NewJob {
        NewJob {
            model_name: "echo".into(),
            model_version: "v1".into(),
            payload: serde_json::json!({"x": 1}),
            device: "cpu".into(),
            max_attempts: 3,
            max_runtime_s: None,
            max_total_runtime_s: None,
            cancellable: true,
        }
    }

    #[tokio::test]
    async fn create_job_lands_in_pending() {
        let svc = service().await;
        let job = svc.create_job(new_job()).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn create_job_rejects_an_empty_model_name() {
        let svc = service().await;
        let mut job = new_job();
        job.model_name = String::new();
        let err = svc.create_job(job).await.unwrap_err();
        assert_eq!(err.error_type(), "ConfigError");
    }

    #[tokio::test]
    async fn mark_running_twice_is_idempotent() {
        let svc = service().await;
        let job = svc.create_job(new_job()).await.unwrap();
        svc.mark_running(job.id).await.unwrap();
        svc.mark_running(job.id).await.unwrap();
        let fetched = svc.get(job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn cancel_noop_on_already_terminal_job() {
        let svc = service().await;
        let job = svc.create_job(new_job()).await.unwrap();
        svc.mark_succeeded(job.id, serde_json::json!({"echo": 1})).await.unwrap();
        svc.cancel_job(job.id, Some("too late")).await.unwrap();
        let fetched = svc.get(job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn cancel_writes_reason_into_error_message() {
        let svc = service().await;
        let job = svc.create_job(new_job()).await.unwrap();
        svc.cancel_job(job.id, Some("user requested")).await.unwrap();
        let fetched = svc.get(job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Cancelled);
        assert_eq!(fetched.error_message.as_deref(), Some("Cancelled: user requested"));
    }

    #[tokio::test]
    async fn record_attempt_increments_counter() {
        let svc = service().await;
        let job = svc.create_job(new_job()).await.unwrap();
        let after = svc.record_attempt(job.id, Some("initial")).await.unwrap();
        assert_eq!(after.attempt_count, 1);
        assert_eq!(after.last_retry_reason.as_deref(), Some("initial"));
    }

    #[tokio::test]
    async fn should_retry_false_after_max_attempts_exhausted() {
        let svc = service().await;
        let mut job = new_job();
        job.max_attempts = 1;
        let job = svc.create_job(job).await.unwrap();
        let after = svc.record_attempt(job.id, Some("initial")).await.unwrap();
        assert!(!svc.should_retry(&after));
    }
}
