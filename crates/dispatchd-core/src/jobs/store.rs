//! Persistent job storage. `JobStore` is the only interface the
//! `JobService` speaks to; a SQLite-backed implementation is provided
//! for single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteConnectOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::jobs::job::{Job, JobId, JobStatus, NewJob};

/// Storage-agnostic interface over the `jobs` table. Implementations
/// must serialize writes internally and make terminal-state updates
/// conditional on the row not already being terminal, except for the
/// dedicated cancel path which forces CANCELLED unconditionally.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    async fn create(&self, job: &NewJob) -> Result<Job>;
    async fn get(&self, id: JobId) -> Result<Job>;
    async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        started_at: Option<DateTime<Utc>>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn update_result(
        &self,
        id: JobId,
        result: serde_json::Value,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn update_error(
        &self,
        id: JobId,
        status: JobStatus,
        error_type: &str,
        error_message: &str,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn update_retry_metadata(
        &self,
        id: JobId,
        attempt_count: i64,
        last_attempt_at: DateTime<Utc>,
        last_retry_reason: Option<&str>,
    ) -> Result<()>;
    /// Forces the CANCELLED state regardless of current status, unless
    /// the job is already terminal (a cancel never un-terminates).
    async fn cancel(&self, id: JobId, error_message: &str, finished_at: DateTime<Utc>) -> Result<bool>;
    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>>;
}

/// SQLite-backed `JobStore`, one row per job in a single `jobs` table.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub async fn connect(path: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(Error::Database)?
            .create_if_missing(true);
        // An in-memory database is private to the connection that opened
        // it: a pool of more than one connection would hand later queries
        // to a connection that never saw the migration run. Cap the pool
        // to a single connection so every caller shares the same database.
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(Error::Database)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                model_name TEXT NOT NULL,
                model_version TEXT NOT NULL,
                payload TEXT NOT NULL,
                device TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT,
                result TEXT,
                error_type TEXT,
                error_message TEXT,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                last_attempt_at TEXT,
                last_retry_reason TEXT,
                max_runtime_s REAL,
                max_total_runtime_s REAL,
                cancellable INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

const TERMINAL_STATUSES: &[&str] = &["SUCCEEDED", "FAILED", "CANCELLED", "TIMEOUT"];

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Created => "CREATED",
        JobStatus::Pending => "PENDING",
        JobStatus::Running => "RUNNING",
        JobStatus::Succeeded => "SUCCEEDED",
        JobStatus::Failed => "FAILED",
        JobStatus::Cancelled => "CANCELLED",
        JobStatus::Timeout => "TIMEOUT",
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, new_job: &NewJob) -> Result<Job> {
        let job = Job {
            id: JobId::new_v4(),
            model_name: new_job.model_name.clone(),
            model_version: new_job.model_version.clone(),
            payload: new_job.payload.clone(),
            device: new_job.device.clone(),
            status: JobStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error_type: None,
            error_message: None,
            attempt_count: 0,
            max_attempts: new_job.max_attempts,
            last_attempt_at: None,
            last_retry_reason: None,
            max_runtime_s: new_job.max_runtime_s,
            max_total_runtime_s: new_job.max_total_runtime_s,
            cancellable: new_job.cancellable,
        };
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, model_name, model_version, payload, device, status,
                created_at, attempt_count, max_attempts, max_runtime_s,
                max_total_runtime_s, cancellable
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.model_name)
        .bind(&job.model_version)
        .bind(job.payload.to_string())
        .bind(&job.device)
        .bind(status_str(job.status))
        .bind(job.created_at.to_rfc3339())
        .bind(job.attempt_count)
        .bind(job.max_attempts)
        .bind(job.max_runtime_s)
        .bind(job.max_total_runtime_s)
        .bind(job.cancellable)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        row.try_into_job()
    }

    async fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        started_at: Option<DateTime<Utc>>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?,
                started_at = COALESCE(?, started_at),
                finished_at = COALESCE(?, finished_at)
            WHERE id = ? AND status NOT IN (?, ?, ?, ?)
            "#,
        )
        .bind(status_str(status))
        .bind(started_at.map(|t| t.to_rfc3339()))
        .bind(finished_at.map(|t| t.to_rfc3339()))
        .bind(id.to_string())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .bind(TERMINAL_STATUSES[3])
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_result(
        &self,
        id: JobId,
        result: serde_json::Value,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET status = 'SUCCEEDED', result = ?, finished_at = ?
            WHERE id = ? AND status NOT IN (?, ?, ?, ?)
            "#,
        )
        .bind(result.to_string())
        .bind(finished_at.to_rfc3339())
        .bind(id.to_string())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .bind(TERMINAL_STATUSES[3])
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_error(
        &self,
        id: JobId,
        status: JobStatus,
        error_type: &str,
        error_message: &str,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET status = ?, error_type = ?, error_message = ?, finished_at = ?
            WHERE id = ? AND status NOT IN (?, ?, ?, ?)
            "#,
        )
        .bind(status_str(status))
        .bind(error_type)
        .bind(error_message)
        .bind(finished_at.to_rfc3339())
        .bind(id.to_string())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .bind(TERMINAL_STATUSES[3])
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_retry_metadata(
        &self,
        id: JobId,
        attempt_count: i64,
        last_attempt_at: DateTime<Utc>,
        last_retry_reason: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET
                attempt_count = ?,
                last_attempt_at = ?,
                last_retry_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(attempt_count)
        .bind(last_attempt_at.to_rfc3339())
        .bind(last_retry_reason)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn cancel(&self, id: JobId, error_message: &str, finished_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'CANCELLED', error_type = 'JobCancelled', error_message = ?, finished_at = ?
            WHERE id = ? AND status NOT IN (?, ?, ?, ?)
            "#,
        )
        .bind(error_message)
        .bind(finished_at.to_rfc3339())
        .bind(id.to_string())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .bind(TERMINAL_STATUSES[3])
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.into_iter().map(|r| r.try_into_job()).collect()
    }
}

/// Raw row shape: sqlite has no native timestamp/json types, so the
/// store round-trips them as RFC3339 strings / JSON text and this type
/// bridges that back into `Job`.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    model_name: String,
    model_version: String,
    payload: String,
    device: String,
    status: String,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    result: Option<String>,
    error_type: Option<String>,
    error_message: Option<String>,
    attempt_count: i64,
    max_attempts: i64,
    last_attempt_at: Option<String>,
    last_retry_reason: Option<String>,
    max_runtime_s: Option<f64>,
    max_total_runtime_s: Option<f64>,
    cancellable: bool,
}

impl JobRow {
    fn try_into_job(self) -> Result<Job> {
        let parse_dt = |s: &str| -> Result<DateTime<Utc>> {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::Config(format!("bad timestamp in store: {e}")))
        };
        let status = match self.status.as_str() {
            "CREATED" => JobStatus::Created,
            "PENDING" => JobStatus::Pending,
            "RUNNING" => JobStatus::Running,
            "SUCCEEDED" => JobStatus::Succeeded,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            "TIMEOUT" => JobStatus::Timeout,
            other => return Err(Error::Config(format!("unknown job status in store: {other}"))),
        };
        Ok(Job {
            id: JobId::parse_str(&self.id).map_err(|e| Error::Config(e.to_string()))?,
            model_name: self.model_name,
            model_version: self.model_version,
            payload: serde_json::from_str(&self.payload)?,
            device: self.device,
            status,
            created_at: parse_dt(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_dt).transpose()?,
            finished_at: self.finished_at.as_deref().map(parse_dt).transpose()?,
            result: self.result.as_deref().map(serde_json::from_str).transpose()?,
            error_type: self.error_type,
            error_message: self.error_message,
            attempt_count: self.attempt_count,
            max_attempts: self.max_attempts,
            last_attempt_at: self.last_attempt_at.as_deref().map(parse_dt).transpose()?,
            last_retry_reason: self.last_retry_reason,
            max_runtime_s: self.max_runtime_s,
            max_total_runtime_s: self.max_total_runtime_s,
            cancellable: self.cancellable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteJobStore {
        SqliteJobStore::connect(":memory:").await.unwrap()
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
    async fn create_then_get_round_trips() {
        let store = test_store().await;
        let job = store.create(&new_job()).await.unwrap();
        let fetched = store.get(job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Created);
        assert_eq!(fetched.payload, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn terminal_write_is_not_overwritten() {
        let store = test_store().await;
        let job = store.create(&new_job()).await.unwrap();
        store
            .update_result(job.id, serde_json::json!({"ok": true}), Utc::now())
            .await
            .unwrap();
        // A later attempt to mark it failed must not un-terminate it.
        store
            .update_error(job.id, JobStatus::Failed, "Whatever", "late", Utc::now())
            .await
            .unwrap();
        let fetched = store.get(job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Succeeded);
        assert_eq!(fetched.result, Some(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn cancel_is_unconditional_unless_already_terminal() {
        let store = test_store().await;
        let job = store.create(&new_job()).await.unwrap();
        let cancelled = store.cancel(job.id, "Cancelled", Utc::now()).await.unwrap();
        assert!(cancelled);
        let fetched = store.get(job.id).await.unwrap();
        assert_eq!(fetched.status, JobStatus::Cancelled);

        // Cancelling an already-terminal job is a no-op (returns false).
        let second = store.cancel(job.id, "Cancelled again", Utc::now()).await.unwrap();
        assert!(!second);
    }

    #[tokio::test]
    async fn get_missing_job_is_not_found() {
        let store = test_store().await;
        let err = store.get(JobId::new_v4()).await.unwrap_err();
        assert_eq!(err.error_type(), "JobNotFoundError");
    }
}
