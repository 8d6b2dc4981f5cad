//! The orchestrator binding routing, the job service, execution
//! policy, and pipelines behind one synchronous call and one
//! background entry point.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::execution::ExecutionPolicy;
use crate::jobs::job::{Job, JobId, JobStatus, NewJob};
use crate::jobs::metrics::METRICS;
use crate::jobs::service::JobService;
use crate::registry::Registry;
use crate::routing::RoutingResolver;

#[derive(Debug, Clone)]
enum PayloadKind {
    Single(serde_json::Value),
    Batch(Vec<serde_json::Value>),
}

/// Parameters shared by all four engine operations. `version`,
/// `request_id`, and the budget fields are all optional; unset budget
/// fields mean "no bound" in that dimension.
#[derive(Debug, Clone, Default)]
pub struct PredictParams {
    pub model: String,
    pub version: Option<String>,
    pub request_id: Option<String>,
    pub timeout: Option<Duration>,
    pub max_attempts: Option<i64>,
    pub max_runtime_s: Option<f64>,
    pub max_total_runtime_s: Option<f64>,
}

pub struct PredictionEngine {
    routing: Arc<RoutingResolver>,
    policy: Arc<ExecutionPolicy>,
    registry: Arc<Registry>,
    jobs: JobService,
}

impl PredictionEngine {
    pub fn new(routing: Arc<RoutingResolver>, policy: Arc<ExecutionPolicy>, registry: Arc<Registry>, jobs: JobService) -> Self {
        Self { routing, policy, registry, jobs }
    }

    pub fn jobs(&self) -> &JobService {
        &self.jobs
    }

    pub async fn predict(&self, params: PredictParams, payload: serde_json::Value) -> Result<serde_json::Value> {
        let max_attempts = params.max_attempts.unwrap_or(1);
        let job_id = self.create_job(&params, payload, max_attempts).await?;
        self.run_loop(job_id, &params).await
    }

    pub async fn predict_batch(&self, params: PredictParams, payloads: Vec<serde_json::Value>) -> Result<Vec<serde_json::Value>> {
        let max_attempts = params.max_attempts.unwrap_or(1);
        let job_id = self
            .create_job(&params, serde_json::Value::Array(payloads.clone()), max_attempts)
            .await?;
        let result = self.run_loop(job_id, &params).await?;
        match result {
            serde_json::Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        }
    }

    /// Creates the job, then schedules the engine's background run on
    /// the resolved pool and returns immediately.
    pub async fn submit(self: &Arc<Self>, params: PredictParams, payload: serde_json::Value) -> Result<JobId> {
        let max_attempts = params.max_attempts.unwrap_or(3);
        let job_id = self.create_job(&params, payload, max_attempts).await?;
        self.spawn_background(job_id, params);
        Ok(job_id)
    }

    pub async fn submit_batch(self: &Arc<Self>, params: PredictParams, payloads: Vec<serde_json::Value>) -> Result<JobId> {
        let max_attempts = params.max_attempts.unwrap_or(3);
        let job_id = self.create_job(&params, serde_json::Value::Array(payloads), max_attempts).await?;
        self.spawn_background(job_id, params);
        Ok(job_id)
    }

    pub async fn get_job(&self, id: JobId) -> Result<Job> {
        self.jobs.get(id).await
    }

    pub async fn cancel_job(&self, id: JobId, reason: Option<&str>) -> Result<Job> {
        self.jobs.cancel_job(id, reason).await?;
        self.jobs.get(id).await
    }

    fn spawn_background(self: &Arc<Self>, job_id: JobId, params: PredictParams) {
        let engine = self.clone();
        tokio::spawn(async move {
            let _ = engine.run_loop(job_id, &params).await;
        });
    }

    async fn create_job(&self, params: &PredictParams, payload: serde_json::Value, max_attempts: i64) -> Result<JobId> {
        let (_, version) = self.routing.resolve(&params.model, params.version.as_deref(), params.request_id.as_deref())?;
        let device = self.policy.pool_name_for(&params.model, &version);
        METRICS.requests_total.with_label_values(&[&params.model, &version]).inc();
        let job = self
            .jobs
            .create_job(NewJob {
                model_name: params.model.clone(),
                model_version: version,
                payload,
                device,
                max_attempts,
                max_runtime_s: params.max_runtime_s,
                max_total_runtime_s: params.max_total_runtime_s,
                cancellable: true,
            })
            .await?;
        Ok(job.id)
    }

    /// Runs the retry loop for an already-created job. Used both
    /// inline (synchronous callers) and on a background task (async
    /// façade).
    async fn run_loop(&self, job_id: JobId, params: &PredictParams) -> Result<serde_json::Value> {
        let loop_start = std::time::Instant::now();
        let job = self.jobs.get(job_id).await?;
        let model = job.model_name.clone();
        let version = job.model_version.clone();
        let kind = match &job.payload {
            serde_json::Value::Array(items) => PayloadKind::Batch(items.clone()),
            other => PayloadKind::Single(other.clone()),
        };

        let pipeline = match self.registry.get(&model, &version) {
            Ok(p) => p,
            Err(e) => {
                let _ = self.jobs.mark_failed(job_id, e.error_type(), &e.to_string()).await;
                return Err(e);
            }
        };
        let pool = match self.policy.resolve(&model, &version) {
            Ok(p) => p,
            Err(e) => {
                let _ = self.jobs.mark_failed(job_id, e.error_type(), &e.to_string()).await;
                return Err(e);
            }
        };

        let mut last_error: Option<Error> = None;

        loop {
            let job = self.jobs.get(job_id).await?;
            if self.jobs.is_cancelled(&job) {
                return Err(Error::Pipeline("cancelled".to_string()));
            }
            if job.attempt_count > 0 && !self.jobs.should_retry(&job) {
                break;
            }

            let reason = last_error.as_ref().map(|e| e.error_type().to_string());
            let reason_label = reason.clone().unwrap_or_else(|| "initial".to_string());
            let job = self.jobs.record_attempt(job_id, reason.as_deref()).await?;
            METRICS.retries_total.with_label_values(&[&model, &version, &reason_label]).inc();

            let effective_timeout = effective_timeout(params.timeout, job.max_runtime_s);

            let pipeline = pipeline.clone();
            let jobs = self.jobs.clone();
            let kind_for_attempt = kind.clone();
            let fut = async move {
                jobs.mark_running(job_id).await?;
                let result = match kind_for_attempt {
                    PayloadKind::Single(v) => pipeline.run(v).await,
                    PayloadKind::Batch(items) => pipeline.run_batch(items).await.map(serde_json::Value::Array),
                };
                match result {
                    Ok(value) => {
                        jobs.mark_succeeded(job_id, value.clone()).await?;
                        // `mark_succeeded`'s write is conditional on the job
                        // not already being terminal, so a concurrent
                        // cancellation can silently reject it. Re-read to
                        // confirm the write actually landed before handing
                        // a result back to a synchronous caller.
                        let refreshed = jobs.get(job_id).await?;
                        if refreshed.status != JobStatus::Succeeded {
                            return Err(Error::Pipeline("cancelled".to_string()));
                        }
                        Ok(value)
                    }
                    Err(e) => {
                        jobs.mark_failed(job_id, e.error_type(), &e.to_string()).await?;
                        Err(e)
                    }
                }
            };

            match pool.submit(fut, effective_timeout).await {
                Ok(value) => {
                    let latency = loop_start.elapsed().as_secs_f64();
                    METRICS.latency_seconds.with_label_values(&[&model, &version]).observe(latency);
                    tracing::info!(
                        request_id = params.request_id.as_deref().unwrap_or(""),
                        job_id = %job_id,
                        model = %model,
                        version = %version,
                        latency_ms = latency * 1000.0,
                        "inference_success"
                    );
                    return Ok(value);
                }
                Err(Error::ExecutionTimeout(d)) => {
                    METRICS.errors_total.with_label_values(&[&model, &version, "timeout"]).inc();
                    let refreshed = self.jobs.get(job_id).await?;
                    if self.jobs.has_exceeded_total_budget(&refreshed) {
                        let _ = self.jobs.mark_timeout(job_id, "total runtime budget exceeded").await;
                        METRICS.retry_exhausted_total.with_label_values(&[&model, &version]).inc();
                        last_error = Some(Error::ExecutionTimeout(d));
                        break;
                    }
                    if !self.jobs.should_retry(&refreshed) {
                        METRICS.retry_exhausted_total.with_label_values(&[&model, &version]).inc();
                        last_error = Some(Error::ExecutionTimeout(d));
                        break;
                    }
                    last_error = Some(Error::ExecutionTimeout(d));
                }
                Err(other) => {
                    METRICS.errors_total.with_label_values(&[&model, &version, "inference_error"]).inc();
                    last_error = Some(other);
                    break;
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "inference failed with no recorded cause".to_string());
        Err(Error::Pipeline(message))
    }
}

fn effective_timeout(request_timeout: Option<Duration>, job_max_runtime_s: Option<f64>) -> Option<Duration> {
    let job_timeout = job_max_runtime_s.map(Duration::from_secs_f64);
    match (request_timeout, job_timeout) {
        (Some(rt), Some(jt)) => Some(rt.min(jt)),
        (Some(rt), None) => Some(rt),
        (None, Some(jt)) => Some(jt),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionPool;
    use crate::jobs::store::SqliteJobStore;
    use crate::registry::default_registry;
    use crate::routing::default_routing_table;
    use std::collections::HashMap;

    async fn engine() -> Arc<PredictionEngine> {
        let store = SqliteJobStore::connect(":memory:").await.unwrap();
        let jobs = JobService::new(Arc::new(store));
        let routing = Arc::new(RoutingResolver::new(default_routing_table()));
        let mut pools = HashMap::new();
        pools.insert("cpu".to_string(), Arc::new(ExecutionPool::new("cpu", 4)));
        let policy = Arc::new(ExecutionPolicy::new(pools, HashMap::new(), "cpu"));
        let registry = Arc::new(default_registry());
        Arc::new(PredictionEngine::new(routing, policy, registry, jobs))
    }

    #[tokio::test]
    async fn happy_sync_predict_succeeds() {
        let engine = engine().await;
        let params = PredictParams { model: "echo".into(), version: Some("v1".into()), ..Default::default() };
        let result = engine.predict(params, serde_json::json!({"x": 42})).await.unwrap();
        assert_eq!(result, serde_json::json!({"echo": {"x": 42}}));
    }

    #[tokio::test]
    async fn unknown_model_surfaces_model_not_found_and_marks_job_failed() {
        let engine = engine().await;
        let params = PredictParams { model: "echo".into(), version: Some("v99".into()), ..Default::default() };
        let err = engine.predict(params, serde_json::json!({"x": 1})).await.unwrap_err();
        assert_eq!(err.error_type(), "ModelNotFoundError");
    }

    #[tokio::test]
    async fn async_submit_returns_job_id_and_completes_in_background() {
        let engine = engine().await;
        let params = PredictParams { model: "echo".into(), version: Some("v1".into()), ..Default::default() };
        let job_id = engine.submit(params, serde_json::json!({"x": 1})).await.unwrap();
        // Give the background task a moment to run.
        for _ in 0..20 {
            let job = engine.get_job(job_id).await.unwrap();
            if job.status.is_terminal() {
                assert_eq!(job.status, crate::jobs::job::JobStatus::Succeeded);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn cancellation_before_worker_starts_is_honored() {
        let engine = engine().await;
        let params = PredictParams { model: "echo".into(), version: Some("v1".into()), ..Default::default() };
        // Create the job directly (without running the loop) so we can
        // cancel it before any attempt starts.
        let job_id = engine.create_job(&params, serde_json::json!({"x": 1}), 3).await.unwrap();
        engine.cancel_job(job_id, Some("test")).await.unwrap();
        let err = engine.run_loop(job_id, &params).await.unwrap_err();
        assert_eq!(err.error_type(), "InferenceExecutionError");
        let job = engine.get_job(job_id).await.unwrap();
        assert_eq!(job.status, crate::jobs::job::JobStatus::Cancelled);
        assert!(job.error_message.unwrap().starts_with("Cancelled"));
    }

    /// Always sleeps longer than any per-attempt timeout used below, so
    /// every attempt in these tests times out deterministically.
    struct SlowPipeline;

    #[async_trait::async_trait]
    impl crate::registry::Pipeline for SlowPipeline {
        async fn run(&self, _input: serde_json::Value) -> Result<serde_json::Value> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(serde_json::json!({}))
        }
    }

    async fn engine_with_slow_model() -> Arc<PredictionEngine> {
        let store = SqliteJobStore::connect(":memory:").await.unwrap();
        let jobs = JobService::new(Arc::new(store));
        let routing = Arc::new(RoutingResolver::new(default_routing_table()));
        let mut pools = HashMap::new();
        pools.insert("cpu".to_string(), Arc::new(ExecutionPool::new("cpu", 4)));
        let policy = Arc::new(ExecutionPolicy::new(pools, HashMap::new(), "cpu"));
        let mut registry = crate::registry::Registry::new();
        registry.register("slow", "v1", || Arc::new(SlowPipeline));
        Arc::new(PredictionEngine::new(routing, policy, Arc::new(registry), jobs))
    }

    #[tokio::test]
    async fn retries_three_times_on_repeated_timeout_then_fails() {
        let engine = engine_with_slow_model().await;
        let params = PredictParams {
            model: "slow".into(),
            version: Some("v1".into()),
            timeout: Some(Duration::from_millis(50)),
            max_runtime_s: Some(0.05),
            max_attempts: Some(3),
            ..Default::default()
        };
        let job_id = engine.create_job(&params, serde_json::json!({}), 3).await.unwrap();
        let err = engine.run_loop(job_id, &params).await.unwrap_err();
        assert_eq!(err.error_type(), "InferenceExecutionError");
        let job = engine.get_job(job_id).await.unwrap();
        assert_eq!(job.attempt_count, 3);
    }

    #[tokio::test]
    async fn total_runtime_budget_stops_retries_early_as_a_timeout() {
        let engine = engine_with_slow_model().await;
        let params = PredictParams {
            model: "slow".into(),
            version: Some("v1".into()),
            timeout: Some(Duration::from_millis(80)),
            max_runtime_s: Some(0.08),
            max_total_runtime_s: Some(0.1),
            max_attempts: Some(10),
            ..Default::default()
        };
        let job_id = engine.create_job(&params, serde_json::json!({}), 10).await.unwrap();
        engine.run_loop(job_id, &params).await.unwrap_err();
        let job = engine.get_job(job_id).await.unwrap();
        assert_eq!(job.status, crate::jobs::job::JobStatus::Timeout);
        // The first attempt alone exceeds the total budget, so no
        // second attempt is made.
        assert_eq!(job.attempt_count, 1);
    }

    #[tokio::test]
    async fn cancellation_mid_attempt_preempts_a_stale_success() {
        let engine = engine_with_slow_model().await;
        let params = PredictParams { model: "slow".into(), version: Some("v1".into()), ..Default::default() };
        let job_id = engine.create_job(&params, serde_json::json!({}), 1).await.unwrap();

        let run_handle = {
            let engine = engine.clone();
            let params = params.clone();
            tokio::spawn(async move { engine.run_loop(job_id, &params).await })
        };
        // SlowPipeline sleeps 200ms before returning; cancel once the
        // attempt is underway but well before it resolves.
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.cancel_job(job_id, Some("test")).await.unwrap();

        let err = run_handle.await.unwrap().unwrap_err();
        assert_eq!(err.error_type(), "InferenceExecutionError");
        let job = engine.get_job(job_id).await.unwrap();
        assert_eq!(job.status, crate::jobs::job::JobStatus::Cancelled);
    }
}
