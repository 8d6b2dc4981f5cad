//! Bounded worker pools pinned to a logical device. Blocking submit
//! with a per-call timeout, cooperative cancellation only: on timeout
//! the underlying task's result is discarded, never aborted.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::jobs::metrics::METRICS;

/// A bounded group of workers for one logical device (`cpu`, `gpu`, …).
/// Capacity is modeled with a semaphore rather than a fixed thread
/// pool since the work submitted is `Future`-shaped, not a blocking
/// closure — the same "acquire a permit, run, release" shape as a
/// fixed-size worker pool, adapted to async tasks.
pub struct ExecutionPool {
    device: String,
    semaphore: Arc<Semaphore>,
    shutting_down: Arc<AtomicBool>,
}

impl ExecutionPool {
    pub fn new(device: impl Into<String>, max_workers: usize) -> Self {
        Self {
            device: device.into(),
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Blocks the caller until `fut` resolves, `timeout` elapses, or
    /// the pool has no capacity. On timeout the future's eventual
    /// result is discarded — it keeps running to completion on its
    /// task, it is not aborted.
    pub async fn submit<F, T>(&self, fut: F, timeout: Option<Duration>) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::ExecutorSaturated(self.device.clone()));
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ExecutorSaturated(self.device.clone()))?;

        let device = self.device.clone();
        // The permit and the inflight gauge travel with the spawned
        // task, not with this caller's wait: a timeout below means we
        // stop waiting, not that the worker stops running. The gauge
        // and the semaphore slot are only released when the task
        // itself finishes, matching the pool's cooperative-cancellation
        // contract.
        let handle = tokio::spawn(async move {
            METRICS.executor_inflight.with_label_values(&[&device]).inc();
            let _guard = InflightGuard { device: device.clone() };
            let result = fut.await;
            drop(permit);
            result
        });

        let device = self.device.clone();
        let outcome = match timeout {
            Some(d) => match tokio::time::timeout(d, handle).await {
                Ok(joined) => joined.map_err(|e| Error::Pipeline(format!("task panicked: {e}"))),
                Err(_) => {
                    METRICS.executor_timeouts_total.with_label_values(&[&device]).inc();
                    Ok(Err(Error::ExecutionTimeout(d)))
                }
            },
            None => handle
                .await
                .map_err(|e| Error::Pipeline(format!("task panicked: {e}"))),
        };

        outcome?
    }

    /// Semantically identical to `submit`; batching semantics belong
    /// to the pipeline, not the pool.
    pub async fn submit_batch<F, T>(&self, fut: F, timeout: Option<Duration>) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(fut, timeout).await
    }

    /// Enqueues without blocking; the result is ignored. Drops the
    /// work silently if the pool is shutting down.
    pub fn submit_background<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let semaphore = self.semaphore.clone();
        let device = self.device.clone();
        tokio::spawn(async move {
            let Ok(permit) = semaphore.acquire_owned().await else {
                return;
            };
            METRICS.executor_inflight.with_label_values(&[&device]).inc();
            fut.await;
            METRICS.executor_inflight.with_label_values(&[&device]).dec();
            drop(permit);
        });
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn inflight(&self) -> i64 {
        METRICS.executor_inflight.with_label_values(&[&self.device]).get() as i64
    }
}

struct InflightGuard {
    device: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        METRICS.executor_inflight.with_label_values(&[&self.device]).dec();
    }
}
