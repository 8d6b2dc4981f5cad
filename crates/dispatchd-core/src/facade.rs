//! Thin async façade: create a job, return its id, let the engine's
//! background run happen on the pool. Holds no in-memory state of its
//! own — `get` proxies straight to the job service.

use std::sync::Arc;

use crate::engine::{PredictParams, PredictionEngine};
use crate::error::Result;
use crate::jobs::job::{Job, JobId};

#[derive(Clone)]
pub struct AsyncFacade {
    engine: Arc<PredictionEngine>,
}

impl AsyncFacade {
    pub fn new(engine: Arc<PredictionEngine>) -> Self {
        Self { engine }
    }

    pub async fn submit(&self, params: PredictParams, payload: serde_json::Value) -> Result<JobId> {
        self.engine.submit(params, payload).await
    }

    pub async fn submit_batch(&self, params: PredictParams, payloads: Vec<serde_json::Value>) -> Result<JobId> {
        self.engine.submit_batch(params, payloads).await
    }

    pub async fn get(&self, id: JobId) -> Result<Job> {
        self.engine.get_job(id).await
    }

    pub async fn cancel(&self, id: JobId, reason: Option<&str>) -> Result<Job> {
        self.engine.cancel_job(id, reason).await
    }
}
