//! The dispatch and job-lifecycle engine: routing resolution, bounded
//! device-pinned execution pools, the persistent job state machine,
//! and the prediction engine that ties them together behind a
//! synchronous call and an asynchronous façade.

pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod facade;
pub mod jobs;
pub mod registry;
pub mod routing;

pub use config::Config;
pub use engine::{PredictParams, PredictionEngine};
pub use error::{Error, Result};
pub use execution::{ExecutionPolicy, ExecutionPool};
pub use facade::AsyncFacade;
pub use jobs::{Job, JobId, JobService, JobStatus, JobStore, NewJob, SqliteJobStore};
pub use registry::{EchoPipeline, Pipeline, Registry};
pub use routing::{RouteStrategy, RoutingResolver, RoutingTable};

/// Current version of dispatchd.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
