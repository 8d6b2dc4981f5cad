//! Process bootstrap for the HTTP surface: builds the engine's
//! dependency graph from `Config`, assembles the axum router with its
//! ambient middleware stack, and serves it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use dispatchd_core::{
    AsyncFacade, Config, Error, ExecutionPolicy, ExecutionPool, JobService, PredictionEngine, Registry, Result,
    RoutingResolver, RoutingTable, SqliteJobStore,
};

use crate::middleware::request_id::request_id_middleware;
use crate::state::AppState;

pub async fn run(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid bind address: {e}")))?;

    let state = build_state(config).await?;
    let app = build_router(state);

    info!("dispatchd listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| Error::Config(format!("failed to bind: {e}")))?;
    axum::serve(listener, app.into_make_service()).await.map_err(|e| Error::Config(format!("server error: {e}")))?;
    Ok(())
}

/// Wires the routing table, execution pools/policy, job store, and
/// registry into an `AppState`. Split out from `run` so tests and the
/// `print-config`/`init-store` CLI subcommands can reuse it.
pub async fn build_state(config: Config) -> Result<AppState> {
    let routing_table = match &config.routing.table_path {
        Some(path) => RoutingTable::load(path)?,
        None => dispatchd_core::routing::default_routing_table(),
    };
    let routing = Arc::new(RoutingResolver::new(routing_table));

    let mut pools = HashMap::new();
    for (device, workers) in &config.pools.devices {
        pools.insert(device.clone(), Arc::new(ExecutionPool::new(device.clone(), *workers)));
    }
    let policy = Arc::new(ExecutionPolicy::new(pools, config.pools.routes.clone(), config.pools.default_pool.clone()));

    let registry = Arc::new(dispatchd_core::registry::default_registry());

    let store = SqliteJobStore::connect(&config.store.path).await?;
    let jobs = JobService::new(Arc::new(store));

    let engine = Arc::new(PredictionEngine::new(routing, policy, registry.clone(), jobs));
    let facade = AsyncFacade::new(engine.clone());

    Ok(AppState::new(engine, facade, registry, Arc::new(config)))
}

pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    crate::routes::router(state.clone())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
