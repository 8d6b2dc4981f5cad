pub mod health;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod predict;

use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::middleware::{
    api_key_auth_middleware, rate_limit_metrics, rate_limit_models, rate_limit_predict, require_admin,
    require_predict, require_read_models,
};
use crate::state::AppState;

/// Assembles the full HTTP surface. Scope + rate-limit middleware is
/// layered per route group so `/health`/`/ready` stay key-free while
/// everything else goes through the api-key gate first.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health::health)).route("/ready", get(health::ready));

    let predict_routes = Router::new()
        .route("/predict", post(predict::predict))
        .route("/predict/batch", post(predict::predict_batch))
        .route("/predict/async", post(predict::predict_async))
        .route("/predict/async/batch", post(predict::predict_async_batch))
        .route("/predict/async/:id", get(jobs::get_async_job))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_predict))
        .route_layer(middleware::from_fn(require_predict));

    let models_routes = Router::new()
        .route("/models", get(models::list_models))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_models))
        .route_layer(middleware::from_fn(require_read_models));

    let metrics_routes = Router::new()
        .route("/metrics", get(metrics::metrics))
        .route("/debug/models/loaded", get(models::list_loaded_models))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_metrics))
        .route_layer(middleware::from_fn(require_admin));

    let authenticated = Router::new()
        .merge(predict_routes)
        .merge(models_routes)
        .merge(metrics_routes)
        .route_layer(middleware::from_fn_with_state(state, api_key_auth_middleware));

    public.merge(authenticated)
}
