//! `GET /metrics` — Prometheus text exposition format, admin-scoped.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use dispatchd_core::jobs::metrics::METRICS;

use crate::state::AppState;

pub async fn metrics(State(_state): State<AppState>) -> Response {
    let body = METRICS.render();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}
