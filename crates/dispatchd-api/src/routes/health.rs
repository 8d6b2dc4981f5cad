//! `GET /health`, `GET /ready` — liveness and readiness probes. Neither
//! requires an API key.

pub async fn health() -> &'static str {
    "OK"
}

/// Readiness additionally implies the job store and registry were
/// constructed successfully at startup; by the time this handler is
/// reachable that has already happened, so it degrades to liveness.
pub async fn ready() -> &'static str {
    "OK"
}
