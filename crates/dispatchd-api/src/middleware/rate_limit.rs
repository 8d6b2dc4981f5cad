//! Per-api-key rate limiting. The window is fixed rather than a true
//! sliding window — same tradeoff the rest of this codebase makes for
//! its in-memory limiters — which is an acceptable approximation at
//! the window boundary for the budgets this spec names.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::Mutex;

use crate::state::{AppState, Identity};

#[derive(Clone)]
pub struct SlidingWindowLimiter {
    max_requests: u32,
    window: Duration,
    store: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window, store: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Returns `true` if the call is within budget, recording it either
    /// way once the window has not yet expired.
    pub async fn check_and_increment(&self, key: &str) -> bool {
        let mut store = self.store.lock().await;
        let now = Instant::now();
        match store.get_mut(key) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) > self.window {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count < self.max_requests {
                    *count += 1;
                    true
                } else {
                    false
                }
            }
            None => {
                store.insert(key.to_string(), (1, now));
                true
            }
        }
    }
}

fn api_key_of(request: &Request<Body>) -> Option<String> {
    request.extensions().get::<Identity>().map(|i| i.api_key.clone())
}

async fn enforce(
    limiter: &SlidingWindowLimiter,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let key = api_key_of(&request).unwrap_or_else(|| "anonymous".to_string());
    if !limiter.check_and_increment(&key).await {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}

/// `/predict*` — 10 requests/second per api key.
pub async fn rate_limit_predict(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    enforce(&state.rate_limiters.predict, request, next).await
}

/// `/models` — 2 requests/second per api key.
pub async fn rate_limit_models(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    enforce(&state.rate_limiters.models, request, next).await
}

/// `/metrics` — 1 request/10s per api key.
pub async fn rate_limit_metrics(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    enforce(&state.rate_limiters.metrics, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_configured_burst() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check_and_increment("key").await);
        assert!(limiter.check_and_increment("key").await);
        assert!(!limiter.check_and_increment("key").await);
    }

    #[tokio::test]
    async fn resets_after_the_window_elapses() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check_and_increment("key").await);
        assert!(!limiter.check_and_increment("key").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check_and_increment("key").await);
    }

    #[tokio::test]
    async fn separate_keys_have_independent_budgets() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check_and_increment("a").await);
        assert!(limiter.check_and_increment("b").await);
    }
}
