//! Shared application state: the engine, the async façade, the model
//! registry (for `/models`), and the identity/rate-limit fixtures the
//! HTTP boundary owns.

use std::collections::HashMap;
use std::sync::Arc;

use dispatchd_core::{AsyncFacade, Config, PredictionEngine, Registry};

use crate::middleware::rate_limit::SlidingWindowLimiter;

/// `{api_key, tenant_id, scopes}` — owned by the HTTP boundary, passed
/// into the engine only as an opaque `identity_key` for A/B bucketing.
#[derive(Debug, Clone)]
pub struct Identity {
    pub api_key: String,
    pub tenant_id: String,
    pub scopes: Vec<String>,
}

impl Identity {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Per-api-key sliding-window limiters for the three rate-limited route
/// groups named in the spec.
pub struct RateLimiters {
    pub predict: SlidingWindowLimiter,
    pub models: SlidingWindowLimiter,
    pub metrics: SlidingWindowLimiter,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PredictionEngine>,
    pub facade: AsyncFacade,
    pub registry: Arc<Registry>,
    pub config: Arc<Config>,
    pub identities: Arc<HashMap<String, Identity>>,
    pub rate_limiters: Arc<RateLimiters>,
}

impl AppState {
    pub fn new(
        engine: Arc<PredictionEngine>,
        facade: AsyncFacade,
        registry: Arc<Registry>,
        config: Arc<Config>,
    ) -> Self {
        let identities = Arc::new(
            config
                .identities
                .iter()
                .map(|f| {
                    (
                        f.api_key.clone(),
                        Identity { api_key: f.api_key.clone(), tenant_id: f.tenant_id.clone(), scopes: f.scopes.clone() },
                    )
                })
                .collect::<HashMap<_, _>>(),
        );
        let rate_limiters = Arc::new(RateLimiters {
            predict: SlidingWindowLimiter::new(10, std::time::Duration::from_secs(1)),
            models: SlidingWindowLimiter::new(2, std::time::Duration::from_secs(1)),
            metrics: SlidingWindowLimiter::new(1, std::time::Duration::from_secs(10)),
        });
        Self { engine, facade, registry, config, identities, rate_limiters }
    }
}
