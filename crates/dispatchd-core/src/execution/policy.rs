//! Maps `(model, version)` to a named execution pool, with a default
//! pool for anything not explicitly configured.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::execution::pool::ExecutionPool;

pub struct ExecutionPolicy {
    pools: HashMap<String, Arc<ExecutionPool>>,
    routes: HashMap<String, String>,
    default_pool: String,
}

impl ExecutionPolicy {
    pub fn new(pools: HashMap<String, Arc<ExecutionPool>>, routes: HashMap<String, String>, default_pool: impl Into<String>) -> Self {
        Self { pools, routes, default_pool: default_pool.into() }
    }

    fn key(model: &str, version: &str) -> String {
        format!("{model}:{version}")
    }

    /// Resolves the configured pool name for `(model, version)`,
    /// falling back to the default pool.
    pub fn pool_name_for(&self, model: &str, version: &str) -> String {
        self.routes
            .get(&Self::key(model, version))
            .cloned()
            .unwrap_or_else(|| self.default_pool.clone())
    }

    /// Resolves the pool instance itself. Fails fast with `PoolUnknown`
    /// if the configured target has no registered pool.
    pub fn resolve(&self, model: &str, version: &str) -> Result<Arc<ExecutionPool>> {
        let name = self.pool_name_for(model, version);
        self.pools
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::PoolUnknown(name))
    }
}
