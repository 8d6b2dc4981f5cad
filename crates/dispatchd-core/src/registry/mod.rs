//! Model registry: `(name, version) -> pipeline`, lazy-built and
//! cached. Pipelines are opaque polymorphic units exposing
//! `run`/`run_batch`; the engine never inspects payload structure.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;

use crate::error::{Error, Result};

/// Capability set every model implements. Pipelines are shared across
/// workers, so implementations must be internally thread-safe.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn run(&self, input: serde_json::Value) -> Result<serde_json::Value>;

    /// Default batch behavior falls back to sequential `run` per item,
    /// matching the reference pipeline contract; implementations with
    /// genuine batch speedups should override this.
    async fn run_batch(&self, inputs: Vec<serde_json::Value>) -> Result<Vec<serde_json::Value>> {
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            out.push(self.run(input).await?);
        }
        Ok(out)
    }
}

type Builder = Box<dyn Fn() -> Arc<dyn Pipeline> + Send + Sync>;

/// Resolves `(name, version)` to a pipeline instance. Each entry is
/// built at most once, guarded by a per-entry one-time initializer so
/// concurrent first loads of distinct models don't serialize against
/// each other.
pub struct Registry {
    builders: HashMap<(String, String), Builder>,
    cache: HashMap<(String, String), OnceCell<Arc<dyn Pipeline>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { builders: HashMap::new(), cache: HashMap::new() }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        builder: impl Fn() -> Arc<dyn Pipeline> + Send + Sync + 'static,
    ) {
        let key = (name.into(), version.into());
        self.cache.entry(key.clone()).or_insert_with(OnceCell::new);
        self.builders.insert(key, Box::new(builder));
    }

    pub fn get(&self, name: &str, version: &str) -> Result<Arc<dyn Pipeline>> {
        let key = (name.to_string(), version.to_string());
        let cell = self.cache.get(&key).ok_or_else(|| Error::ModelNotFound {
            name: name.to_string(),
            version: version.to_string(),
        })?;
        let builder = self.builders.get(&key).ok_or_else(|| Error::ModelNotFound {
            name: name.to_string(),
            version: version.to_string(),
        })?;
        Ok(cell.get_or_init(|| builder()).clone())
    }

    pub fn list(&self) -> Vec<(String, String)> {
        let mut models: Vec<_> = self.builders.keys().cloned().collect();
        models.sort();
        models
    }

    /// Subset of `list()` whose `OnceCell` has actually been
    /// initialized — the registry's admin-facing introspection view.
    pub fn list_loaded(&self) -> Vec<(String, String)> {
        let mut models: Vec<_> = self.cache.iter().filter(|(_, cell)| cell.get().is_some()).map(|(key, _)| key.clone()).collect();
        models.sort();
        models
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Trivial identity model: returns `{"echo": input}` unchanged. Ships
/// as the default fixture model for tests and the default routing
/// table.
pub struct EchoPipeline;

#[async_trait]
impl Pipeline for EchoPipeline {
    async fn run(&self, input: serde_json::Value) -> Result<serde_json::Value> {
        Ok(serde_json::json!({ "echo": input }))
    }
}

/// Builds a registry pre-populated with the `echo` fixture model at
/// `v1` and `v2`, and `classifier`/`stable_model` aliases pointing at
/// the same trivial pipeline so the default routing table resolves.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    for (name, version) in [
        ("echo", "v1"),
        ("echo", "v2"),
        ("classifier", "v1"),
        ("classifier", "v2"),
        ("stable_model", "v3"),
    ] {
        registry.register(name, version, || Arc::new(EchoPipeline));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_pipeline_returns_input_wrapped() {
        let pipeline = EchoPipeline;
        let out = pipeline.run(serde_json::json!({"x": 42})).await.unwrap();
        assert_eq!(out, serde_json::json!({"echo": {"x": 42}}));
    }

    #[tokio::test]
    async fn run_batch_defaults_to_sequential_run() {
        let pipeline = EchoPipeline;
        let out = pipeline.run_batch(vec![serde_json::json!(1), serde_json::json!(2)]).await.unwrap();
        assert_eq!(out, vec![serde_json::json!({"echo": 1}), serde_json::json!({"echo": 2})]);
    }

    #[test]
    fn unknown_model_fails_with_model_not_found() {
        let registry = default_registry();
        let err = registry.get("ghost", "v1").unwrap_err();
        assert_eq!(err.error_type(), "ModelNotFoundError");
    }

    #[test]
    fn registered_model_resolves_and_caches() {
        let registry = default_registry();
        let a = registry.get("echo", "v1").unwrap();
        let b = registry.get("echo", "v1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn list_is_sorted_and_contains_registered_models() {
        let registry = default_registry();
        let models = registry.list();
        assert!(models.contains(&("echo".to_string(), "v1".to_string())));
    }

    #[test]
    fn list_loaded_only_includes_models_actually_built() {
        let registry = default_registry();
        assert!(registry.list_loaded().is_empty());
        registry.get("echo", "v1").unwrap();
        let loaded = registry.list_loaded();
        assert_eq!(loaded, vec![("echo".to_string(), "v1".to_string())]);
    }
}
