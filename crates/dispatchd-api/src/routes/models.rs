//! `GET /models` — lists the `(name, version)` pairs the registry
//! currently has builders for. `GET /debug/models/loaded` is the
//! admin-scoped counterpart over the registry's lazily-built cache.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelEntry>,
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state.registry.list().into_iter().map(|(name, version)| ModelEntry { name, version }).collect();
    Json(ModelsResponse { models })
}

/// Admin introspection over which models have actually been built, as
/// opposed to merely registered.
pub async fn list_loaded_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state.registry.list_loaded().into_iter().map(|(name, version)| ModelEntry { name, version }).collect();
    Json(ModelsResponse { models })
}
