//! Middleware for the dispatchd HTTP surface: API-key identification,
//! scope enforcement, per-key sliding-window rate limiting, and
//! request-id propagation. Payload size is guarded at the router layer
//! via `axum::extract::DefaultBodyLimit` rather than here.

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{api_key_auth_middleware, require_admin, require_predict, require_read_models};
pub use rate_limit::{rate_limit_metrics, rate_limit_models, rate_limit_predict};
pub use request_id::request_id_middleware;
