//! The dispatchd HTTP surface: axum router, request-id/payload-guard/
//! api-key middleware, per-key rate limiting, scope enforcement, and
//! the request/response schemas fronting the `dispatchd-core` engine.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{build_router, build_state, run};
pub use state::AppState;
