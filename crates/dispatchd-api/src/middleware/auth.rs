//! `X-API-Key` identification and scope enforcement.
//!
//! The identity store is the static fixture table in `Config`, not a
//! durable provider — see `dispatchd_core::config::IdentityFixture`.
//! A verified `Identity` is inserted into the request extensions for
//! downstream handlers and for the rate limiters.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::state::{AppState, Identity};

const API_KEY_HEADER: &str = "x-api-key";

/// Resolves `X-API-Key` against the configured identity fixtures and
/// inserts the matching `Identity` into the request extensions. Fails
/// the request with 401 if the header is absent or unrecognized.
pub async fn api_key_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    let identity = state.identities.get(&api_key).cloned().ok_or(StatusCode::UNAUTHORIZED)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn identity_of(request: &Request<Body>) -> Option<&Identity> {
    request.extensions().get::<Identity>()
}

async fn require_scope(request: Request<Body>, next: Next, scope: &str) -> Result<Response, StatusCode> {
    match identity_of(&request) {
        Some(identity) if identity.has_scope(scope) => Ok(next.run(request).await),
        Some(_) => Err(StatusCode::FORBIDDEN),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

/// `predict` scope — covers all `/predict*` and `/jobs/*` paths.
pub async fn require_predict(request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    require_scope(request, next, "predict").await
}

/// `read_models` scope — covers `/models`.
pub async fn require_read_models(request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    require_scope(request, next, "read_models").await
}

/// `admin` scope — covers `/metrics` and `/debug/*`.
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    require_scope(request, next, "admin").await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(scopes: &[&str]) -> Identity {
        Identity {
            api_key: "dev-key".to_string(),
            tenant_id: "dev".to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn has_scope_checks_membership() {
        let id = identity(&["predict", "read_models"]);
        assert!(id.has_scope("predict"));
        assert!(!id.has_scope("admin"));
    }
}
