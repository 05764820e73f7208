//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it against the
//! session store, checks the account still exists and is active, and
//! injects `AccountContext` into request extensions for downstream
//! handlers.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{AccountContext, ApiContext};
use crate::db::repository::get_account;

/// Require a valid bearer token from a live account.
///
/// Accesses `ApiContext` from request extensions (injected by the
/// Extension layer).
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    // 1. Extract bearer token
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    // 2. Resolve to an account id
    let account_id = {
        let mut sessions = ctx
            .sessions
            .lock()
            .map_err(|_| ApiError::Internal("session lock".into()))?;
        sessions.resolve(&token).ok_or(ApiError::Unauthorized)?
    }; // MutexGuard dropped before any .await

    // 3. Account must still exist and be active
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let account = get_account(&conn, &account_id)
        .map_err(ApiError::from)?
        .filter(|a| a.is_active)
        .ok_or(ApiError::Unauthorized)?;

    // 4. Inject caller context for downstream handlers
    req.extensions_mut().insert(AccountContext { account });

    Ok(next.run(req).await)
}
