//! Per-account, per-action rate limiting middleware.
//!
//! Runs after auth (route layer), so the key is the account id plus the
//! matched route template — concrete path params never fragment the
//! counters. Alert-producing actions get the tighter quota.

use std::time::{Duration, Instant};

use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{AccountContext, ApiContext, RateQuota};

/// Actions capped by the alert quota rather than the default.
const ALERT_ACTIONS: [&str; 2] = ["POST /beacon/activate", "POST /emergency/sos"];

/// Per-account rate limiting. Returns 429 with `Retry-After` when exceeded.
pub async fn limit(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let identity = req
        .extensions()
        .get::<AccountContext>()
        .map(|a| a.account.id.to_string())
        .ok_or(ApiError::Internal("rate limiter ran before auth".into()))?;

    let action = match req.extensions().get::<MatchedPath>() {
        Some(path) => format!("{} {}", req.method(), path.as_str()),
        None => format!("{} {}", req.method(), req.uri().path()),
    };

    let config = &ctx.state.config;
    let quota = if ALERT_ACTIONS.contains(&action.as_str()) {
        RateQuota {
            limit: config.rate_alert_limit,
            window: Duration::from_secs(config.rate_alert_window_secs),
        }
    } else {
        RateQuota {
            limit: config.rate_default_limit,
            window: Duration::from_secs(config.rate_default_window_secs),
        }
    };

    // MutexGuard is !Send — must drop before .await via block scope
    {
        let mut limiter = ctx
            .rate_limiter
            .lock()
            .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

        limiter
            .check(&identity, &action, quota, Instant::now())
            .map_err(|retry_after| ApiError::RateLimited { retry_after })?;
    }

    Ok(next.run(req).await)
}
