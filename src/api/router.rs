//! API router.
//!
//! Route groups:
//! - Public: health check, register, login (lockout handled in-handler)
//! - Protected: everything else, behind the access gate
//!
//! Gate order matches the middleware stack: bearer auth resolves the
//! account (and checks it is active), then the per-(account, action)
//! rate limiter runs as a route layer so it can key on the matched
//! route template. Verified-account and health-profile checks are
//! per-route guards inside the handlers.

use axum::http::{header, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the full API router.
pub fn api_router(ctx: ApiContext) -> Router {
    let protected = Router::new()
        .route("/auth/profile", get(endpoints::auth::me))
        .route(
            "/profile",
            post(endpoints::profile::create)
                .get(endpoints::profile::fetch)
                .put(endpoints::profile::update),
        )
        .route("/beacon/activate", post(endpoints::beacon::activate))
        .route("/beacon/deactivate", put(endpoints::beacon::deactivate))
        .route("/beacon/status", get(endpoints::beacon::status))
        .route("/beacon/extend", put(endpoints::beacon::extend))
        .route("/beacon/location", put(endpoints::beacon::update_location))
        .route("/beacon/nearby", get(endpoints::beacon::nearby))
        .route("/beacon/history", get(endpoints::beacon::history))
        .route("/beacon/stats", get(endpoints::beacon::stats))
        .route("/emergency/sos", post(endpoints::emergency::sos))
        .route("/emergency/alerts", get(endpoints::emergency::list))
        .route("/emergency/alerts/:id", get(endpoints::emergency::get))
        .route(
            "/emergency/alerts/:id/status",
            put(endpoints::emergency::update_status),
        )
        .route(
            "/emergency/alerts/:id/cancel",
            put(endpoints::emergency::cancel),
        )
        .route("/emergency/nearby", get(endpoints::emergency::nearby))
        .route("/emergency/stats", get(endpoints::emergency::stats))
        .with_state(ctx.clone())
        // Rate limiting is a route layer: it runs after routing (so the
        // matched template is available) and after the outer auth layer.
        .route_layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::Extension(ctx.clone()));

    let public = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .with_state(ctx.clone())
        .layer(axum::Extension(ctx));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(Any);

    Router::new().merge(protected).merge(public).layer(cors)
}
