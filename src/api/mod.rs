//! HTTP API layer.
//!
//! The router is composable — `api_router()` returns a `Router` that can
//! be mounted on any axum server instance. Protected routes sit behind a
//! middleware stack: Auth → Rate limit → Handler (with verified-account
//! and health-profile guards applied per route).

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use types::ApiContext;
