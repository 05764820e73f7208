//! Wardline — campus-safety backend.
//!
//! Students carry health profiles and can raise two kinds of alert
//! record: a one-shot SOS, and a time-bounded location beacon that
//! resolves itself when its end time passes. Everything is served over
//! an HTTP+JSON API backed by SQLite.
//!
//! Layering, leaf first:
//! - [`db`] — connection handling, migrations, and repositories built on
//!   single-statement conditional writes
//! - [`models`] / [`geo`] — records, enums, coordinate validation
//! - [`beacon`] / [`emergency`] — the alert lifecycle controllers
//! - [`api`] — axum router, access-gate middleware, endpoint handlers

pub mod api;
pub mod beacon;
pub mod config;
pub mod db;
pub mod emergency;
pub mod geo;
pub mod models;
pub mod state;
