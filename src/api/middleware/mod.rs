//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Auth validator — bearer token → live account
//! 2. Rate limiter — per (account, action) quota, after identity resolves
//!
//! Verified-account and health-profile preconditions are per-route
//! guards in the endpoint modules.

pub mod auth;
pub mod rate;
