//! Endpoint handlers, grouped by surface.

pub mod auth;
pub mod beacon;
pub mod emergency;
pub mod health;
pub mod profile;

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::db::repository::get_profile_by_account;
use crate::models::{Account, HealthProfile};

/// Route-optional gate: the account must be verified before it can
/// produce alerts or query campus-wide surfaces.
pub(crate) fn require_verified(account: &Account) -> Result<(), ApiError> {
    if account.is_verified {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Account must be verified for this action".to_string(),
        ))
    }
}

/// Route-optional gate: a health profile must exist so responders have
/// something to scan. Returns it for downstream use.
pub(crate) fn require_profile(
    conn: &Connection,
    account_id: &Uuid,
) -> Result<HealthProfile, ApiError> {
    get_profile_by_account(conn, account_id)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound("No health profile for this account".to_string()))
}

/// Shared pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}
