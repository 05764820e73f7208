//! Account endpoints: registration, login, caller profile.
//!
//! `POST /auth/register` — Unprotected: create an account
//! `POST /auth/login`    — Unprotected: exchange credentials for a bearer token
//! `GET  /auth/profile`  — Protected: the caller's account record

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use pbkdf2::password_hash::rand_core::OsRng;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{AccountContext, ApiContext};
use crate::db::repository::{get_account_by_email, insert_account};
use crate::models::Account;

const MIN_PASSWORD_LEN: usize = 8;

fn email_regex() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub account_id: Uuid,
    pub email: String,
}

/// `POST /auth/register` — create an account. Accounts start unverified;
/// the verification flow flips the flag out of band.
pub async fn register(
    State(ctx): State<ApiContext>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = request.email.trim().to_lowercase();
    if !email_regex().is_match(&email) {
        return Err(ApiError::BadRequest("Invalid email address".into()));
    }
    if request.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if request.display_name.trim().is_empty() {
        return Err(ApiError::BadRequest("Display name is required".into()));
    }

    let now = Utc::now();
    let account = Account {
        id: Uuid::new_v4(),
        email: email.clone(),
        password_hash: hash_password(&request.password)?,
        display_name: request.display_name.trim().to_string(),
        is_active: true,
        is_verified: false,
        created_at: now,
        updated_at: now,
    };

    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    match insert_account(&conn, &account) {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {
            return Err(ApiError::BadRequest("Email is already registered".into()))
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(account_id = %account.id, "Account registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            account_id: account.id,
            email,
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub account: Account,
}

/// `POST /auth/login` — exchange credentials for a bearer token.
///
/// Repeated failures lock the credential for a cooldown window (423).
/// The failure path deliberately does not reveal whether the email
/// exists.
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = request.email.trim().to_lowercase();
    let now = Instant::now();

    {
        let mut lockout = ctx
            .lockout
            .lock()
            .map_err(|_| ApiError::Internal("lockout lock".into()))?;
        lockout
            .check(&email, now)
            .map_err(|retry_after| ApiError::Locked { retry_after })?;
    }

    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let account = get_account_by_email(&conn, &email).map_err(ApiError::from)?;

    let verified_account = account
        .filter(|a| a.is_active)
        .filter(|a| verify_password(&request.password, &a.password_hash));

    let Some(account) = verified_account else {
        if let Ok(mut lockout) = ctx.lockout.lock() {
            lockout.record_failure(&email, now);
        }
        return Err(ApiError::Unauthorized);
    };

    let (token, expires_in) = {
        let mut sessions = ctx
            .sessions
            .lock()
            .map_err(|_| ApiError::Internal("session lock".into()))?;
        (sessions.issue(account.id), sessions.ttl_secs())
    };

    if let Ok(mut lockout) = ctx.lockout.lock() {
        lockout.clear(&email);
    }

    tracing::info!(account_id = %account.id, "Login succeeded");

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer",
        expires_in,
        account,
    }))
}

/// `GET /auth/profile` — the caller's account record.
pub async fn me(
    Extension(caller): Extension<AccountContext>,
) -> Result<Json<Account>, ApiError> {
    Ok(Json(caller.account))
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Pbkdf2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let h1 = hash_password("same password").unwrap();
        let h2 = hash_password("same password").unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn garbage_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn email_regex_accepts_and_rejects() {
        assert!(email_regex().is_match("sam@campus.edu"));
        assert!(email_regex().is_match("first.last@sub.campus.edu"));
        assert!(!email_regex().is_match("not-an-email"));
        assert!(!email_regex().is_match("two@at@campus.edu"));
        assert!(!email_regex().is_match("spaces in@campus.edu"));
    }
}
