//! Health profile endpoints.
//!
//! One profile per account: the medical and emergency-contact data a
//! responder sees when an alert fires.
//!
//! `POST /profile` — create
//! `GET  /profile` — fetch
//! `PUT  /profile` — update

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{AccountContext, ApiContext};
use crate::db::repository::{get_profile_by_account, insert_profile, update_profile};
use crate::models::{HealthProfile, ProfileInput};

/// `POST /profile` — create the caller's health profile.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Json(input): Json<ProfileInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate(&input)?;

    let now = Utc::now();
    let profile = HealthProfile {
        id: Uuid::new_v4(),
        account_id: caller.account.id,
        blood_type: input.blood_type,
        allergies: input.allergies,
        medications: input.medications,
        conditions: input.conditions,
        primary_contact: input.primary_contact,
        secondary_contact: input.secondary_contact,
        residence_building: input.residence_building,
        residence_room: input.residence_room,
        created_at: now,
        updated_at: now,
    };

    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    match insert_profile(&conn, &profile) {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {
            return Err(ApiError::BadRequest(
                "A health profile already exists for this account".into(),
            ))
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(account_id = %caller.account.id, "Health profile created");
    Ok((StatusCode::CREATED, Json(profile)))
}

/// `GET /profile` — the caller's health profile.
pub async fn fetch(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
) -> Result<Json<HealthProfile>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    get_profile_by_account(&conn, &caller.account.id)
        .map_err(ApiError::from)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No health profile for this account".into()))
}

/// `PUT /profile` — update the caller's health profile.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Json(input): Json<ProfileInput>,
) -> Result<Json<HealthProfile>, ApiError> {
    validate(&input)?;

    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let existing = get_profile_by_account(&conn, &caller.account.id)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound("No health profile for this account".into()))?;

    let updated = HealthProfile {
        blood_type: input.blood_type,
        allergies: input.allergies,
        medications: input.medications,
        conditions: input.conditions,
        primary_contact: input.primary_contact,
        secondary_contact: input.secondary_contact,
        residence_building: input.residence_building,
        residence_room: input.residence_room,
        updated_at: Utc::now(),
        ..existing
    };

    if !update_profile(&conn, &updated).map_err(ApiError::from)? {
        return Err(ApiError::NotFound("No health profile for this account".into()));
    }
    Ok(Json(updated))
}

fn validate(input: &ProfileInput) -> Result<(), ApiError> {
    for contact in [&input.primary_contact, &input.secondary_contact]
        .into_iter()
        .flatten()
    {
        if contact.name.trim().is_empty() || contact.phone.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "Emergency contacts need a name and a phone number".into(),
            ));
        }
    }
    Ok(())
}
