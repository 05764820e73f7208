//! Campus beacon endpoints.
//!
//! `POST /beacon/activate`   — start a time-bounded location broadcast
//! `PUT  /beacon/deactivate` — stop it early
//! `GET  /beacon/status`     — current session state
//! `PUT  /beacon/extend`     — push the end time out
//! `PUT  /beacon/location`   — move the live beacon
//! `GET  /beacon/nearby`     — live beacons around a point (verified callers)
//! `GET  /beacon/history`    — the caller's past sessions
//! `GET  /beacon/stats`      — aggregate session stats

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{require_profile, require_verified, PageQuery};
use crate::api::error::ApiError;
use crate::api::types::{AccountContext, ApiContext};
use crate::beacon::{self, ActivationInput, BeaconPolicy, BeaconStatusView, NearbyBeacon};
use crate::db::repository::BeaconStats;
use crate::geo::GeoPoint;
use crate::models::{AlertRecord, LocationInput, LocationView};

fn policy(ctx: &ApiContext) -> BeaconPolicy {
    let config = &ctx.state.config;
    BeaconPolicy {
        default_secs: config.beacon_default_secs,
        max_secs: config.beacon_max_secs,
        extend_secs: config.beacon_extend_secs,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    /// Absence is a validation failure, not an extractor rejection.
    #[serde(default)]
    pub location: Option<LocationInput>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub share_with_campus: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateResponse {
    pub alert_id: Uuid,
    pub beacon_active: bool,
    pub duration: i64,
    pub expires_at: DateTime<Utc>,
}

/// `POST /beacon/activate` — start a beacon session (201).
pub async fn activate(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Json(request): Json<ActivateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_verified(&caller.account)?;
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let profile = require_profile(&conn, &caller.account.id)?;

    let location = request
        .location
        .ok_or_else(|| ApiError::BadRequest("location is required".into()))?;
    let input = ActivationInput {
        location,
        duration_secs: request.duration,
        description: request.description,
        share_with_campus: request.share_with_campus.unwrap_or(false),
    };
    let now = Utc::now();
    let record = beacon::activate(&conn, &caller.account.id, &profile.id, &input, &policy(&ctx), now)?;

    let expires_at = record
        .beacon_end_time
        .ok_or_else(|| ApiError::Internal("activated beacon missing end time".into()))?;
    tracing::info!(alert_id = %record.id, account_id = %caller.account.id, "Beacon activated");

    Ok((
        StatusCode::CREATED,
        Json(ActivateResponse {
            alert_id: record.id,
            beacon_active: true,
            duration: (expires_at - now).num_seconds(),
            expires_at,
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateResponse {
    pub beacon_active: bool,
    pub deactivated_at: DateTime<Utc>,
}

/// `PUT /beacon/deactivate` — stop the caller's beacon; 404 if none.
pub async fn deactivate(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
) -> Result<Json<DeactivateResponse>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let deactivated_at = beacon::deactivate(&conn, &caller.account.id, Utc::now())?;

    tracing::info!(account_id = %caller.account.id, "Beacon deactivated");
    Ok(Json(DeactivateResponse {
        beacon_active: false,
        deactivated_at,
    }))
}

/// `GET /beacon/status` — current session state, quiet when none.
pub async fn status(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
) -> Result<Json<BeaconStatusView>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let view = beacon::status(&conn, &caller.account.id, Utc::now())?;
    Ok(Json(view))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendRequest {
    #[serde(default)]
    pub additional_duration: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendResponse {
    pub new_end_time: DateTime<Utc>,
}

/// `PUT /beacon/extend` — add time to the live session.
pub async fn extend(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Json(request): Json<ExtendRequest>,
) -> Result<Json<ExtendResponse>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let new_end_time = beacon::extend(
        &conn,
        &caller.account.id,
        request.additional_duration,
        &policy(&ctx),
        Utc::now(),
    )?;
    Ok(Json(ExtendResponse { new_end_time }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateRequest {
    pub location: LocationInput,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateResponse {
    pub location: LocationView,
}

/// `PUT /beacon/location` — move the live beacon.
pub async fn update_location(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Json(request): Json<LocationUpdateRequest>,
) -> Result<Json<LocationUpdateResponse>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let location =
        beacon::update_location(&conn, &caller.account.id, &request.location, Utc::now())?;
    Ok(Json(LocationUpdateResponse { location }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQuery {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub max_distance: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyResponse {
    pub nearby_beacons: Vec<NearbyBeacon>,
    pub search_radius: f64,
    pub total_active: usize,
}

/// `GET /beacon/nearby` — live beacons around a point, any owner.
/// Restricted to verified callers; descriptions are withheld.
pub async fn nearby(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbyResponse>, ApiError> {
    require_verified(&caller.account)?;

    let config = &ctx.state.config;
    let center = GeoPoint::new(query.longitude, query.latitude)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let radius = query
        .max_distance
        .unwrap_or(config.nearby_default_radius_m)
        .clamp(1.0, config.nearby_max_radius_m);

    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let found = beacon::nearby(&conn, center, radius, Utc::now())?;

    Ok(Json(NearbyResponse {
        total_active: found.len(),
        nearby_beacons: found,
        search_radius: radius,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub beacons: Vec<AlertRecord>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// `GET /beacon/history` — the caller's past beacon sessions.
pub async fn history(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Query(query): Query<PageQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let page = beacon::history(
        &conn,
        &caller.account.id,
        query.page(),
        query.limit(),
        Utc::now(),
    )?;
    Ok(Json(HistoryResponse {
        beacons: page.items,
        total: page.total,
        page: query.page(),
        limit: query.limit(),
    }))
}

/// `GET /beacon/stats` — aggregate counts for the caller.
pub async fn stats(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
) -> Result<Json<BeaconStats>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let stats = beacon::stats(&conn, &caller.account.id, Utc::now())?;
    Ok(Json(stats))
}
