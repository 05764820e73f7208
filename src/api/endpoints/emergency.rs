//! Emergency (SOS) endpoints.
//!
//! `POST /emergency/sos`               — raise an SOS alert
//! `GET  /emergency/alerts`            — the caller's alerts, filtered/paged
//! `GET  /emergency/alerts/:id`        — one alert, ownership-checked
//! `PUT  /emergency/alerts/:id/status` — explicit status transition
//! `PUT  /emergency/alerts/:id/cancel` — cancel while still Active
//! `GET  /emergency/nearby`            — active alerts around a point
//! `GET  /emergency/stats`             — aggregate counts

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{require_profile, require_verified, PageQuery};
use crate::api::error::ApiError;
use crate::api::types::{AccountContext, ApiContext};
use crate::db::repository::{AlertFilter, EmergencyStats};
use crate::emergency::{self, NearbyAlert, SosInput};
use crate::geo::GeoPoint;
use crate::models::{AlertRecord, AlertStatus, LocationInput, Severity};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosRequest {
    /// Absence is a validation failure, not an extractor rejection.
    #[serde(default)]
    pub location: Option<LocationInput>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SosResponse {
    pub alert_id: Uuid,
    pub status: AlertStatus,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

/// `POST /emergency/sos` — raise an SOS alert (201) and schedule the
/// simulated notification dispatch.
pub async fn sos(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Json(request): Json<SosRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_verified(&caller.account)?;
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let profile = require_profile(&conn, &caller.account.id)?;

    let location = request
        .location
        .ok_or_else(|| ApiError::BadRequest("location is required".into()))?;
    let input = SosInput {
        location,
        description: request.description,
        symptoms: request.symptoms,
        severity: request.severity,
    };
    let record =
        emergency::create_sos(&conn, &caller.account.id, &profile.id, &input, Utc::now())?;

    tracing::info!(
        alert_id = %record.id,
        account_id = %caller.account.id,
        severity = record.severity.as_str(),
        "SOS alert raised"
    );
    emergency::spawn_dispatch(
        ctx.state.clone(),
        record.id,
        ctx.state.config.dispatch_delay_secs,
    );

    Ok((
        StatusCode::CREATED,
        Json(SosResponse {
            alert_id: record.id,
            status: record.status,
            severity: record.severity,
            created_at: record.created_at,
        }),
    ))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<AlertStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub alerts: Vec<AlertRecord>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

/// `GET /emergency/alerts` — the caller's alerts, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let filter = AlertFilter {
        status: query.status,
        alert_type: None,
        page: paging.page(),
        limit: paging.limit(),
    };

    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let page = emergency::list(&conn, &caller.account.id, &filter)?;
    Ok(Json(ListResponse {
        alerts: page.items,
        total: page.total,
        page: paging.page(),
        limit: paging.limit(),
    }))
}

/// `GET /emergency/alerts/:id` — one alert, ownership-checked.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<AlertRecord>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let record = emergency::get(&conn, &caller.account.id, &id)?;
    Ok(Json(record))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status: AlertStatus,
    #[serde(default)]
    pub resolution_notes: Option<String>,
}

/// `PUT /emergency/alerts/:id/status` — explicit transition.
pub async fn update_status(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<AlertRecord>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let record = emergency::update_status(
        &conn,
        &caller.account.id,
        &id,
        request.status,
        request.resolution_notes.as_deref(),
        Utc::now(),
    )?;
    tracing::info!(alert_id = %id, status = record.status.as_str(), "Alert status updated");
    Ok(Json(record))
}

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// `PUT /emergency/alerts/:id/cancel` — only while still `Active`.
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<AlertRecord>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let record = emergency::cancel(
        &conn,
        &caller.account.id,
        &id,
        request.reason.as_deref(),
        Utc::now(),
    )?;
    tracing::info!(alert_id = %id, "Alert cancelled");
    Ok(Json(record))
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
    pub nearby_alerts: Vec<NearbyAlert>,
    pub search_radius: f64,
    pub total_active: usize,
}

/// `GET /emergency/nearby` — active alerts around a point, any owner.
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
    let found = emergency::nearby(&conn, center, radius, Utc::now())?;

    Ok(Json(NearbyResponse {
        total_active: found.len(),
        nearby_alerts: found,
        search_radius: radius,
    }))
}

/// `GET /emergency/stats` — aggregate counts for the caller.
pub async fn stats(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AccountContext>,
) -> Result<Json<EmergencyStats>, ApiError> {
    let conn = ctx.state.open_db().map_err(ApiError::from)?;
    let stats = emergency::stats(&conn, &caller.account.id)?;
    Ok(Json(stats))
}
