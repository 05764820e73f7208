//! Emergency (SOS) controller.
//!
//! Creates high-severity alert records and walks them through
//! `Active → {Acknowledged, Resolved, Cancelled}`. Downstream paging is
//! simulated: a deferred task marks the notification channels sent after
//! a fixed delay. All transitions are single conditional updates, so a
//! cancel racing the dispatch task (or the expiry sweeper) loses nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::{self, AlertFilter, AlertPage, EmergencyStats};
use crate::db::StoreError;
use crate::geo::{CoordinateError, GeoPoint};
use crate::models::{
    AlertRecord, AlertStatus, AlertType, LocationInput, NotificationState, Severity,
    StoredLocation,
};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum EmergencyError {
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(#[from] CoordinateError),
    #[error("alert not found")]
    NotFound,
    #[error("alert is not in a state that allows this transition")]
    InvalidTransition,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct SosInput {
    pub location: LocationInput,
    pub description: Option<String>,
    pub symptoms: Vec<String>,
    pub severity: Option<Severity>,
}

/// Create an SOS alert. Severity defaults to High.
pub fn create_sos(
    conn: &Connection,
    account_id: &Uuid,
    profile_id: &Uuid,
    input: &SosInput,
    now: DateTime<Utc>,
) -> Result<AlertRecord, EmergencyError> {
    let point = input.location.validate()?;

    let record = AlertRecord {
        id: Uuid::new_v4(),
        account_id: *account_id,
        profile_id: *profile_id,
        alert_type: AlertType::Sos,
        severity: input.severity.unwrap_or(Severity::High),
        status: AlertStatus::Active,
        location: StoredLocation {
            longitude: point.longitude,
            latitude: point.latitude,
            address: input.location.address.clone(),
            campus_location: input.location.campus_location.clone(),
            building: input.location.building.clone(),
            room: input.location.room.clone(),
            accuracy: input.location.accuracy,
        },
        description: input.description.clone(),
        symptoms: input.symptoms.clone(),
        resolution_notes: None,
        beacon_active: false,
        beacon_start_time: None,
        beacon_end_time: None,
        share_with_campus: false,
        notifications: NotificationState::default(),
        response_time: None,
        resolution_time: None,
        created_at: now,
        updated_at: now,
    };

    repository::insert_alert(conn, &record)?;
    Ok(record)
}

/// Fire the simulated notification dispatch for a fresh alert.
///
/// Stands in for real paging/SMS integration: after `delay_secs` it marks
/// all four channels sent and stamps the response time — but only if the
/// alert is still `Active` and undispatched (the write is conditional).
/// Failures land in the log at error level; there is no client to tell.
pub fn spawn_dispatch(state: Arc<AppState>, alert_id: Uuid, delay_secs: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;

        let result = state
            .open_db()
            .and_then(|conn| repository::mark_dispatched(&conn, &alert_id, Utc::now()));
        match result {
            Ok(true) => {
                tracing::info!(%alert_id, "Simulated notification dispatch completed")
            }
            Ok(false) => {
                tracing::info!(%alert_id, "Dispatch skipped: alert no longer active")
            }
            Err(e) => {
                tracing::error!(%alert_id, error = %e, "Simulated dispatch failed")
            }
        }
    });
}

/// Explicit status transition on an owned alert.
pub fn update_status(
    conn: &Connection,
    account_id: &Uuid,
    alert_id: &Uuid,
    target: AlertStatus,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AlertRecord, EmergencyError> {
    if target == AlertStatus::Active {
        return Err(EmergencyError::InvalidTransition);
    }

    if repository::transition_alert(conn, alert_id, account_id, target, notes, now)? {
        repository::get_alert_owned(conn, alert_id, account_id)?
            .ok_or(EmergencyError::NotFound)
    } else {
        // Zero rows: either the alert is not the caller's, or its current
        // state does not admit the transition.
        match repository::get_alert_owned(conn, alert_id, account_id)? {
            Some(_) => Err(EmergencyError::InvalidTransition),
            None => Err(EmergencyError::NotFound),
        }
    }
}

/// Cancel an `Active` alert. A second cancel is an error, not a no-op.
pub fn cancel(
    conn: &Connection,
    account_id: &Uuid,
    alert_id: &Uuid,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AlertRecord, EmergencyError> {
    update_status(conn, account_id, alert_id, AlertStatus::Cancelled, reason, now)
}

pub fn list(
    conn: &Connection,
    account_id: &Uuid,
    filter: &AlertFilter,
) -> Result<AlertPage, EmergencyError> {
    Ok(repository::list_alerts(conn, account_id, filter)?)
}

/// Ownership-checked single fetch.
pub fn get(
    conn: &Connection,
    account_id: &Uuid,
    alert_id: &Uuid,
) -> Result<AlertRecord, EmergencyError> {
    repository::get_alert_owned(conn, alert_id, account_id)?.ok_or(EmergencyError::NotFound)
}

/// An active alert visible to a nearby-query caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyAlert {
    pub alert_id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub coordinates: [f64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campus_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    pub distance_meters: f64,
    pub created_at: DateTime<Utc>,
}

/// Active alerts within `radius_m` of `center`, any owner, nearest first.
/// Due beacons are resolved first so they never show up as active here.
pub fn nearby(
    conn: &Connection,
    center: GeoPoint,
    radius_m: f64,
    now: DateTime<Utc>,
) -> Result<Vec<NearbyAlert>, EmergencyError> {
    repository::expire_due_beacons(conn, now)?;
    let mut found: Vec<NearbyAlert> = repository::active_alerts(conn)?
        .into_iter()
        .filter_map(|record| {
            let distance = center.distance_meters(&record.location.point());
            (distance <= radius_m).then(|| NearbyAlert {
                alert_id: record.id,
                alert_type: record.alert_type,
                severity: record.severity,
                coordinates: [record.location.longitude, record.location.latitude],
                campus_location: record.location.campus_location.clone(),
                building: record.location.building.clone(),
                distance_meters: distance,
                created_at: record.created_at,
            })
        })
        .collect();
    found.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
    Ok(found)
}

pub fn stats(conn: &Connection, account_id: &Uuid) -> Result<EmergencyStats, EmergencyError> {
    Ok(repository::emergency_stats(conn, account_id)?)
}
