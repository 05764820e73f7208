//! Beacon lifecycle controller.
//!
//! A beacon is a time-bounded location broadcast: one live session per
//! account, resolved automatically when its end time passes or earlier by
//! a manual stop. Expiry is a conditional update evaluated against
//! `beacon_end_time`, applied lazily on every read path and periodically
//! by [`start_expiry_sweeper`], so it survives process restarts and can
//! never overwrite a manual resolution.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::db::repository::{self, AlertFilter, AlertPage, BeaconStats};
use crate::db::StoreError;
use crate::geo::{CoordinateError, GeoPoint};
use crate::models::{
    AlertRecord, AlertStatus, AlertType, LocationInput, LocationView, NotificationState,
    Severity, StoredLocation,
};
use crate::state::AppState;

/// Duration knobs, taken from `AppConfig` at startup.
#[derive(Debug, Clone, Copy)]
pub struct BeaconPolicy {
    pub default_secs: u32,
    pub max_secs: u32,
    pub extend_secs: u32,
}

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(#[from] CoordinateError),
    #[error("duration must be between 1 and {max} seconds")]
    InvalidDuration { max: u32 },
    #[error("a beacon is already active for this account")]
    AlreadyActive,
    #[error("no active beacon for this account")]
    NoActiveBeacon,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ActivationInput {
    pub location: LocationInput,
    pub duration_secs: Option<u32>,
    pub description: Option<String>,
    pub share_with_campus: bool,
}

/// Start a beacon session. The one-active-beacon rule is enforced by the
/// partial unique index, so two concurrent activations cannot both land.
pub fn activate(
    conn: &Connection,
    account_id: &Uuid,
    profile_id: &Uuid,
    input: &ActivationInput,
    policy: &BeaconPolicy,
    now: DateTime<Utc>,
) -> Result<AlertRecord, BeaconError> {
    let point = input.location.validate()?;

    let duration = input.duration_secs.unwrap_or(policy.default_secs);
    if duration == 0 || duration > policy.max_secs {
        return Err(BeaconError::InvalidDuration { max: policy.max_secs });
    }

    // An overdue session left by a dead process must not block the slot.
    repository::expire_due_beacons(conn, now)?;

    let record = AlertRecord {
        id: Uuid::new_v4(),
        account_id: *account_id,
        profile_id: *profile_id,
        alert_type: AlertType::BeaconActivation,
        severity: Severity::Medium,
        status: AlertStatus::Active,
        location: stored_location(&input.location, point),
        description: input.description.clone(),
        symptoms: vec![],
        resolution_notes: None,
        beacon_active: true,
        beacon_start_time: Some(now),
        beacon_end_time: Some(now + Duration::seconds(i64::from(duration))),
        share_with_campus: input.share_with_campus,
        notifications: NotificationState::default(),
        response_time: None,
        resolution_time: None,
        created_at: now,
        updated_at: now,
    };

    match repository::insert_alert(conn, &record) {
        Ok(()) => Ok(record),
        Err(e) if e.is_unique_violation() => Err(BeaconError::AlreadyActive),
        Err(e) => Err(e.into()),
    }
}

/// Manually stop the caller's beacon. Returns the deactivation time.
pub fn deactivate(
    conn: &Connection,
    account_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, BeaconError> {
    repository::expire_due_beacons(conn, now)?;
    if repository::deactivate_beacon(conn, account_id, now)? {
        Ok(now)
    } else {
        Err(BeaconError::NoActiveBeacon)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconStatusView {
    pub beacon_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Current beacon state for the caller; a quiet answer when none is live.
pub fn status(
    conn: &Connection,
    account_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<BeaconStatusView, BeaconError> {
    repository::expire_due_beacons(conn, now)?;
    match repository::active_beacon_for(conn, account_id)? {
        Some(record) => Ok(BeaconStatusView {
            beacon_active: true,
            alert_id: Some(record.id),
            location: Some(record.location.view()),
            time_remaining: Some(record.time_remaining_secs(now)),
            expires_at: record.beacon_end_time,
            description: record.description.clone(),
        }),
        None => Ok(BeaconStatusView {
            beacon_active: false,
            alert_id: None,
            location: None,
            time_remaining: None,
            expires_at: None,
            description: None,
        }),
    }
}

/// Add time to the live beacon. Returns the new end time.
pub fn extend(
    conn: &Connection,
    account_id: &Uuid,
    additional_secs: Option<u32>,
    policy: &BeaconPolicy,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, BeaconError> {
    let additional = additional_secs.unwrap_or(policy.extend_secs);
    if additional == 0 || additional > policy.max_secs {
        return Err(BeaconError::InvalidDuration { max: policy.max_secs });
    }

    repository::expire_due_beacons(conn, now)?;
    repository::extend_beacon(conn, account_id, additional, now)?
        .ok_or(BeaconError::NoActiveBeacon)
}

/// Move the live beacon. Returns the stored location echo.
pub fn update_location(
    conn: &Connection,
    account_id: &Uuid,
    location: &LocationInput,
    now: DateTime<Utc>,
) -> Result<LocationView, BeaconError> {
    let point = location.validate()?;
    let stored = stored_location(location, point);

    repository::expire_due_beacons(conn, now)?;
    if repository::update_beacon_location(conn, account_id, &stored, now)? {
        Ok(stored.view())
    } else {
        Err(BeaconError::NoActiveBeacon)
    }
}

/// A live beacon visible to a nearby-query caller. Free-text description
/// is withheld; responders fetch the full record through their own surface.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyBeacon {
    pub alert_id: Uuid,
    pub coordinates: [f64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campus_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    pub distance_meters: f64,
    pub beacon_start_time: Option<DateTime<Utc>>,
    pub share_with_campus: bool,
}

/// Live beacons within `radius_m` of `center`, any owner, nearest first.
pub fn nearby(
    conn: &Connection,
    center: GeoPoint,
    radius_m: f64,
    now: DateTime<Utc>,
) -> Result<Vec<NearbyBeacon>, BeaconError> {
    repository::expire_due_beacons(conn, now)?;

    let mut found: Vec<NearbyBeacon> = repository::active_beacons(conn)?
        .into_iter()
        .filter_map(|record| {
            let distance = center.distance_meters(&record.location.point());
            (distance <= radius_m).then(|| NearbyBeacon {
                alert_id: record.id,
                coordinates: [record.location.longitude, record.location.latitude],
                campus_location: record.location.campus_location.clone(),
                building: record.location.building.clone(),
                distance_meters: distance,
                beacon_start_time: record.beacon_start_time,
                share_with_campus: record.share_with_campus,
            })
        })
        .collect();
    found.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
    Ok(found)
}

/// Paginated history of the caller's beacon sessions.
pub fn history(
    conn: &Connection,
    account_id: &Uuid,
    page: u32,
    limit: u32,
    now: DateTime<Utc>,
) -> Result<AlertPage, BeaconError> {
    repository::expire_due_beacons(conn, now)?;
    let filter = AlertFilter {
        alert_type: Some(AlertType::BeaconActivation),
        status: None,
        page,
        limit,
    };
    Ok(repository::list_alerts(conn, account_id, &filter)?)
}

pub fn stats(
    conn: &Connection,
    account_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<BeaconStats, BeaconError> {
    repository::expire_due_beacons(conn, now)?;
    Ok(repository::beacon_stats(conn, account_id)?)
}

fn stored_location(input: &LocationInput, point: GeoPoint) -> StoredLocation {
    StoredLocation {
        longitude: point.longitude,
        latitude: point.latitude,
        address: input.address.clone(),
        campus_location: input.campus_location.clone(),
        building: input.building.clone(),
        room: input.room.clone(),
        accuracy: input.accuracy,
    }
}

// ═══════════════════════════════════════════════════════════
// Expiry sweeper
// ═══════════════════════════════════════════════════════════

/// Handle to the running expiry sweeper. Shutdown is graceful; dropping
/// the handle without calling `shutdown` leaves the task to die with the
/// runtime.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl SweeperHandle {
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Expiry sweeper shutdown signal sent");
        }
    }
}

/// Start the periodic expiry sweep in a background tokio task.
///
/// The sweep is belt-and-braces on top of lazy expiry: it resolves due
/// beacons that nobody is reading, so history and nearby views stay
/// truthful even on an idle instance.
pub fn start_expiry_sweeper(state: Arc<AppState>) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let interval_secs = state.config.sweep_interval_secs;

    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        tracing::info!(interval_secs, "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::info!("Expiry sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    sweep_once(&state);
                }
            }
        }
    });

    SweeperHandle {
        shutdown_tx: Some(shutdown_tx),
    }
}

fn sweep_once(state: &AppState) {
    let result = state
        .open_db()
        .and_then(|conn| repository::expire_due_beacons(&conn, Utc::now()));
    match result {
        Ok(0) => {}
        Ok(expired) => tracing::info!(expired, "Expiry sweep resolved due beacons"),
        // Surfaced, not swallowed: a failing sweep means beacons outlive
        // their end time until the next lazy read.
        Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{get_alert, insert_account, insert_profile};
    use crate::db::sqlite::open_memory_database;
    use crate::models::{Account, HealthProfile};

    const POLICY: BeaconPolicy = BeaconPolicy {
        default_secs: 300,
        max_secs: 14400,
        extend_secs: 300,
    };

    fn seed(conn: &Connection) -> (Uuid, Uuid) {
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: format!("{}@campus.edu", Uuid::new_v4()),
            password_hash: "$pbkdf2-sha256$stub".to_string(),
            display_name: "Sam Student".to_string(),
            is_active: true,
            is_verified: true,
            created_at: now,
            updated_at: now,
        };
        insert_account(conn, &account).unwrap();
        let profile = HealthProfile {
            id: Uuid::new_v4(),
            account_id: account.id,
            blood_type: None,
            allergies: vec![],
            medications: vec![],
            conditions: vec![],
            primary_contact: None,
            secondary_contact: None,
            residence_building: None,
            residence_room: None,
            created_at: now,
            updated_at: now,
        };
        insert_profile(conn, &profile).unwrap();
        (account.id, profile.id)
    }

    fn input_at(longitude: f64, latitude: f64) -> ActivationInput {
        ActivationInput {
            location: LocationInput {
                coordinates: vec![longitude, latitude],
                address: None,
                campus_location: None,
                building: None,
                room: None,
                accuracy: None,
            },
            duration_secs: None,
            description: None,
            share_with_campus: false,
        }
    }

    #[test]
    fn activate_defaults_duration_and_reports_remaining() {
        let conn = open_memory_database().unwrap();
        let (account_id, profile_id) = seed(&conn);
        let now = Utc::now();

        let record =
            activate(&conn, &account_id, &profile_id, &input_at(-86.92, 40.43), &POLICY, now)
                .unwrap();
        assert!(record.beacon_active);
        assert_eq!(record.status, AlertStatus::Active);

        let view = status(&conn, &account_id, now).unwrap();
        assert!(view.beacon_active);
        assert_eq!(view.alert_id, Some(record.id));
        let remaining = view.time_remaining.unwrap();
        assert!((295..=300).contains(&remaining), "got {remaining}");
    }

    #[test]
    fn malformed_coordinates_are_rejected() {
        let conn = open_memory_database().unwrap();
        let (account_id, profile_id) = seed(&conn);
        let now = Utc::now();

        let mut input = input_at(-86.92, 40.43);
        input.location.coordinates = vec![-86.92];
        let err = activate(&conn, &account_id, &profile_id, &input, &POLICY, now).unwrap_err();
        assert!(matches!(err, BeaconError::InvalidCoordinates(_)));
    }

    #[test]
    fn duration_over_cap_is_rejected() {
        let conn = open_memory_database().unwrap();
        let (account_id, profile_id) = seed(&conn);
        let now = Utc::now();

        let mut input = input_at(-86.92, 40.43);
        input.duration_secs = Some(POLICY.max_secs + 1);
        let err = activate(&conn, &account_id, &profile_id, &input, &POLICY, now).unwrap_err();
        assert!(matches!(err, BeaconError::InvalidDuration { .. }));
    }

    #[test]
    fn second_activation_fails_while_first_is_live() {
        let conn = open_memory_database().unwrap();
        let (account_id, profile_id) = seed(&conn);
        let now = Utc::now();

        activate(&conn, &account_id, &profile_id, &input_at(-86.92, 40.43), &POLICY, now)
            .unwrap();
        let err = activate(&conn, &account_id, &profile_id, &input_at(-86.92, 40.43), &POLICY, now)
            .unwrap_err();
        assert!(matches!(err, BeaconError::AlreadyActive));
    }

    #[test]
    fn expired_beacon_does_not_block_reactivation() {
        let conn = open_memory_database().unwrap();
        let (account_id, profile_id) = seed(&conn);
        let now = Utc::now();

        let mut input = input_at(-86.92, 40.43);
        input.duration_secs = Some(60);
        activate(&conn, &account_id, &profile_id, &input, &POLICY, now).unwrap();

        // Past the end time, a new activation resolves the stale session.
        let later = now + Duration::seconds(120);
        let second =
            activate(&conn, &account_id, &profile_id, &input, &POLICY, later).unwrap();
        assert!(second.beacon_active);
    }

    #[test]
    fn status_with_no_beacon_is_quiet() {
        let conn = open_memory_database().unwrap();
        let (account_id, _) = seed(&conn);

        let view = status(&conn, &account_id, Utc::now()).unwrap();
        assert!(!view.beacon_active);
        assert!(view.alert_id.is_none());
        assert!(view.time_remaining.is_none());
    }

    #[test]
    fn status_resolves_expired_sessions_lazily() {
        let conn = open_memory_database().unwrap();
        let (account_id, profile_id) = seed(&conn);
        let now = Utc::now();

        let mut input = input_at(-86.92, 40.43);
        input.duration_secs = Some(60);
        let record = activate(&conn, &account_id, &profile_id, &input, &POLICY, now).unwrap();

        let view = status(&conn, &account_id, now + Duration::seconds(90)).unwrap();
        assert!(!view.beacon_active);

        let stored = get_alert(&conn, &record.id).unwrap().unwrap();
        assert_eq!(stored.status, AlertStatus::Resolved);
        assert!(!stored.beacon_active);
    }

    #[test]
    fn deactivate_then_deactivate_again_errors() {
        let conn = open_memory_database().unwrap();
        let (account_id, profile_id) = seed(&conn);
        let now = Utc::now();

        activate(&conn, &account_id, &profile_id, &input_at(-86.92, 40.43), &POLICY, now)
            .unwrap();
        deactivate(&conn, &account_id, now).unwrap();
        let err = deactivate(&conn, &account_id, now).unwrap_err();
        assert!(matches!(err, BeaconError::NoActiveBeacon));
    }

    #[test]
    fn extend_moves_expiry_and_keeps_beacon_live() {
        let conn = open_memory_database().unwrap();
        let (account_id, profile_id) = seed(&conn);
        let now = Utc::now();

        let mut input = input_at(-86.92, 40.43);
        input.duration_secs = Some(60);
        activate(&conn, &account_id, &profile_id, &input, &POLICY, now).unwrap();

        let new_end = extend(&conn, &account_id, Some(120), &POLICY, now).unwrap();

        // At 90s the original duration is gone but the extension holds.
        let view = status(&conn, &account_id, now + Duration::seconds(90)).unwrap();
        assert!(view.beacon_active);
        assert_eq!(view.expires_at, Some(new_end));

        // Past the extended end it resolves.
        let view = status(&conn, &account_id, now + Duration::seconds(200)).unwrap();
        assert!(!view.beacon_active);
    }

    #[test]
    fn extend_without_beacon_errors() {
        let conn = open_memory_database().unwrap();
        let (account_id, _) = seed(&conn);
        let err = extend(&conn, &account_id, None, &POLICY, Utc::now()).unwrap_err();
        assert!(matches!(err, BeaconError::NoActiveBeacon));
    }

    #[test]
    fn location_update_requires_live_beacon() {
        let conn = open_memory_database().unwrap();
        let (account_id, profile_id) = seed(&conn);
        let now = Utc::now();

        let moved = LocationInput {
            coordinates: vec![-86.91, 40.43],
            address: None,
            campus_location: Some("Recreation Center".to_string()),
            building: None,
            room: None,
            accuracy: None,
        };
        let err = update_location(&conn, &account_id, &moved, now).unwrap_err();
        assert!(matches!(err, BeaconError::NoActiveBeacon));

        activate(&conn, &account_id, &profile_id, &input_at(-86.92, 40.43), &POLICY, now)
            .unwrap();
        let view = update_location(&conn, &account_id, &moved, now).unwrap();
        assert_eq!(view.coordinates, [-86.91, 40.43]);
        assert_eq!(view.campus_location.as_deref(), Some("Recreation Center"));
    }

    #[test]
    fn nearby_filters_by_radius_and_returns_other_owners() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();

        let (a1, p1) = seed(&conn);
        let (a2, p2) = seed(&conn);
        let (a3, p3) = seed(&conn);

        // Two on campus, one across town.
        activate(&conn, &a1, &p1, &input_at(-86.9212, 40.4284), &POLICY, now).unwrap();
        activate(&conn, &a2, &p2, &input_at(-86.9190, 40.4290), &POLICY, now).unwrap();
        activate(&conn, &a3, &p3, &input_at(-86.8500, 40.3900), &POLICY, now).unwrap();

        let center = GeoPoint::new(-86.9212, 40.4284).unwrap();
        let found = nearby(&conn, center, 2000.0, now).unwrap();
        assert_eq!(found.len(), 2);
        // Nearest first.
        assert!(found[0].distance_meters <= found[1].distance_meters);
        // Description is never exposed on the nearby surface.
        let json = serde_json::to_value(&found[0]).unwrap();
        assert!(json.get("description").is_none());
    }

    #[test]
    fn nearby_excludes_resolved_sessions() {
        let conn = open_memory_database().unwrap();
        let now = Utc::now();

        let (a1, p1) = seed(&conn);
        activate(&conn, &a1, &p1, &input_at(-86.9212, 40.4284), &POLICY, now).unwrap();
        deactivate(&conn, &a1, now).unwrap();

        let center = GeoPoint::new(-86.9212, 40.4284).unwrap();
        assert!(nearby(&conn, center, 2000.0, now).unwrap().is_empty());
    }

    #[test]
    fn history_lists_only_beacon_sessions() {
        let conn = open_memory_database().unwrap();
        let (account_id, profile_id) = seed(&conn);
        let now = Utc::now();

        activate(&conn, &account_id, &profile_id, &input_at(-86.92, 40.43), &POLICY, now)
            .unwrap();
        deactivate(&conn, &account_id, now).unwrap();
        activate(&conn, &account_id, &profile_id, &input_at(-86.92, 40.43), &POLICY, now)
            .unwrap();

        let page = history(&conn, &account_id, 1, 10, now).unwrap();
        assert_eq!(page.total, 2);
        assert!(page
            .items
            .iter()
            .all(|r| r.alert_type == AlertType::BeaconActivation));

        let stats = stats(&conn, &account_id, now).unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert!(stats.active_now);
    }
}
