use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{fmt_ts, parse_ts};
use crate::db::StoreError;
use crate::models::{
    AlertRecord, AlertStatus, AlertType, ChannelNotification, NotificationState, Severity,
    StoredLocation,
};

/// Resolution note written by the automatic expiry path.
pub const AUTO_EXPIRE_NOTE: &str = "Beacon expired automatically";

const ALERT_COLUMNS: &str = "id, account_id, profile_id, alert_type, severity, status,
    longitude, latitude, address, campus_location, building, room, accuracy,
    description, symptoms, resolution_notes,
    beacon_active, beacon_start_time, beacon_end_time, share_with_campus,
    notified_emergency_services, notified_campus_police,
    notified_primary_contact, notified_secondary_contact,
    attempts_emergency_services, attempts_campus_police,
    attempts_primary_contact, attempts_secondary_contact,
    response_time, resolution_time, created_at, updated_at";

/// Insert a new alert row. A second live beacon for the same account
/// trips the partial unique index; callers map that to a precondition
/// error via `StoreError::is_unique_violation`.
pub fn insert_alert(conn: &Connection, alert: &AlertRecord) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO alerts (id, account_id, profile_id, alert_type, severity, status,
         longitude, latitude, address, campus_location, building, room, accuracy,
         description, symptoms, resolution_notes,
         beacon_active, beacon_start_time, beacon_end_time, share_with_campus,
         notified_emergency_services, notified_campus_police,
         notified_primary_contact, notified_secondary_contact,
         attempts_emergency_services, attempts_campus_police,
         attempts_primary_contact, attempts_secondary_contact,
         response_time, resolution_time, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
                 ?31, ?32)",
        params![
            alert.id.to_string(),
            alert.account_id.to_string(),
            alert.profile_id.to_string(),
            alert.alert_type.as_str(),
            alert.severity.as_str(),
            alert.status.as_str(),
            alert.location.longitude,
            alert.location.latitude,
            alert.location.address,
            alert.location.campus_location,
            alert.location.building,
            alert.location.room,
            alert.location.accuracy,
            alert.description,
            serde_json::to_string(&alert.symptoms).unwrap_or_else(|_| "[]".to_string()),
            alert.resolution_notes,
            alert.beacon_active as i32,
            alert.beacon_start_time.map(fmt_ts),
            alert.beacon_end_time.map(fmt_ts),
            alert.share_with_campus as i32,
            alert.notifications.emergency_services.sent as i32,
            alert.notifications.campus_police.sent as i32,
            alert.notifications.primary_contact.sent as i32,
            alert.notifications.secondary_contact.sent as i32,
            alert.notifications.emergency_services.attempts,
            alert.notifications.campus_police.attempts,
            alert.notifications.primary_contact.attempts,
            alert.notifications.secondary_contact.attempts,
            alert.response_time.map(fmt_ts),
            alert.resolution_time.map(fmt_ts),
            fmt_ts(alert.created_at),
            fmt_ts(alert.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_alert(conn: &Connection, id: &Uuid) -> Result<Option<AlertRecord>, StoreError> {
    query_one(conn, "id = ?1", params![id.to_string()])
}

/// Ownership-checked fetch: returns `None` for another account's alert.
pub fn get_alert_owned(
    conn: &Connection,
    id: &Uuid,
    account_id: &Uuid,
) -> Result<Option<AlertRecord>, StoreError> {
    query_one(
        conn,
        "id = ?1 AND account_id = ?2",
        params![id.to_string(), account_id.to_string()],
    )
}

/// The caller's live beacon, if any.
pub fn active_beacon_for(
    conn: &Connection,
    account_id: &Uuid,
) -> Result<Option<AlertRecord>, StoreError> {
    query_one(
        conn,
        "account_id = ?1 AND status = 'Active' AND beacon_active = 1",
        params![account_id.to_string()],
    )
}

/// All live beacons regardless of owner, for campus-visibility queries.
pub fn active_beacons(conn: &Connection) -> Result<Vec<AlertRecord>, StoreError> {
    query_many(conn, "status = 'Active' AND beacon_active = 1", params![])
}

/// All `Active` alerts regardless of owner.
pub fn active_alerts(conn: &Connection) -> Result<Vec<AlertRecord>, StoreError> {
    query_many(conn, "status = 'Active'", params![])
}

/// Resolve every beacon whose end time has passed. Idempotent and
/// state-checked: a manually resolved or cancelled record no longer
/// matches the predicate, so the sweep can never overwrite it. Runs
/// lazily on every beacon read path and periodically from the sweeper.
pub fn expire_due_beacons(conn: &Connection, now: DateTime<Utc>) -> Result<usize, StoreError> {
    let changed = conn.execute(
        "UPDATE alerts
         SET status = 'Resolved',
             beacon_active = 0,
             resolution_time = beacon_end_time,
             resolution_notes = COALESCE(resolution_notes, ?1),
             updated_at = ?2
         WHERE status = 'Active' AND beacon_active = 1 AND beacon_end_time <= ?2",
        params![AUTO_EXPIRE_NOTE, fmt_ts(now)],
    )?;
    Ok(changed)
}

/// Manually stop the caller's live beacon. Returns `false` when none is
/// active; the no-op case surfaces as not-found upstream.
pub fn deactivate_beacon(
    conn: &Connection,
    account_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE alerts
         SET status = 'Resolved',
             beacon_active = 0,
             beacon_end_time = ?1,
             resolution_time = ?1,
             resolution_notes = COALESCE(resolution_notes, 'Beacon deactivated by user'),
             updated_at = ?1
         WHERE account_id = ?2 AND status = 'Active' AND beacon_active = 1",
        params![fmt_ts(now), account_id.to_string()],
    )?;
    Ok(changed > 0)
}

/// Push the live beacon's end time out by `additional_secs`. The shift is
/// computed inside the UPDATE so expiry sees the new end time with no
/// read-then-write window. Returns the new end time, or `None` when no
/// beacon is active.
pub fn extend_beacon(
    conn: &Connection,
    account_id: &Uuid,
    additional_secs: u32,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let modifier = format!("+{additional_secs} seconds");
    let changed = conn.execute(
        "UPDATE alerts
         SET beacon_end_time = datetime(beacon_end_time, ?1),
             updated_at = ?2
         WHERE account_id = ?3 AND status = 'Active' AND beacon_active = 1",
        params![modifier, fmt_ts(now), account_id.to_string()],
    )?;
    if changed == 0 {
        return Ok(None);
    }

    let end: Option<String> = conn
        .query_row(
            "SELECT beacon_end_time FROM alerts
             WHERE account_id = ?1 AND status = 'Active' AND beacon_active = 1",
            params![account_id.to_string()],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(end.map(|s| parse_ts(&s)))
}

/// Overwrite the location fields on the caller's live beacon.
pub fn update_beacon_location(
    conn: &Connection,
    account_id: &Uuid,
    location: &StoredLocation,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE alerts
         SET longitude = ?1, latitude = ?2, address = ?3, campus_location = ?4,
             building = ?5, room = ?6, accuracy = ?7, updated_at = ?8
         WHERE account_id = ?9 AND status = 'Active' AND beacon_active = 1",
        params![
            location.longitude,
            location.latitude,
            location.address,
            location.campus_location,
            location.building,
            location.room,
            location.accuracy,
            fmt_ts(now),
            account_id.to_string(),
        ],
    )?;
    Ok(changed > 0)
}

/// Conditional status transition. The WHERE clause encodes which source
/// states admit the target, so a lost-update against the sweeper or a
/// double cancel simply matches zero rows.
pub fn transition_alert(
    conn: &Connection,
    id: &Uuid,
    account_id: &Uuid,
    target: AlertStatus,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let changed = match target {
        AlertStatus::Acknowledged => conn.execute(
            "UPDATE alerts SET status = 'Acknowledged', updated_at = ?1
             WHERE id = ?2 AND account_id = ?3 AND status = 'Active'",
            params![fmt_ts(now), id.to_string(), account_id.to_string()],
        )?,
        AlertStatus::Resolved => conn.execute(
            "UPDATE alerts
             SET status = 'Resolved', beacon_active = 0,
                 resolution_time = ?1,
                 resolution_notes = COALESCE(?2, resolution_notes),
                 updated_at = ?1
             WHERE id = ?3 AND account_id = ?4
               AND status IN ('Active', 'Acknowledged')",
            params![fmt_ts(now), notes, id.to_string(), account_id.to_string()],
        )?,
        AlertStatus::Cancelled => conn.execute(
            "UPDATE alerts
             SET status = 'Cancelled', beacon_active = 0,
                 resolution_notes = COALESCE(?1, resolution_notes),
                 updated_at = ?2
             WHERE id = ?3 AND account_id = ?4 AND status = 'Active'",
            params![notes, fmt_ts(now), id.to_string(), account_id.to_string()],
        )?,
        AlertStatus::Active => {
            return Err(StoreError::ConstraintViolation(
                "alerts cannot transition back to Active".to_string(),
            ))
        }
    };
    Ok(changed > 0)
}

/// Mark all four notification channels dispatched and stamp the response
/// time. State-checked: applies once, and only while the alert is still
/// `Active`, so an alert cancelled before the dispatch delay stays untouched.
pub fn mark_dispatched(
    conn: &Connection,
    id: &Uuid,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE alerts
         SET notified_emergency_services = 1,
             notified_campus_police = 1,
             notified_primary_contact = 1,
             notified_secondary_contact = 1,
             attempts_emergency_services = attempts_emergency_services + 1,
             attempts_campus_police = attempts_campus_police + 1,
             attempts_primary_contact = attempts_primary_contact + 1,
             attempts_secondary_contact = attempts_secondary_contact + 1,
             response_time = COALESCE(response_time, ?1),
             updated_at = ?1
         WHERE id = ?2 AND status = 'Active' AND notified_emergency_services = 0",
        params![fmt_ts(now), id.to_string()],
    )?;
    Ok(changed > 0)
}

// ═══════════════════════════════════════════════════════════
// Listing and aggregates
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub alert_type: Option<AlertType>,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug)]
pub struct AlertPage {
    pub items: Vec<AlertRecord>,
    pub total: i64,
}

/// Paginated, newest-first listing of one account's alerts.
pub fn list_alerts(
    conn: &Connection,
    account_id: &Uuid,
    filter: &AlertFilter,
) -> Result<AlertPage, StoreError> {
    let mut predicate = "account_id = ?1".to_string();
    let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(account_id.to_string())];

    if let Some(status) = filter.status {
        args.push(Box::new(status.as_str()));
        predicate.push_str(&format!(" AND status = ?{}", args.len()));
    }
    if let Some(alert_type) = filter.alert_type {
        args.push(Box::new(alert_type.as_str()));
        predicate.push_str(&format!(" AND alert_type = ?{}", args.len()));
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM alerts WHERE {predicate}"),
        rusqlite::params_from_iter(args.iter()),
        |row| row.get(0),
    )?;

    let limit = filter.limit.clamp(1, 100);
    let offset = filter.page.saturating_sub(1) * limit;
    args.push(Box::new(limit as i64));
    let limit_idx = args.len();
    args.push(Box::new(offset as i64));
    let offset_idx = args.len();

    let sql = format!(
        "SELECT {ALERT_COLUMNS} FROM alerts WHERE {predicate}
         ORDER BY created_at DESC, id DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), map_alert_row)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(alert_from_row(row?)?);
    }
    Ok(AlertPage { items, total })
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyStats {
    pub total: i64,
    pub active: i64,
    pub by_type: BTreeMap<String, i64>,
    pub by_severity: BTreeMap<String, i64>,
    /// Mean seconds between creation and the response-time stamp.
    pub avg_response_secs: Option<f64>,
}

pub fn emergency_stats(
    conn: &Connection,
    account_id: &Uuid,
) -> Result<EmergencyStats, StoreError> {
    let account = account_id.to_string();

    let (total, active): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(status = 'Active'), 0)
         FROM alerts WHERE account_id = ?1",
        params![account],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let by_type = grouped_counts(conn, &account, "alert_type")?;
    let by_severity = grouped_counts(conn, &account, "severity")?;

    let avg_response_secs: Option<f64> = conn.query_row(
        "SELECT AVG(strftime('%s', response_time) - strftime('%s', created_at))
         FROM alerts WHERE account_id = ?1 AND response_time IS NOT NULL",
        params![account],
        |row| row.get(0),
    )?;

    Ok(EmergencyStats {
        total,
        active,
        by_type,
        by_severity,
        avg_response_secs,
    })
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconStats {
    pub total_sessions: i64,
    pub active_now: bool,
    /// Mean seconds between beacon start and end over finished sessions.
    pub avg_duration_secs: Option<f64>,
}

pub fn beacon_stats(conn: &Connection, account_id: &Uuid) -> Result<BeaconStats, StoreError> {
    let account = account_id.to_string();

    let (total_sessions, active_count): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(beacon_active = 1 AND status = 'Active'), 0)
         FROM alerts WHERE account_id = ?1 AND alert_type = 'Beacon Activation'",
        params![account],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let avg_duration_secs: Option<f64> = conn.query_row(
        "SELECT AVG(strftime('%s', beacon_end_time) - strftime('%s', beacon_start_time))
         FROM alerts
         WHERE account_id = ?1 AND alert_type = 'Beacon Activation'
           AND status != 'Active'
           AND beacon_start_time IS NOT NULL AND beacon_end_time IS NOT NULL",
        params![account],
        |row| row.get(0),
    )?;

    Ok(BeaconStats {
        total_sessions,
        active_now: active_count > 0,
        avg_duration_secs,
    })
}

fn grouped_counts(
    conn: &Connection,
    account: &str,
    column: &str,
) -> Result<BTreeMap<String, i64>, StoreError> {
    let sql = format!(
        "SELECT {column}, COUNT(*) FROM alerts WHERE account_id = ?1 GROUP BY {column}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![account], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut counts = BTreeMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}

// ═══════════════════════════════════════════════════════════
// Row mapping
// ═══════════════════════════════════════════════════════════

struct AlertRow {
    id: String,
    account_id: String,
    profile_id: String,
    alert_type: String,
    severity: String,
    status: String,
    longitude: f64,
    latitude: f64,
    address: Option<String>,
    campus_location: Option<String>,
    building: Option<String>,
    room: Option<String>,
    accuracy: Option<f64>,
    description: Option<String>,
    symptoms: String,
    resolution_notes: Option<String>,
    beacon_active: i32,
    beacon_start_time: Option<String>,
    beacon_end_time: Option<String>,
    share_with_campus: i32,
    notified: [i32; 4],
    attempts: [i64; 4],
    response_time: Option<String>,
    resolution_time: Option<String>,
    created_at: String,
    updated_at: String,
}

fn map_alert_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertRow> {
    Ok(AlertRow {
        id: row.get(0)?,
        account_id: row.get(1)?,
        profile_id: row.get(2)?,
        alert_type: row.get(3)?,
        severity: row.get(4)?,
        status: row.get(5)?,
        longitude: row.get(6)?,
        latitude: row.get(7)?,
        address: row.get(8)?,
        campus_location: row.get(9)?,
        building: row.get(10)?,
        room: row.get(11)?,
        accuracy: row.get(12)?,
        description: row.get(13)?,
        symptoms: row.get(14)?,
        resolution_notes: row.get(15)?,
        beacon_active: row.get(16)?,
        beacon_start_time: row.get(17)?,
        beacon_end_time: row.get(18)?,
        share_with_campus: row.get(19)?,
        notified: [row.get(20)?, row.get(21)?, row.get(22)?, row.get(23)?],
        attempts: [row.get(24)?, row.get(25)?, row.get(26)?, row.get(27)?],
        response_time: row.get(28)?,
        resolution_time: row.get(29)?,
        created_at: row.get(30)?,
        updated_at: row.get(31)?,
    })
}

fn alert_from_row(row: AlertRow) -> Result<AlertRecord, StoreError> {
    let parse_uuid = |s: &str| {
        Uuid::parse_str(s).map_err(|e| StoreError::ConstraintViolation(e.to_string()))
    };
    let channel = |idx: usize| ChannelNotification {
        sent: row.notified[idx] != 0,
        attempts: row.attempts[idx],
    };

    Ok(AlertRecord {
        id: parse_uuid(&row.id)?,
        account_id: parse_uuid(&row.account_id)?,
        profile_id: parse_uuid(&row.profile_id)?,
        alert_type: AlertType::from_str(&row.alert_type)?,
        severity: Severity::from_str(&row.severity)?,
        status: AlertStatus::from_str(&row.status)?,
        location: StoredLocation {
            longitude: row.longitude,
            latitude: row.latitude,
            address: row.address,
            campus_location: row.campus_location,
            building: row.building,
            room: row.room,
            accuracy: row.accuracy,
        },
        description: row.description,
        symptoms: serde_json::from_str(&row.symptoms).unwrap_or_default(),
        resolution_notes: row.resolution_notes,
        beacon_active: row.beacon_active != 0,
        beacon_start_time: row.beacon_start_time.as_deref().map(parse_ts),
        beacon_end_time: row.beacon_end_time.as_deref().map(parse_ts),
        share_with_campus: row.share_with_campus != 0,
        notifications: NotificationState {
            emergency_services: channel(0),
            campus_police: channel(1),
            primary_contact: channel(2),
            secondary_contact: channel(3),
        },
        response_time: row.response_time.as_deref().map(parse_ts),
        resolution_time: row.resolution_time.as_deref().map(parse_ts),
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    })
}

fn query_one(
    conn: &Connection,
    predicate: &str,
    args: impl rusqlite::Params,
) -> Result<Option<AlertRecord>, StoreError> {
    let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE {predicate} LIMIT 1");
    let mut stmt = conn.prepare(&sql)?;
    let result = stmt.query_row(args, map_alert_row);
    match result {
        Ok(row) => Ok(Some(alert_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn query_many(
    conn: &Connection,
    predicate: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<AlertRecord>, StoreError> {
    let sql = format!(
        "SELECT {ALERT_COLUMNS} FROM alerts WHERE {predicate} ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, map_alert_row)?;
    let mut items = Vec::new();
    for row in rows {
        items.push(alert_from_row(row?)?);
    }
    Ok(items)
}
