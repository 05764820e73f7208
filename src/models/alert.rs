use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AlertStatus, AlertType, Severity};
use crate::geo::{CoordinateError, GeoPoint};

/// Wire form of a location, as submitted by clients.
/// `coordinates` is the raw GeoJSON-ordered pair and is validated
/// before anything touches storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInput {
    pub coordinates: Vec<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub campus_location: Option<String>,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

impl LocationInput {
    pub fn validate(&self) -> Result<GeoPoint, CoordinateError> {
        GeoPoint::from_pair(&self.coordinates)
    }
}

/// Location fields as echoed back to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationView {
    pub coordinates: [f64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campus_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// Per-channel notification bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelNotification {
    pub sent: bool,
    pub attempts: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationState {
    pub emergency_services: ChannelNotification,
    pub campus_police: ChannelNotification,
    pub primary_contact: ChannelNotification,
    pub secondary_contact: ChannelNotification,
}

impl NotificationState {
    pub fn all_sent(&self) -> bool {
        self.emergency_services.sent
            && self.campus_police.sent
            && self.primary_contact.sent
            && self.secondary_contact.sent
    }
}

/// A persisted emergency alert or beacon session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub profile_id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub status: AlertStatus,
    #[serde(flatten)]
    pub location: StoredLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub symptoms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    pub beacon_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beacon_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beacon_end_time: Option<DateTime<Utc>>,
    pub share_with_campus: bool,
    pub notifications: NotificationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Location columns as stored on an alert row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredLocation {
    pub longitude: f64,
    pub latitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campus_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl StoredLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            longitude: self.longitude,
            latitude: self.latitude,
        }
    }

    pub fn view(&self) -> LocationView {
        LocationView {
            coordinates: [self.longitude, self.latitude],
            address: self.address.clone(),
            campus_location: self.campus_location.clone(),
            building: self.building.clone(),
            room: self.room.clone(),
            accuracy: self.accuracy,
        }
    }
}

impl AlertRecord {
    /// Whole seconds until the beacon end time, floored at zero.
    pub fn time_remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        match self.beacon_end_time {
            Some(end) => {
                let millis = (end - now).num_milliseconds();
                if millis <= 0 {
                    0
                } else {
                    // Ceiling division: a partial second still counts.
                    (millis + 999) / 1000
                }
            }
            None => 0,
        }
    }
}
