//! Geodesic helpers for nearby queries.
//!
//! Alert rows carry a WGS84 coordinate pair. Radius searches pull the
//! active candidates and filter on great-circle distance here rather
//! than pushing trigonometry into SQLite.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A validated WGS84 point, longitude first (GeoJSON order).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("coordinates must be a [longitude, latitude] pair, got {0} element(s)")]
    WrongArity(usize),
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("coordinates must be finite numbers")]
    NotFinite,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, CoordinateError> {
        if !longitude.is_finite() || !latitude.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        Ok(Self { longitude, latitude })
    }

    /// Validate a raw wire-form coordinate array. Absence of exactly two
    /// elements is a validation failure, not a default.
    pub fn from_pair(pair: &[f64]) -> Result<Self, CoordinateError> {
        if pair.len() != 2 {
            return Err(CoordinateError::WrongArity(pair.len()));
        }
        Self::new(pair[0], pair[1])
    }

    /// Great-circle distance to another point, in meters (haversine).
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_M * c
    }
}
