//! Courier location sample model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::point::GeoPoint;

/// A single GPS sample for a tracked courier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourierLocation {
    /// Coordinates, longitude first.
    pub point: GeoPoint,
    pub timestamp: DateTime<Utc>,
    /// GPS accuracy in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Direction of movement in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Speed in m/s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl CourierLocation {
    pub fn new(point: GeoPoint, timestamp: DateTime<Utc>) -> Self {
        Self {
            point,
            timestamp,
            accuracy: None,
            heading: None,
            speed: None,
        }
    }

    /// Age of the sample relative to `now`, in milliseconds. Zero when the
    /// sample carries a future timestamp (clock skew).
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_milliseconds().max(0)
    }
}

/// Ingress payload for a location update.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateRequest {
    pub courier_id: Uuid,

    /// Coordinates as `[longitude, latitude]`.
    #[validate(custom(function = "validate_coordinates"))]
    pub coordinates: GeoPoint,

    #[validate(custom(function = "shared::validation::validate_accuracy"))]
    pub accuracy: Option<f64>,

    #[validate(custom(function = "shared::validation::validate_heading"))]
    pub heading: Option<f64>,

    #[validate(custom(function = "shared::validation::validate_speed"))]
    pub speed: Option<f64>,
}

impl LocationUpdateRequest {
    /// Stamps the request into a location sample.
    pub fn into_location(self, now: DateTime<Utc>) -> CourierLocation {
        CourierLocation {
            point: self.coordinates,
            timestamp: now,
            accuracy: self.accuracy,
            heading: self.heading,
            speed: self.speed,
        }
    }
}

fn validate_coordinates(point: &GeoPoint) -> Result<(), ValidationError> {
    point.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_ms() {
        let now = Utc::now();
        let sample = CourierLocation::new(GeoPoint::new(0.0, 0.0), now - chrono::Duration::seconds(4));
        let age = sample.age_ms(now);
        assert!((3_900..=4_100).contains(&age));
    }

    #[test]
    fn test_age_ms_future_sample_clamped() {
        let now = Utc::now();
        let sample = CourierLocation::new(GeoPoint::new(0.0, 0.0), now + chrono::Duration::seconds(30));
        assert_eq!(sample.age_ms(now), 0);
    }

    #[test]
    fn test_request_deserialization() {
        let json = r#"{
            "courierId": "550e8400-e29b-41d4-a716-446655440000",
            "coordinates": [-122.4194, 37.7749],
            "accuracy": 10.0,
            "heading": 90.0,
            "speed": 5.5
        }"#;

        let request: LocationUpdateRequest = serde_json::from_str(json).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.coordinates.longitude, -122.4194);
        assert_eq!(request.accuracy, Some(10.0));
    }

    #[test]
    fn test_request_optional_fields_absent() {
        let json = r#"{
            "courierId": "550e8400-e29b-41d4-a716-446655440000",
            "coordinates": [12.0, 55.0]
        }"#;

        let request: LocationUpdateRequest = serde_json::from_str(json).unwrap();
        assert!(request.validate().is_ok());
        assert!(request.accuracy.is_none());
        assert!(request.heading.is_none());
    }

    #[test]
    fn test_request_invalid_longitude() {
        let json = r#"{
            "courierId": "550e8400-e29b-41d4-a716-446655440000",
            "coordinates": [-200.0, 37.7749]
        }"#;

        let request: LocationUpdateRequest = serde_json::from_str(json).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_request_invalid_heading() {
        let json = r#"{
            "courierId": "550e8400-e29b-41d4-a716-446655440000",
            "coordinates": [12.0, 55.0],
            "heading": 400.0
        }"#;

        let request: LocationUpdateRequest = serde_json::from_str(json).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_into_location() {
        let request = LocationUpdateRequest {
            courier_id: Uuid::new_v4(),
            coordinates: GeoPoint::new(12.0, 55.0),
            accuracy: Some(8.0),
            heading: None,
            speed: Some(3.0),
        };

        let now = Utc::now();
        let location = request.into_location(now);
        assert_eq!(location.timestamp, now);
        assert_eq!(location.accuracy, Some(8.0));
        assert_eq!(location.point, GeoPoint::new(12.0, 55.0));
    }
}
