//! Geofence domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::point::GeoPoint;

/// Minimum number of vertices in a polygon ring.
const MIN_POLYGON_VERTICES: usize = 3;

/// Geofence geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeofenceShape {
    /// Circular region: center point plus radius in meters.
    Circle {
        center: GeoPoint,
        radius_meters: f64,
    },
    /// Polygonal region: ordered ring of at least three vertices.
    Polygon { ring: Vec<GeoPoint> },
}

impl GeofenceShape {
    /// Returns the shape discriminant as stored/reported.
    pub fn kind(&self) -> &'static str {
        match self {
            GeofenceShape::Circle { .. } => "circle",
            GeofenceShape::Polygon { .. } => "polygon",
        }
    }

    /// Center point for circular shapes.
    pub fn center(&self) -> Option<GeoPoint> {
        match self {
            GeofenceShape::Circle { center, .. } => Some(*center),
            GeofenceShape::Polygon { .. } => None,
        }
    }

    /// Checks geometry invariants: valid coordinates, positive radius,
    /// at least three polygon vertices.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            GeofenceShape::Circle {
                center,
                radius_meters,
            } => {
                center.validate()?;
                shared::validation::validate_radius(*radius_meters)?;
            }
            GeofenceShape::Polygon { ring } => {
                if ring.len() < MIN_POLYGON_VERTICES {
                    let mut err = ValidationError::new("polygon_ring");
                    err.message = Some("Polygon ring must have at least 3 vertices".into());
                    return Err(err);
                }
                for vertex in ring {
                    vertex.validate()?;
                }
            }
        }
        Ok(())
    }
}

/// Delivery channel for triggered notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    #[default]
    Push,
    Sms,
    Email,
    InApp,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Sms => "sms",
            Self::Email => "email",
            Self::InApp => "in_app",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "push" => Some(Self::Push),
            "sms" => Some(Self::Sms),
            "email" => Some(Self::Email),
            "in_app" => Some(Self::InApp),
            _ => None,
        }
    }
}

/// Notification template attached to one side of a transition.
///
/// Missing title/message fall back to texts rendered from the geofence name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub channel: NotificationChannel,
}

/// Enter/exit trigger templates for a geofence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceTriggers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_enter: Option<TriggerTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_exit: Option<TriggerTemplate>,
}

/// Role a geofence plays for its order. Milestone derivation keys off this
/// linkage, not the display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceRole {
    /// Pickup / store proximity region.
    Origin,
    /// Dropoff / customer proximity region.
    Destination,
}

impl GeofenceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Destination => "destination",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "origin" => Some(Self::Origin),
            "destination" => Some(Self::Destination),
            _ => None,
        }
    }
}

/// Links a geofence to the domain objects it was created for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<GeofenceRole>,
}

/// Represents a geofence in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub shape: GeofenceShape,
    pub active: bool,
    pub priority: i32,
    #[serde(default)]
    pub triggers: GeofenceTriggers,
    #[serde(default)]
    pub metadata: GeofenceMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Geofence {
    /// Role of this geofence for its bound order, if any.
    pub fn role(&self) -> Option<GeofenceRole> {
        self.metadata.role
    }
}

/// Default priority for new geofences.
fn default_priority() -> i32 {
    1
}

/// Default active status for new geofences.
fn default_active() -> bool {
    true
}

/// Request payload for creating a geofence.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGeofenceRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    pub description: Option<String>,

    #[validate(custom(function = "validate_shape"))]
    pub shape: GeofenceShape,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default = "default_priority")]
    #[validate(custom(function = "shared::validation::validate_priority"))]
    pub priority: i32,

    #[serde(default)]
    pub triggers: GeofenceTriggers,

    #[serde(default)]
    pub metadata: GeofenceMetadata,
}

impl CreateGeofenceRequest {
    /// Materializes the request into a geofence with a fresh identity.
    pub fn into_geofence(self, now: DateTime<Utc>) -> Geofence {
        Geofence {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            shape: self.shape,
            active: self.active,
            priority: self.priority,
            triggers: self.triggers,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

fn validate_shape(shape: &GeofenceShape) -> Result<(), ValidationError> {
    shape.validate()
}
