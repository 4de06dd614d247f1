//! Delivery tracking binding.
//!
//! Creates the pair of proximity geofences bound to an order and maps
//! geofence transitions to order milestones. Milestone derivation is
//! role-based: which of the two bound geofences fired, identified through
//! its metadata linkage, never through the display name.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use domain::models::courier_state::TrackingSettings;
use domain::models::geofence::{
    Geofence, GeofenceMetadata, GeofenceRole, GeofenceShape, GeofenceTriggers, NotificationChannel,
    TriggerTemplate,
};
use domain::models::order_tracking::MilestoneType;
use domain::models::point::GeoPoint;
use domain::services::containment;

use crate::config::TrackingConfig;

/// Ingress payload for starting delivery tracking on an order.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartTrackingRequest {
    pub order_id: Uuid,
    pub courier_id: Uuid,

    /// Store pickup point, `[longitude, latitude]`.
    #[validate(custom(function = "validate_point"))]
    pub pickup: GeoPoint,

    /// Customer dropoff point, `[longitude, latitude]`.
    #[validate(custom(function = "validate_point"))]
    pub dropoff: GeoPoint,

    pub store_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,

    /// Courier tracking settings; defaults apply when absent.
    pub settings: Option<TrackingSettings>,
}

fn validate_point(point: &GeoPoint) -> Result<(), ValidationError> {
    point.validate()
}

/// Builds the order's origin (store proximity) geofence.
pub fn origin_geofence(
    request: &StartTrackingRequest,
    config: &TrackingConfig,
    now: DateTime<Utc>,
) -> Geofence {
    Geofence {
        id: Uuid::new_v4(),
        name: format!("Store Proximity - Order {}", request.order_id),
        description: Some("Delivery partner has reached the store".to_string()),
        shape: GeofenceShape::Circle {
            center: request.pickup,
            radius_meters: config.origin_radius_meters,
        },
        active: true,
        priority: 5,
        triggers: GeofenceTriggers {
            on_enter: Some(TriggerTemplate {
                title: Some("Driver Reached Store".to_string()),
                message: Some(
                    "Your delivery partner has reached the store and is preparing your order."
                        .to_string(),
                ),
                channel: NotificationChannel::Push,
            }),
            on_exit: Some(TriggerTemplate {
                title: Some("Driver Left Store".to_string()),
                message: Some(
                    "Your delivery partner has left the store with your order.".to_string(),
                ),
                channel: NotificationChannel::Push,
            }),
        },
        metadata: GeofenceMetadata {
            order_id: Some(request.order_id),
            store_id: request.store_id,
            customer_id: request.customer_id,
            courier_id: Some(request.courier_id),
            role: Some(GeofenceRole::Origin),
        },
        created_at: now,
        updated_at: now,
    }
}

/// Builds the order's destination (customer proximity) geofence.
pub fn destination_geofence(
    request: &StartTrackingRequest,
    config: &TrackingConfig,
    now: DateTime<Utc>,
) -> Geofence {
    Geofence {
        id: Uuid::new_v4(),
        name: format!("Customer Proximity - Order {}", request.order_id),
        description: Some("Delivery partner is near customer location".to_string()),
        shape: GeofenceShape::Circle {
            center: request.dropoff,
            radius_meters: config.destination_radius_meters,
        },
        active: true,
        priority: 3,
        triggers: GeofenceTriggers {
            on_enter: Some(TriggerTemplate {
                title: Some("Driver Near You".to_string()),
                message: Some(
                    "Your delivery partner is near your location and will arrive shortly."
                        .to_string(),
                ),
                channel: NotificationChannel::Push,
            }),
            on_exit: Some(TriggerTemplate {
                title: Some("Driver Left Area".to_string()),
                message: Some("Your delivery partner has left your area.".to_string()),
                channel: NotificationChannel::Push,
            }),
        },
        metadata: GeofenceMetadata {
            order_id: Some(request.order_id),
            store_id: request.store_id,
            customer_id: request.customer_id,
            courier_id: Some(request.courier_id),
            role: Some(GeofenceRole::Destination),
        },
        created_at: now,
        updated_at: now,
    }
}

/// Milestone produced by entering a geofence, derived from its role.
pub fn milestone_for_entry(geofence: &Geofence) -> Option<MilestoneType> {
    match geofence.role()? {
        GeofenceRole::Origin => Some(MilestoneType::StoreReached),
        GeofenceRole::Destination => Some(MilestoneType::CustomerApproaching),
    }
}

/// Whether a point inside the destination geofence is close enough to count
/// as having reached the customer. Circles use the tighter arrival radius;
/// a polygonal destination has no center, so being inside is arrival.
pub fn within_arrival_radius(geofence: &Geofence, point: GeoPoint, arrival_radius: f64) -> bool {
    match &geofence.shape {
        GeofenceShape::Circle { center, .. } => {
            containment::distance_meters(point, *center) <= arrival_radius
        }
        GeofenceShape::Polygon { .. } => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> StartTrackingRequest {
        StartTrackingRequest {
            order_id: Uuid::new_v4(),
            courier_id: Uuid::new_v4(),
            pickup: GeoPoint::new(12.5683, 55.6761),
            dropoff: GeoPoint::new(12.6000, 55.6900),
            store_id: Some(Uuid::new_v4()),
            customer_id: Some(Uuid::new_v4()),
            settings: None,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request().validate().is_ok());

        let mut bad = request();
        bad.pickup = GeoPoint::new(200.0, 0.0);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_origin_geofence_shape_and_role() {
        let req = request();
        let config = TrackingConfig::default();
        let fence = origin_geofence(&req, &config, Utc::now());

        assert_eq!(fence.priority, 5);
        assert_eq!(fence.role(), Some(GeofenceRole::Origin));
        assert_eq!(fence.metadata.order_id, Some(req.order_id));
        assert_eq!(fence.metadata.courier_id, Some(req.courier_id));
        match fence.shape {
            GeofenceShape::Circle {
                center,
                radius_meters,
            } => {
                assert_eq!(center, req.pickup);
                assert_eq!(radius_meters, 100.0);
            }
            _ => panic!("expected circle"),
        }
        assert!(fence.triggers.on_enter.is_some());
        assert!(fence.triggers.on_exit.is_some());
    }

    #[test]
    fn test_destination_geofence_shape_and_role() {
        let req = request();
        let config = TrackingConfig::default();
        let fence = destination_geofence(&req, &config, Utc::now());

        assert_eq!(fence.priority, 3);
        assert_eq!(fence.role(), Some(GeofenceRole::Destination));
        match fence.shape {
            GeofenceShape::Circle { radius_meters, .. } => assert_eq!(radius_meters, 200.0),
            _ => panic!("expected circle"),
        }
        assert_eq!(
            fence.triggers.on_enter.as_ref().unwrap().title.as_deref(),
            Some("Driver Near You")
        );
    }

    #[test]
    fn test_milestone_for_entry_is_role_based() {
        let req = request();
        let config = TrackingConfig::default();
        let now = Utc::now();

        // Display names are irrelevant; only the role matters.
        let mut origin = origin_geofence(&req, &config, now);
        origin.name = "whatever".to_string();
        assert_eq!(
            milestone_for_entry(&origin),
            Some(MilestoneType::StoreReached)
        );

        let destination = destination_geofence(&req, &config, now);
        assert_eq!(
            milestone_for_entry(&destination),
            Some(MilestoneType::CustomerApproaching)
        );

        let mut unroled = origin_geofence(&req, &config, now);
        unroled.metadata.role = None;
        assert_eq!(milestone_for_entry(&unroled), None);
    }

    #[test]
    fn test_within_arrival_radius() {
        let req = request();
        let config = TrackingConfig::default();
        let fence = destination_geofence(&req, &config, Utc::now());

        // At the center: arrived.
        assert!(within_arrival_radius(&fence, req.dropoff, 50.0));
        // Roughly 150 m north of the dropoff: inside the fence, not arrived.
        let away = GeoPoint::new(req.dropoff.longitude, req.dropoff.latitude + 0.00135);
        assert!(!within_arrival_radius(&fence, away, 50.0));
    }
}
