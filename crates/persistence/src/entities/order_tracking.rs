//! Order tracking entity (database row mapping).

use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::order_tracking::{
    LastLocationUpdate, OrderTracking, TrackingMilestone, TrackingStatus,
};

/// Database row mapping for the order_tracking table.
#[derive(Debug, Clone, FromRow)]
pub struct OrderTrackingEntity {
    pub id: i64,
    pub order_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub enabled: bool,
    pub geofence_ids: Vec<Uuid>,
    pub status: String,
    pub last_location: Option<Json<LastLocationUpdate>>,
    pub milestones: Json<Vec<TrackingMilestone>>,
}

impl From<OrderTrackingEntity> for OrderTracking {
    fn from(entity: OrderTrackingEntity) -> Self {
        Self {
            order_id: entity.order_id,
            courier_id: entity.courier_id,
            enabled: entity.enabled,
            geofence_ids: entity.geofence_ids,
            status: TrackingStatus::parse(&entity.status).unwrap_or_default(),
            last_location: entity.last_location.map(|l| l.0),
            milestones: entity.milestones.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_to_domain() {
        let order_id = Uuid::new_v4();
        let geofence_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let entity = OrderTrackingEntity {
            id: 1,
            order_id,
            courier_id: Some(Uuid::new_v4()),
            enabled: true,
            geofence_ids: geofence_ids.clone(),
            status: "active".to_string(),
            last_location: None,
            milestones: Json(vec![]),
        };

        let tracking: OrderTracking = entity.into();
        assert_eq!(tracking.order_id, order_id);
        assert_eq!(tracking.status, TrackingStatus::Active);
        assert_eq!(tracking.geofence_ids, geofence_ids);
    }

    #[test]
    fn test_unknown_status_defaults_to_not_started() {
        let entity = OrderTrackingEntity {
            id: 1,
            order_id: Uuid::new_v4(),
            courier_id: None,
            enabled: false,
            geofence_ids: vec![],
            status: "bogus".to_string(),
            last_location: None,
            milestones: Json(vec![]),
        };

        let tracking: OrderTracking = entity.into();
        assert_eq!(tracking.status, TrackingStatus::NotStarted);
    }
}
