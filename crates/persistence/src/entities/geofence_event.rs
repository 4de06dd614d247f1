//! Geofence event entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::courier_location::CourierLocation;
use domain::models::geofence_event::{
    EventMetadata, GeofenceAction, GeofenceEvent, NotificationRecord,
};

/// Database row mapping for the geofence_events table.
#[derive(Debug, Clone, FromRow)]
pub struct GeofenceEventEntity {
    pub id: i64,
    pub event_id: Uuid,
    pub courier_id: Uuid,
    pub geofence_id: Uuid,
    pub action: String,
    pub location: Json<CourierLocation>,
    pub order_id: Option<Uuid>,
    pub store_id: Option<Uuid>,
    pub meta_courier_id: Option<Uuid>,
    pub distance_meters: Option<f64>,
    pub dwell_ms: Option<i64>,
    pub notification: Json<NotificationRecord>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
}

impl From<GeofenceEventEntity> for GeofenceEvent {
    fn from(entity: GeofenceEventEntity) -> Self {
        Self {
            id: entity.event_id,
            courier_id: entity.courier_id,
            geofence_id: entity.geofence_id,
            // Unknown actions cannot appear through the engine's write path.
            action: GeofenceAction::parse(&entity.action).unwrap_or(GeofenceAction::Enter),
            location: entity.location.0,
            metadata: EventMetadata {
                order_id: entity.order_id,
                store_id: entity.store_id,
                courier_id: entity.meta_courier_id,
                distance_meters: entity.distance_meters,
                dwell_ms: entity.dwell_ms,
            },
            notification: entity.notification.0,
            processed: entity.processed,
            processed_at: entity.processed_at,
            retry_count: entity.retry_count,
            max_retries: entity.max_retries,
            created_at: entity.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::point::GeoPoint;

    #[test]
    fn test_entity_to_domain() {
        let now = Utc::now();
        let entity = GeofenceEventEntity {
            id: 3,
            event_id: Uuid::new_v4(),
            courier_id: Uuid::new_v4(),
            geofence_id: Uuid::new_v4(),
            action: "exit".to_string(),
            location: Json(CourierLocation::new(GeoPoint::new(12.0, 55.0), now)),
            order_id: Some(Uuid::new_v4()),
            store_id: None,
            meta_courier_id: None,
            distance_meters: Some(42.5),
            dwell_ms: Some(90_000),
            notification: Json(NotificationRecord::default()),
            processed: false,
            processed_at: None,
            retry_count: 1,
            max_retries: 3,
            created_at: now,
        };

        let event: GeofenceEvent = entity.clone().into();
        assert_eq!(event.id, entity.event_id);
        assert_eq!(event.action, GeofenceAction::Exit);
        assert_eq!(event.metadata.dwell_ms, Some(90_000));
        assert_eq!(event.retry_count, 1);
        assert!(event.is_retryable());
    }
}
