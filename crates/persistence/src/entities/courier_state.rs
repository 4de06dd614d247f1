//! Courier state entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::courier_location::CourierLocation;
use domain::models::courier_state::{
    CourierState, ExitedMembership, GeofenceMembership, TrackingSettings,
};

/// Database row mapping for the courier_states table.
#[derive(Debug, Clone, FromRow)]
pub struct CourierStateEntity {
    pub id: i64,
    pub courier_id: Uuid,
    pub current_location: Option<Json<CourierLocation>>,
    pub active_memberships: Json<Vec<GeofenceMembership>>,
    pub exited_memberships: Json<Vec<ExitedMembership>>,
    pub tracking: bool,
    pub update_interval_ms: i64,
    pub accuracy_threshold_meters: f64,
    pub notifications_enabled: bool,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<CourierStateEntity> for CourierState {
    fn from(entity: CourierStateEntity) -> Self {
        Self {
            courier_id: entity.courier_id,
            current_location: entity.current_location.map(|l| l.0),
            active_memberships: entity.active_memberships.0,
            exited_memberships: entity.exited_memberships.0,
            tracking: entity.tracking,
            settings: TrackingSettings {
                update_interval_ms: entity.update_interval_ms.max(0) as u64,
                accuracy_threshold_meters: entity.accuracy_threshold_meters,
                notifications_enabled: entity.notifications_enabled,
            },
            last_updated: entity.last_updated,
            created_at: entity.created_at,
        }
    }
}
