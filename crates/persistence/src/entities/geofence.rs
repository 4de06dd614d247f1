//! Geofence entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::geofence::{
    Geofence, GeofenceMetadata, GeofenceRole, GeofenceShape, GeofenceTriggers,
};

/// Database row mapping for the geofences table.
///
/// Metadata links are flattened into columns so candidate lookups can filter
/// on them; geometry and triggers are stored as JSONB documents.
#[derive(Debug, Clone, FromRow)]
pub struct GeofenceEntity {
    pub id: i64,
    pub geofence_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub shape: Json<GeofenceShape>,
    pub active: bool,
    pub priority: i32,
    pub triggers: Json<GeofenceTriggers>,
    pub order_id: Option<Uuid>,
    pub store_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub courier_id: Option<Uuid>,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GeofenceEntity> for Geofence {
    fn from(entity: GeofenceEntity) -> Self {
        Self {
            id: entity.geofence_id,
            name: entity.name,
            description: entity.description,
            shape: entity.shape.0,
            active: entity.active,
            priority: entity.priority,
            triggers: entity.triggers.0,
            metadata: GeofenceMetadata {
                order_id: entity.order_id,
                store_id: entity.store_id,
                customer_id: entity.customer_id,
                courier_id: entity.courier_id,
                role: entity.role.as_deref().and_then(GeofenceRole::parse),
            },
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
