//! Geofence repository.

use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use domain::models::geofence::Geofence;
use domain::stores::{GeofenceStore, StoreError};

use crate::entities::GeofenceEntity;

const GEOFENCE_COLUMNS: &str = "id, geofence_id, name, description, shape, active, priority, \
     triggers, order_id, store_id, customer_id, courier_id, role, created_at, updated_at";

/// Postgres-backed geofence store.
pub struct GeofenceRepository {
    pool: PgPool,
}

impl GeofenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl GeofenceStore for GeofenceRepository {
    async fn create(&self, geofence: &Geofence) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO geofences (geofence_id, name, description, shape, active, priority,
                                   triggers, order_id, store_id, customer_id, courier_id, role,
                                   created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(geofence.id)
        .bind(&geofence.name)
        .bind(&geofence.description)
        .bind(Json(&geofence.shape))
        .bind(geofence.active)
        .bind(geofence.priority)
        .bind(Json(&geofence.triggers))
        .bind(geofence.metadata.order_id)
        .bind(geofence.metadata.store_id)
        .bind(geofence.metadata.customer_id)
        .bind(geofence.metadata.courier_id)
        .bind(geofence.metadata.role.map(|r| r.as_str()))
        .bind(geofence.created_at)
        .bind(geofence.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, geofence_id: Uuid) -> Result<Option<Geofence>, StoreError> {
        let entity = sqlx::query_as::<_, GeofenceEntity>(&format!(
            "SELECT {GEOFENCE_COLUMNS} FROM geofences WHERE geofence_id = $1"
        ))
        .bind(geofence_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(Geofence::from))
    }

    async fn find_for_order(&self, order_id: Uuid) -> Result<Vec<Geofence>, StoreError> {
        let entities = sqlx::query_as::<_, GeofenceEntity>(&format!(
            r#"
            SELECT {GEOFENCE_COLUMNS} FROM geofences
            WHERE order_id = $1 AND active = TRUE
            ORDER BY priority DESC
            "#
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.into_iter().map(Geofence::from).collect())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Geofence>, StoreError> {
        let entities = sqlx::query_as::<_, GeofenceEntity>(&format!(
            "SELECT {GEOFENCE_COLUMNS} FROM geofences WHERE geofence_id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.into_iter().map(Geofence::from).collect())
    }

    async fn deactivate_for_order(&self, order_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE geofences
            SET active = FALSE, updated_at = NOW()
            WHERE order_id = $1 AND active = TRUE
            "#,
        )
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        debug!(
            order_id = %order_id,
            count = result.rows_affected(),
            "Deactivated geofences for order"
        );
        Ok(result.rows_affected())
    }
}
