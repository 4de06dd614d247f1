//! Courier state repository.

use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::courier_state::CourierState;
use domain::stores::{CourierStateStore, StoreError};

use crate::entities::CourierStateEntity;

const STATE_COLUMNS: &str = "id, courier_id, current_location, active_memberships, \
     exited_memberships, tracking, update_interval_ms, accuracy_threshold_meters, \
     notifications_enabled, last_updated, created_at";

/// Postgres-backed courier state store.
pub struct CourierStateRepository {
    pool: PgPool,
}

impl CourierStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CourierStateStore for CourierStateRepository {
    async fn get(&self, courier_id: Uuid) -> Result<Option<CourierState>, StoreError> {
        let entity = sqlx::query_as::<_, CourierStateEntity>(&format!(
            "SELECT {STATE_COLUMNS} FROM courier_states WHERE courier_id = $1"
        ))
        .bind(courier_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(CourierState::from))
    }

    async fn upsert(&self, state: &CourierState) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO courier_states (courier_id, current_location, active_memberships,
                                        exited_memberships, tracking, update_interval_ms,
                                        accuracy_threshold_meters, notifications_enabled,
                                        last_updated, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (courier_id) DO UPDATE SET
                current_location = EXCLUDED.current_location,
                active_memberships = EXCLUDED.active_memberships,
                exited_memberships = EXCLUDED.exited_memberships,
                tracking = EXCLUDED.tracking,
                update_interval_ms = EXCLUDED.update_interval_ms,
                accuracy_threshold_meters = EXCLUDED.accuracy_threshold_meters,
                notifications_enabled = EXCLUDED.notifications_enabled,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(state.courier_id)
        .bind(state.current_location.as_ref().map(Json))
        .bind(Json(&state.active_memberships))
        .bind(Json(&state.exited_memberships))
        .bind(state.tracking)
        .bind(state.settings.update_interval_ms as i64)
        .bind(state.settings.accuracy_threshold_meters)
        .bind(state.settings.notifications_enabled)
        .bind(state.last_updated)
        .bind(state.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_tracking(&self) -> Result<Vec<CourierState>, StoreError> {
        let entities = sqlx::query_as::<_, CourierStateEntity>(&format!(
            "SELECT {STATE_COLUMNS} FROM courier_states WHERE tracking = TRUE"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.into_iter().map(CourierState::from).collect())
    }
}
