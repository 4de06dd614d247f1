//! Geofence event repository.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::geofence_event::{GeofenceEvent, NotificationRecord};
use domain::stores::{EventStore, StoreError};

use crate::entities::GeofenceEventEntity;

const EVENT_COLUMNS: &str = "id, event_id, courier_id, geofence_id, action, location, order_id, \
     store_id, meta_courier_id, distance_meters, dwell_ms, notification, processed, processed_at, \
     retry_count, max_retries, created_at";

/// Postgres-backed geofence event log.
pub struct GeofenceEventRepository {
    pool: PgPool,
}

impl GeofenceEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventStore for GeofenceEventRepository {
    async fn append(&self, event: &GeofenceEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO geofence_events (event_id, courier_id, geofence_id, action, location,
                                         order_id, store_id, meta_courier_id, distance_meters,
                                         dwell_ms, notification, processed, processed_at,
                                         retry_count, max_retries, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(event.id)
        .bind(event.courier_id)
        .bind(event.geofence_id)
        .bind(event.action.as_str())
        .bind(Json(&event.location))
        .bind(event.metadata.order_id)
        .bind(event.metadata.store_id)
        .bind(event.metadata.courier_id)
        .bind(event.metadata.distance_meters)
        .bind(event.metadata.dwell_ms)
        .bind(Json(&event.notification))
        .bind(event.processed)
        .bind(event.processed_at)
        .bind(event.retry_count)
        .bind(event.max_retries)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, event_id: Uuid) -> Result<Option<GeofenceEvent>, StoreError> {
        let entity = sqlx::query_as::<_, GeofenceEventEntity>(&format!(
            "SELECT {EVENT_COLUMNS} FROM geofence_events WHERE event_id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(GeofenceEvent::from))
    }

    async fn find_unprocessed(&self, limit: i64) -> Result<Vec<GeofenceEvent>, StoreError> {
        let entities = sqlx::query_as::<_, GeofenceEventEntity>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM geofence_events
            WHERE processed = FALSE AND retry_count < max_retries
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.into_iter().map(GeofenceEvent::from).collect())
    }

    async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<GeofenceEvent>, StoreError> {
        let entities = sqlx::query_as::<_, GeofenceEventEntity>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM geofence_events
            WHERE order_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.into_iter().map(GeofenceEvent::from).collect())
    }

    async fn find_by_courier(
        &self,
        courier_id: Uuid,
        limit: i64,
    ) -> Result<Vec<GeofenceEvent>, StoreError> {
        let entities = sqlx::query_as::<_, GeofenceEventEntity>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM geofence_events
            WHERE courier_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(courier_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.into_iter().map(GeofenceEvent::from).collect())
    }

    async fn mark_processed(&self, event_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE geofence_events
            SET processed = TRUE, processed_at = $2
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_notification(
        &self,
        event_id: Uuid,
        record: &NotificationRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE geofence_events
            SET notification = $2
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(Json(record))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_retry(&self, event_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE geofence_events
            SET retry_count = retry_count + 1
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
