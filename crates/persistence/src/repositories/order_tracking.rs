//! Order tracking repository.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use domain::models::order_tracking::{
    LastLocationUpdate, OrderTracking, TrackingMilestone, TrackingStatus,
};
use domain::models::point::GeoPoint;
use domain::stores::{OrderGateway, StoreError};

use crate::entities::OrderTrackingEntity;

const ORDER_COLUMNS: &str =
    "id, order_id, courier_id, enabled, geofence_ids, status, last_location, milestones";

/// Postgres-backed order tracking projection.
pub struct OrderTrackingRepository {
    pool: PgPool,
}

impl OrderTrackingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderGateway for OrderTrackingRepository {
    async fn get(&self, order_id: Uuid) -> Result<Option<OrderTracking>, StoreError> {
        let entity = sqlx::query_as::<_, OrderTrackingEntity>(&format!(
            "SELECT {ORDER_COLUMNS} FROM order_tracking WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(OrderTracking::from))
    }

    async fn upsert(&self, tracking: &OrderTracking) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO order_tracking (order_id, courier_id, enabled, geofence_ids, status,
                                        last_location, milestones)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id) DO UPDATE SET
                courier_id = EXCLUDED.courier_id,
                enabled = EXCLUDED.enabled,
                geofence_ids = EXCLUDED.geofence_ids,
                status = EXCLUDED.status,
                last_location = EXCLUDED.last_location,
                milestones = EXCLUDED.milestones
            "#,
        )
        .bind(tracking.order_id)
        .bind(tracking.courier_id)
        .bind(tracking.enabled)
        .bind(&tracking.geofence_ids)
        .bind(tracking.status.as_str())
        .bind(tracking.last_location.as_ref().map(Json))
        .bind(Json(&tracking.milestones))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn bind_geofences(
        &self,
        order_id: Uuid,
        geofence_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE order_tracking
            SET geofence_ids = ARRAY(SELECT DISTINCT unnest(geofence_ids || $2::uuid[]))
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(geofence_ids)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_milestone(
        &self,
        order_id: Uuid,
        milestone: &TrackingMilestone,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE order_tracking
            SET milestones = milestones || $2::jsonb
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(Json(milestone))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_status(&self, order_id: Uuid, status: TrackingStatus) -> Result<(), StoreError> {
        let enabled = matches!(status, TrackingStatus::Active | TrackingStatus::Paused);
        sqlx::query(
            r#"
            UPDATE order_tracking
            SET status = $2, enabled = $3
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_location(
        &self,
        order_id: Uuid,
        point: GeoPoint,
        accuracy: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let snapshot = LastLocationUpdate {
            point,
            timestamp: at,
            accuracy,
        };
        sqlx::query(
            r#"
            UPDATE order_tracking
            SET last_location = $2
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(Json(&snapshot))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_active_for_courier(
        &self,
        courier_id: Uuid,
    ) -> Result<Vec<OrderTracking>, StoreError> {
        let entities = sqlx::query_as::<_, OrderTrackingEntity>(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM order_tracking
            WHERE courier_id = $1 AND enabled = TRUE AND status = 'active'
            "#
        ))
        .bind(courier_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entities.into_iter().map(OrderTracking::from).collect())
    }
}
