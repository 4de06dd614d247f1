//! Store contracts required by the tracking engine.
//!
//! These traits are the engine's only view of persistence. Postgres and
//! in-memory implementations live in the `persistence` crate.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::courier_state::CourierState;
use crate::models::geofence::Geofence;
use crate::models::geofence_event::{GeofenceEvent, NotificationRecord};
use crate::models::order_tracking::{OrderTracking, TrackingMilestone, TrackingStatus};
use crate::models::point::GeoPoint;

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".into()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Geofence persistence.
#[async_trait::async_trait]
pub trait GeofenceStore: Send + Sync {
    async fn create(&self, geofence: &Geofence) -> Result<(), StoreError>;

    async fn get(&self, geofence_id: Uuid) -> Result<Option<Geofence>, StoreError>;

    /// Active geofences bound to an order: the candidate set a detection
    /// pass evaluates. Only metadata-relevant geofences are returned.
    async fn find_for_order(&self, order_id: Uuid) -> Result<Vec<Geofence>, StoreError>;

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Geofence>, StoreError>;

    /// Deactivates all geofences bound to an order. Geofences are never
    /// hard-deleted. Returns the number of geofences deactivated.
    async fn deactivate_for_order(&self, order_id: Uuid) -> Result<u64, StoreError>;
}

/// Courier tracking state persistence.
#[async_trait::async_trait]
pub trait CourierStateStore: Send + Sync {
    async fn get(&self, courier_id: Uuid) -> Result<Option<CourierState>, StoreError>;

    async fn upsert(&self, state: &CourierState) -> Result<(), StoreError>;

    /// All states persisted with `tracking = true`, used to rebuild polling
    /// tasks at engine start.
    async fn find_tracking(&self) -> Result<Vec<CourierState>, StoreError>;
}

/// Append-only geofence event log.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &GeofenceEvent) -> Result<(), StoreError>;

    async fn get(&self, event_id: Uuid) -> Result<Option<GeofenceEvent>, StoreError>;

    /// Pending events: not processed and retry budget not exhausted,
    /// ascending creation time for drain fairness. Dead-lettered events
    /// never appear here.
    async fn find_unprocessed(&self, limit: i64) -> Result<Vec<GeofenceEvent>, StoreError>;

    /// Events for an order, newest first.
    async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<GeofenceEvent>, StoreError>;

    /// Events for a courier, newest first, bounded.
    async fn find_by_courier(
        &self,
        courier_id: Uuid,
        limit: i64,
    ) -> Result<Vec<GeofenceEvent>, StoreError>;

    async fn mark_processed(&self, event_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn mark_notification(
        &self,
        event_id: Uuid,
        record: &NotificationRecord,
    ) -> Result<(), StoreError>;

    async fn increment_retry(&self, event_id: Uuid) -> Result<(), StoreError>;
}

/// The order subsystem as the engine sees it: a tracking projection that can
/// be bound to geofences and grown with milestones.
#[async_trait::async_trait]
pub trait OrderGateway: Send + Sync {
    async fn get(&self, order_id: Uuid) -> Result<Option<OrderTracking>, StoreError>;

    async fn upsert(&self, tracking: &OrderTracking) -> Result<(), StoreError>;

    async fn bind_geofences(&self, order_id: Uuid, geofence_ids: &[Uuid])
        -> Result<(), StoreError>;

    /// Appends to the order's milestone timeline. The timeline only grows.
    async fn append_milestone(
        &self,
        order_id: Uuid,
        milestone: &TrackingMilestone,
    ) -> Result<(), StoreError>;

    /// Sets the tracking status. `Active` and `Paused` imply tracking is
    /// enabled; other statuses disable it.
    async fn set_status(&self, order_id: Uuid, status: TrackingStatus) -> Result<(), StoreError>;

    async fn record_location(
        &self,
        order_id: Uuid,
        point: GeoPoint,
        accuracy: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Orders with tracking enabled and status `Active` for a courier: the
    /// set a polling tick evaluates.
    async fn find_active_for_courier(
        &self,
        courier_id: Uuid,
    ) -> Result<Vec<OrderTracking>, StoreError>;
}
