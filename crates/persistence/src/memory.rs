//! In-memory store implementations.
//!
//! Backed by tokio RwLock maps. Used by the engine's tests and available for
//! embedded or development wiring where Postgres is not present.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use domain::models::courier_state::CourierState;
use domain::models::geofence::Geofence;
use domain::models::geofence_event::{GeofenceEvent, NotificationRecord};
use domain::models::order_tracking::{
    LastLocationUpdate, OrderTracking, TrackingMilestone, TrackingStatus,
};
use domain::models::point::GeoPoint;
use domain::stores::{
    CourierStateStore, EventStore, GeofenceStore, OrderGateway, StoreError,
};

/// In-memory geofence store.
#[derive(Debug, Default)]
pub struct InMemoryGeofenceStore {
    fences: Arc<RwLock<HashMap<Uuid, Geofence>>>,
}

impl InMemoryGeofenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl GeofenceStore for InMemoryGeofenceStore {
    async fn create(&self, geofence: &Geofence) -> Result<(), StoreError> {
        self.fences
            .write()
            .await
            .insert(geofence.id, geofence.clone());
        Ok(())
    }

    async fn get(&self, geofence_id: Uuid) -> Result<Option<Geofence>, StoreError> {
        Ok(self.fences.read().await.get(&geofence_id).cloned())
    }

    async fn find_for_order(&self, order_id: Uuid) -> Result<Vec<Geofence>, StoreError> {
        let mut fences: Vec<Geofence> = self
            .fences
            .read()
            .await
            .values()
            .filter(|f| f.active && f.metadata.order_id == Some(order_id))
            .cloned()
            .collect();
        fences.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(fences)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Geofence>, StoreError> {
        let fences = self.fences.read().await;
        Ok(ids.iter().filter_map(|id| fences.get(id).cloned()).collect())
    }

    async fn deactivate_for_order(&self, order_id: Uuid) -> Result<u64, StoreError> {
        let mut fences = self.fences.write().await;
        let mut deactivated = 0;
        for fence in fences.values_mut() {
            if fence.active && fence.metadata.order_id == Some(order_id) {
                fence.active = false;
                fence.updated_at = Utc::now();
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }
}

/// In-memory courier state store.
#[derive(Debug, Default)]
pub struct InMemoryCourierStateStore {
    states: Arc<RwLock<HashMap<Uuid, CourierState>>>,
}

impl InMemoryCourierStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CourierStateStore for InMemoryCourierStateStore {
    async fn get(&self, courier_id: Uuid) -> Result<Option<CourierState>, StoreError> {
        Ok(self.states.read().await.get(&courier_id).cloned())
    }

    async fn upsert(&self, state: &CourierState) -> Result<(), StoreError> {
        self.states
            .write()
            .await
            .insert(state.courier_id, state.clone());
        Ok(())
    }

    async fn find_tracking(&self) -> Result<Vec<CourierState>, StoreError> {
        Ok(self
            .states
            .read()
            .await
            .values()
            .filter(|s| s.tracking)
            .cloned()
            .collect())
    }
}

/// In-memory append-only event log.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<GeofenceEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event ever appended, in append order. Test helper.
    pub async fn all(&self) -> Vec<GeofenceEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: &GeofenceEvent) -> Result<(), StoreError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn get(&self, event_id: Uuid) -> Result<Option<GeofenceEvent>, StoreError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .find(|e| e.id == event_id)
            .cloned())
    }

    async fn find_unprocessed(&self, limit: i64) -> Result<Vec<GeofenceEvent>, StoreError> {
        let events = self.events.read().await;
        let mut pending: Vec<GeofenceEvent> =
            events.iter().filter(|e| e.is_retryable()).cloned().collect();
        pending.sort_by_key(|e| e.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<GeofenceEvent>, StoreError> {
        let events = self.events.read().await;
        let mut matching: Vec<GeofenceEvent> = events
            .iter()
            .filter(|e| e.metadata.order_id == Some(order_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn find_by_courier(
        &self,
        courier_id: Uuid,
        limit: i64,
    ) -> Result<Vec<GeofenceEvent>, StoreError> {
        let events = self.events.read().await;
        let mut matching: Vec<GeofenceEvent> = events
            .iter()
            .filter(|e| e.courier_id == courier_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }

    async fn mark_processed(&self, event_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))?;
        event.mark_processed(at);
        Ok(())
    }

    async fn mark_notification(
        &self,
        event_id: Uuid,
        record: &NotificationRecord,
    ) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))?;
        event.notification = record.clone();
        Ok(())
    }

    async fn increment_retry(&self, event_id: Uuid) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))?;
        event.increment_retry();
        Ok(())
    }
}

/// In-memory order tracking gateway.
#[derive(Debug, Default)]
pub struct InMemoryOrderGateway {
    orders: Arc<RwLock<HashMap<Uuid, OrderTracking>>>,
}

impl InMemoryOrderGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl OrderGateway for InMemoryOrderGateway {
    async fn get(&self, order_id: Uuid) -> Result<Option<OrderTracking>, StoreError> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn upsert(&self, tracking: &OrderTracking) -> Result<(), StoreError> {
        self.orders
            .write()
            .await
            .insert(tracking.order_id, tracking.clone());
        Ok(())
    }

    async fn bind_geofences(
        &self,
        order_id: Uuid,
        geofence_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
        for id in geofence_ids {
            order.bind_geofence(*id);
        }
        Ok(())
    }

    async fn append_milestone(
        &self,
        order_id: Uuid,
        milestone: &TrackingMilestone,
    ) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
        order.push_milestone(milestone.clone());
        Ok(())
    }

    async fn set_status(&self, order_id: Uuid, status: TrackingStatus) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
        order.status = status;
        order.enabled = matches!(status, TrackingStatus::Active | TrackingStatus::Paused);
        Ok(())
    }

    async fn record_location(
        &self,
        order_id: Uuid,
        point: GeoPoint,
        accuracy: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?;
        order.last_location = Some(LastLocationUpdate {
            point,
            timestamp: at,
            accuracy,
        });
        Ok(())
    }

    async fn find_active_for_courier(
        &self,
        courier_id: Uuid,
    ) -> Result<Vec<OrderTracking>, StoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| {
                o.enabled && o.status == TrackingStatus::Active && o.courier_id == Some(courier_id)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::courier_location::CourierLocation;
    use domain::models::geofence::{GeofenceMetadata, GeofenceShape, GeofenceTriggers};
    use domain::models::geofence_event::{EventMetadata, GeofenceAction};

    fn fence_for_order(order_id: Uuid, priority: i32) -> Geofence {
        let now = Utc::now();
        Geofence {
            id: Uuid::new_v4(),
            name: "fence".to_string(),
            description: None,
            shape: GeofenceShape::Circle {
                center: GeoPoint::new(0.0, 0.0),
                radius_meters: 100.0,
            },
            active: true,
            priority,
            triggers: GeofenceTriggers::default(),
            metadata: GeofenceMetadata {
                order_id: Some(order_id),
                ..Default::default()
            },
            created_at: now,
            updated_at: now,
        }
    }

    fn event_for(order_id: Uuid, created_at: DateTime<Utc>) -> GeofenceEvent {
        let mut event = GeofenceEvent::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            GeofenceAction::Enter,
            CourierLocation::new(GeoPoint::new(0.0, 0.0), created_at),
            EventMetadata {
                order_id: Some(order_id),
                ..Default::default()
            },
            created_at,
        );
        event.created_at = created_at;
        event
    }

    #[tokio::test]
    async fn test_geofence_store_find_for_order_sorted() {
        let store = InMemoryGeofenceStore::new();
        let order_id = Uuid::new_v4();
        let low = fence_for_order(order_id, 3);
        let high = fence_for_order(order_id, 5);
        store.create(&low).await.unwrap();
        store.create(&high).await.unwrap();
        store.create(&fence_for_order(Uuid::new_v4(), 9)).await.unwrap();

        let found = store.find_for_order(order_id).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, high.id);
    }

    #[tokio::test]
    async fn test_geofence_store_deactivate_for_order() {
        let store = InMemoryGeofenceStore::new();
        let order_id = Uuid::new_v4();
        store.create(&fence_for_order(order_id, 5)).await.unwrap();
        store.create(&fence_for_order(order_id, 3)).await.unwrap();

        let deactivated = store.deactivate_for_order(order_id).await.unwrap();
        assert_eq!(deactivated, 2);
        assert!(store.find_for_order(order_id).await.unwrap().is_empty());
        // Fences still exist, just inactive.
        assert_eq!(store.deactivate_for_order(order_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_state_store_upsert_and_find_tracking() {
        let store = InMemoryCourierStateStore::new();
        let now = Utc::now();
        let mut state = CourierState::new(Uuid::new_v4(), now);
        state.tracking = true;
        store.upsert(&state).await.unwrap();
        store
            .upsert(&CourierState::new(Uuid::new_v4(), now))
            .await
            .unwrap();

        let tracking = store.find_tracking().await.unwrap();
        assert_eq!(tracking.len(), 1);
        assert_eq!(tracking[0].courier_id, state.courier_id);
    }

    #[tokio::test]
    async fn test_event_store_unprocessed_ordering_and_exclusion() {
        let store = InMemoryEventStore::new();
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let older = event_for(order_id, now - chrono::Duration::seconds(60));
        let newer = event_for(order_id, now);
        let mut exhausted = event_for(order_id, now - chrono::Duration::seconds(120));
        exhausted.retry_count = exhausted.max_retries;

        store.append(&newer).await.unwrap();
        store.append(&older).await.unwrap();
        store.append(&exhausted).await.unwrap();

        let pending = store.find_unprocessed(10).await.unwrap();
        // Ascending creation time, dead-lettered excluded.
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, older.id);
        assert_eq!(pending[1].id, newer.id);
    }

    #[tokio::test]
    async fn test_event_store_mark_processed_removes_from_pending() {
        let store = InMemoryEventStore::new();
        let event = event_for(Uuid::new_v4(), Utc::now());
        store.append(&event).await.unwrap();

        store.mark_processed(event.id, Utc::now()).await.unwrap();
        assert!(store.find_unprocessed(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_store_find_by_order_newest_first() {
        let store = InMemoryEventStore::new();
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let older = event_for(order_id, now - chrono::Duration::seconds(60));
        let newer = event_for(order_id, now);
        store.append(&older).await.unwrap();
        store.append(&newer).await.unwrap();

        let found = store.find_by_order(order_id).await.unwrap();
        assert_eq!(found[0].id, newer.id);
        assert_eq!(found[1].id, older.id);
    }

    #[tokio::test]
    async fn test_order_gateway_lifecycle() {
        let gateway = InMemoryOrderGateway::new();
        let order_id = Uuid::new_v4();
        let courier_id = Uuid::new_v4();

        let mut tracking = OrderTracking::new(order_id);
        tracking.enable(courier_id);
        gateway.upsert(&tracking).await.unwrap();

        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        gateway.bind_geofences(order_id, &ids).await.unwrap();

        let active = gateway.find_active_for_courier(courier_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].geofence_ids, ids);

        gateway
            .set_status(order_id, TrackingStatus::Completed)
            .await
            .unwrap();
        assert!(gateway
            .find_active_for_courier(courier_id)
            .await
            .unwrap()
            .is_empty());

        let stored = gateway.get(order_id).await.unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.status, TrackingStatus::Completed);
    }

    #[tokio::test]
    async fn test_order_gateway_missing_order_is_not_found() {
        let gateway = InMemoryOrderGateway::new();
        let err = gateway
            .set_status(Uuid::new_v4(), TrackingStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
