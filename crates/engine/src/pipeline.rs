//! Detection pipeline.
//!
//! One pass: resolve the courier's candidate geofences across their active
//! orders, compute the containment set, apply transitions to the courier
//! state, record events, project order milestones and enqueue notifications.
//! Push updates and polled ticks both run through here under the courier's
//! lock; a failure for one order never aborts the pass for the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, error, warn};
use uuid::Uuid;
use validator::Validate;

use domain::models::courier_location::{CourierLocation, LocationUpdateRequest};
use domain::models::courier_state::{CourierState, TrackingSettings};
use domain::models::geofence::{Geofence, GeofenceRole};
use domain::models::geofence_event::{EventMetadata, GeofenceAction, GeofenceEvent};
use domain::models::order_tracking::{MilestoneType, OrderTracking, TrackingMilestone};
use domain::services::containment;
use domain::services::transition::{self, AppliedTransitions};
use domain::stores::{CourierStateStore, EventStore, GeofenceStore, OrderGateway};

use crate::config::TrackingConfig;
use crate::delivery;
use crate::error::EngineError;
use crate::locks::CourierLocks;
use crate::queue::EventQueue;

/// Entered/exited geofence ids from one detection pass.
#[derive(Debug, Clone, Default)]
pub struct DetectionSummary {
    pub entered: Vec<Uuid>,
    pub exited: Vec<Uuid>,
}

impl DetectionSummary {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

/// Result of one scheduler tick.
#[derive(Debug)]
pub enum TickOutcome {
    Processed(DetectionSummary),
    /// Last sample older than twice the polling interval. Nothing mutated.
    SkippedStale,
    /// Last sample's accuracy above the courier's threshold. Nothing mutated.
    SkippedInaccurate,
    /// Courier has no enabled active orders. Nothing mutated.
    NoActiveOrders,
    /// Courier state missing or no longer tracking; the polling task stops.
    NotTracking,
}

/// The detection pipeline shared by push updates and polled ticks.
pub struct DetectionPipeline {
    geofences: Arc<dyn GeofenceStore>,
    states: Arc<dyn CourierStateStore>,
    events: Arc<dyn EventStore>,
    orders: Arc<dyn OrderGateway>,
    queue: Arc<EventQueue>,
    locks: CourierLocks,
    config: TrackingConfig,
}

impl DetectionPipeline {
    pub fn new(
        geofences: Arc<dyn GeofenceStore>,
        states: Arc<dyn CourierStateStore>,
        events: Arc<dyn EventStore>,
        orders: Arc<dyn OrderGateway>,
        queue: Arc<EventQueue>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            geofences,
            states,
            events,
            orders,
            queue,
            locks: CourierLocks::new(),
            config,
        }
    }

    /// Handles a pushed location sample. The location is recorded
    /// unconditionally; detection runs unless the sample fails the accuracy
    /// gate.
    pub async fn process_update(
        &self,
        request: LocationUpdateRequest,
    ) -> Result<DetectionSummary, EngineError> {
        request.validate()?;
        let courier_id = request.courier_id;

        let _guard = self.locks.acquire(courier_id).await;
        let now = Utc::now();
        let location = request.into_location(now);

        let mut state = match self.states.get(courier_id).await? {
            Some(state) => state,
            None => CourierState::new(courier_id, now),
        };
        state.record_location(location.clone(), now);

        let summary = if state.is_location_inaccurate() {
            debug!(
                courier_id = %courier_id,
                accuracy = ?location.accuracy,
                threshold = state.settings.accuracy_threshold_meters,
                "Sample accuracy above threshold; detection skipped"
            );
            counter!("tracking_detections_skipped_total", "reason" => "accuracy").increment(1);
            DetectionSummary::default()
        } else {
            self.run_detection(&mut state, &location, now).await?
        };

        self.states.upsert(&state).await?;
        Ok(summary)
    }

    /// Handles one scheduler tick: re-evaluates the courier's last received
    /// location against the geofences of their active orders.
    pub async fn process_tick(&self, courier_id: Uuid) -> Result<TickOutcome, EngineError> {
        let _guard = self.locks.acquire(courier_id).await;
        let now = Utc::now();

        let mut state = match self.states.get(courier_id).await? {
            Some(state) => state,
            None => return Ok(TickOutcome::NotTracking),
        };
        if !state.tracking {
            return Ok(TickOutcome::NotTracking);
        }

        if state.is_location_stale(now) {
            debug!(courier_id = %courier_id, "Last sample too old; tick skipped");
            counter!("tracking_ticks_skipped_total", "reason" => "stale").increment(1);
            return Ok(TickOutcome::SkippedStale);
        }
        if state.is_location_inaccurate() {
            debug!(courier_id = %courier_id, "Last sample accuracy too low; tick skipped");
            counter!("tracking_ticks_skipped_total", "reason" => "accuracy").increment(1);
            return Ok(TickOutcome::SkippedInaccurate);
        }
        let location = match state.current_location.clone() {
            Some(location) => location,
            None => return Ok(TickOutcome::SkippedStale),
        };

        let orders = self.orders.find_active_for_courier(courier_id).await?;
        if orders.is_empty() {
            debug!(courier_id = %courier_id, "No active orders for courier");
            return Ok(TickOutcome::NoActiveOrders);
        }

        let summary = self
            .detect_for_orders(&mut state, &location, &orders, now)
            .await;
        self.states.upsert(&state).await?;
        Ok(TickOutcome::Processed(summary))
    }

    /// Flips the courier's tracking flag (and optionally replaces settings)
    /// under the courier's lock, so it cannot race an in-flight pass.
    /// Creates the state lazily for a courier never seen before.
    pub async fn set_tracking(
        &self,
        courier_id: Uuid,
        tracking: bool,
        settings: Option<TrackingSettings>,
    ) -> Result<CourierState, EngineError> {
        let _guard = self.locks.acquire(courier_id).await;
        let now = Utc::now();
        let mut state = match self.states.get(courier_id).await? {
            Some(state) => state,
            None => CourierState::new(courier_id, now),
        };
        state.tracking = tracking;
        if let Some(settings) = settings {
            state.settings = settings;
        }
        self.states.upsert(&state).await?;
        Ok(state)
    }

    async fn run_detection(
        &self,
        state: &mut CourierState,
        location: &CourierLocation,
        now: DateTime<Utc>,
    ) -> Result<DetectionSummary, EngineError> {
        let orders = self.orders.find_active_for_courier(state.courier_id).await?;
        if orders.is_empty() {
            debug!(courier_id = %state.courier_id, "No active orders for courier");
            return Ok(DetectionSummary::default());
        }
        Ok(self.detect_for_orders(state, location, &orders, now).await)
    }

    /// One detection pass over the union of the orders' candidate geofences.
    /// The courier's previous memberships are compared against the full
    /// current containment set, so overlapping orders cannot evict each
    /// other's memberships.
    async fn detect_for_orders(
        &self,
        state: &mut CourierState,
        location: &CourierLocation,
        orders: &[OrderTracking],
        now: DateTime<Utc>,
    ) -> DetectionSummary {
        let mut fences: Vec<Geofence> = Vec::new();
        for order in orders {
            match self.geofences.find_for_order(order.order_id).await {
                Ok(mut found) => fences.append(&mut found),
                Err(err) => {
                    error!(
                        order_id = %order.order_id,
                        error = %err,
                        "Failed to load geofences for order; skipping it this pass"
                    );
                }
            }
        }

        let current = containment::containing(location.point, &fences);
        let applied = transition::apply(state, location, &current, now);

        if !applied.is_empty() {
            debug!(
                courier_id = %state.courier_id,
                entered = applied.entered.len(),
                exited = applied.exited.len(),
                "Geofence transitions detected"
            );
        }

        self.record_events(state.courier_id, &fences, &applied, location, now)
            .await;

        for order in orders {
            self.project_order(order, &fences, &applied, &current, location, now)
                .await;
        }

        DetectionSummary {
            entered: applied.entered.clone(),
            exited: applied.exited.iter().map(|e| e.geofence_id).collect(),
        }
    }

    async fn record_events(
        &self,
        courier_id: Uuid,
        fences: &[Geofence],
        applied: &AppliedTransitions,
        location: &CourierLocation,
        now: DateTime<Utc>,
    ) {
        for geofence_id in &applied.entered {
            let Some(fence) = fences.iter().find(|f| f.id == *geofence_id) else {
                continue;
            };
            let event =
                build_event(courier_id, fence, GeofenceAction::Enter, location, None, now);
            self.record_event(event).await;
        }

        for exit in &applied.exited {
            // An exited geofence may have been deactivated since the enter;
            // fall back to a direct lookup.
            let fence = match fences.iter().find(|f| f.id == exit.geofence_id) {
                Some(fence) => Some(fence.clone()),
                None => match self.geofences.get(exit.geofence_id).await {
                    Ok(fence) => fence,
                    Err(err) => {
                        error!(
                            geofence_id = %exit.geofence_id,
                            error = %err,
                            "Failed to load exited geofence; dropping exit event"
                        );
                        None
                    }
                },
            };
            let Some(fence) = fence else { continue };
            let event = build_event(
                courier_id,
                &fence,
                GeofenceAction::Exit,
                location,
                Some(exit.dwell_ms),
                now,
            );
            self.record_event(event).await;
        }
    }

    async fn record_event(&self, event: GeofenceEvent) {
        counter!("geofence_events_recorded_total", "action" => event.action.as_str())
            .increment(1);
        if let Err(err) = self.events.append(&event).await {
            error!(event_id = %event.id, error = %err, "Failed to persist geofence event");
            return;
        }
        self.queue.push(event);
    }

    async fn project_order(
        &self,
        order: &OrderTracking,
        fences: &[Geofence],
        applied: &AppliedTransitions,
        current: &[Uuid],
        location: &CourierLocation,
        now: DateTime<Utc>,
    ) {
        let order_fences: Vec<&Geofence> = fences
            .iter()
            .filter(|f| f.metadata.order_id == Some(order.order_id))
            .collect();

        for geofence_id in &applied.entered {
            let Some(fence) = order_fences.iter().find(|f| f.id == *geofence_id) else {
                continue;
            };
            if let Some(milestone_type) = delivery::milestone_for_entry(fence) {
                self.append_milestone(order.order_id, milestone_type, location, now)
                    .await;
            }
        }

        // Arrival is distance-driven, not enter-driven: a courier already
        // inside the destination geofence reaches the customer on a later
        // tick. Appended at most once per order.
        if !order.has_milestone(MilestoneType::CustomerReached) {
            let destination = order_fences
                .iter()
                .find(|f| f.role() == Some(GeofenceRole::Destination));
            if let Some(destination) = destination {
                if current.contains(&destination.id)
                    && delivery::within_arrival_radius(
                        destination,
                        location.point,
                        self.config.arrival_radius_meters,
                    )
                {
                    self.append_milestone(
                        order.order_id,
                        MilestoneType::CustomerReached,
                        location,
                        now,
                    )
                    .await;
                }
            }
        }

        if let Err(err) = self
            .orders
            .record_location(order.order_id, location.point, location.accuracy, now)
            .await
        {
            warn!(order_id = %order.order_id, error = %err, "Failed to record order location");
        }
    }

    async fn append_milestone(
        &self,
        order_id: Uuid,
        milestone_type: MilestoneType,
        location: &CourierLocation,
        now: DateTime<Utc>,
    ) {
        let milestone = TrackingMilestone::new(milestone_type, Some(location.point), now);
        match self.orders.append_milestone(order_id, &milestone).await {
            Ok(()) => {
                counter!("order_milestones_total", "milestone" => milestone_type.as_str())
                    .increment(1);
            }
            Err(err) => {
                error!(
                    order_id = %order_id,
                    milestone = milestone_type.as_str(),
                    error = %err,
                    "Failed to append order milestone"
                );
            }
        }
    }
}

fn build_event(
    courier_id: Uuid,
    fence: &Geofence,
    action: GeofenceAction,
    location: &CourierLocation,
    dwell_ms: Option<i64>,
    now: DateTime<Utc>,
) -> GeofenceEvent {
    // Distance from center only makes sense for circles.
    let distance_meters = fence
        .shape
        .center()
        .map(|center| containment::distance_meters(location.point, center));

    GeofenceEvent::new(
        courier_id,
        fence.id,
        action,
        location.clone(),
        EventMetadata {
            order_id: fence.metadata.order_id,
            store_id: fence.metadata.store_id,
            courier_id: fence.metadata.courier_id,
            distance_meters,
            dwell_ms,
        },
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::courier_state::TrackingSettings;
    use domain::models::point::GeoPoint;
    use persistence::memory::{
        InMemoryCourierStateStore, InMemoryEventStore, InMemoryGeofenceStore, InMemoryOrderGateway,
    };

    struct Fixture {
        pipeline: DetectionPipeline,
        geofences: Arc<InMemoryGeofenceStore>,
        states: Arc<InMemoryCourierStateStore>,
        events: Arc<InMemoryEventStore>,
        orders: Arc<InMemoryOrderGateway>,
        queue: Arc<EventQueue>,
    }

    fn fixture() -> Fixture {
        let geofences = Arc::new(InMemoryGeofenceStore::new());
        let states = Arc::new(InMemoryCourierStateStore::new());
        let events = Arc::new(InMemoryEventStore::new());
        let orders = Arc::new(InMemoryOrderGateway::new());
        let queue = Arc::new(EventQueue::new());
        let pipeline = DetectionPipeline::new(
            geofences.clone(),
            states.clone(),
            events.clone(),
            orders.clone(),
            queue.clone(),
            TrackingConfig::default(),
        );
        Fixture {
            pipeline,
            geofences,
            states,
            events,
            orders,
            queue,
        }
    }

    async fn seed_order(
        f: &Fixture,
        courier_id: Uuid,
        pickup: GeoPoint,
        dropoff: GeoPoint,
    ) -> (Uuid, Geofence, Geofence) {
        use crate::delivery::{destination_geofence, origin_geofence, StartTrackingRequest};
        use domain::models::order_tracking::OrderTracking;

        let order_id = Uuid::new_v4();
        let request = StartTrackingRequest {
            order_id,
            courier_id,
            pickup,
            dropoff,
            store_id: None,
            customer_id: None,
            settings: None,
        };
        let config = TrackingConfig::default();
        let now = Utc::now();
        let origin = origin_geofence(&request, &config, now);
        let destination = destination_geofence(&request, &config, now);
        f.geofences.create(&origin).await.unwrap();
        f.geofences.create(&destination).await.unwrap();

        let mut tracking = OrderTracking::new(order_id);
        tracking.enable(courier_id);
        tracking.bind_geofence(origin.id);
        tracking.bind_geofence(destination.id);
        f.orders.upsert(&tracking).await.unwrap();

        (order_id, origin, destination)
    }

    fn update(courier_id: Uuid, point: GeoPoint, accuracy: Option<f64>) -> LocationUpdateRequest {
        LocationUpdateRequest {
            courier_id,
            coordinates: point,
            accuracy,
            heading: None,
            speed: None,
        }
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_coordinates() {
        let f = fixture();
        let result = f
            .pipeline
            .process_update(update(Uuid::new_v4(), GeoPoint::new(-200.0, 0.0), None))
            .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        // Nothing persisted.
        assert!(f.events.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_creates_state_lazily() {
        let f = fixture();
        let courier_id = Uuid::new_v4();
        let summary = f
            .pipeline
            .process_update(update(courier_id, GeoPoint::new(12.0, 55.0), Some(10.0)))
            .await
            .unwrap();
        assert!(summary.is_empty());

        let state = f.states.get(courier_id).await.unwrap().unwrap();
        assert!(state.current_location.is_some());
    }

    #[tokio::test]
    async fn test_enter_event_recorded_and_enqueued() {
        let f = fixture();
        let courier_id = Uuid::new_v4();
        let pickup = GeoPoint::new(12.5683, 55.6761);
        let dropoff = GeoPoint::new(12.7000, 55.7500);
        let (order_id, origin, _) = seed_order(&f, courier_id, pickup, dropoff).await;

        let summary = f
            .pipeline
            .process_update(update(courier_id, pickup, Some(10.0)))
            .await
            .unwrap();
        assert_eq!(summary.entered, vec![origin.id]);

        let events = f.events.all().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, GeofenceAction::Enter);
        assert_eq!(events[0].metadata.order_id, Some(order_id));
        // Circle events carry the distance from center.
        assert!(events[0].metadata.distance_meters.unwrap() < 1.0);
        assert_eq!(f.queue.depth(), 1);
    }

    #[tokio::test]
    async fn test_low_accuracy_update_records_location_but_skips_detection() {
        let f = fixture();
        let courier_id = Uuid::new_v4();
        let pickup = GeoPoint::new(12.5683, 55.6761);
        seed_order(&f, courier_id, pickup, GeoPoint::new(12.7, 55.75)).await;

        let summary = f
            .pipeline
            .process_update(update(courier_id, pickup, Some(150.0)))
            .await
            .unwrap();
        assert!(summary.is_empty());
        assert!(f.events.all().await.is_empty());
        // The sample itself is still the courier's latest location.
        let state = f.states.get(courier_id).await.unwrap().unwrap();
        assert_eq!(state.current_location.unwrap().accuracy, Some(150.0));
    }

    #[tokio::test]
    async fn test_tick_without_state_is_not_tracking() {
        let f = fixture();
        let outcome = f.pipeline.process_tick(Uuid::new_v4()).await.unwrap();
        assert!(matches!(outcome, TickOutcome::NotTracking));
    }

    #[tokio::test]
    async fn test_tick_gates_do_not_mutate_state() {
        let f = fixture();
        let courier_id = Uuid::new_v4();
        let now = Utc::now();
        let mut state = CourierState::new(courier_id, now);
        state.tracking = true;
        state.settings = TrackingSettings {
            update_interval_ms: 5_000,
            accuracy_threshold_meters: 100.0,
            notifications_enabled: true,
        };
        // Inaccurate sample.
        state.record_location(
            CourierLocation {
                point: GeoPoint::new(12.0, 55.0),
                timestamp: now,
                accuracy: Some(150.0),
                heading: None,
                speed: None,
            },
            now,
        );
        f.states.upsert(&state).await.unwrap();

        let outcome = f.pipeline.process_tick(courier_id).await.unwrap();
        assert!(matches!(outcome, TickOutcome::SkippedInaccurate));
        assert!(f.events.all().await.is_empty());

        let after = f.states.get(courier_id).await.unwrap().unwrap();
        assert_eq!(after.last_updated, state.last_updated);
        assert!(after.active_memberships.is_empty());
    }

    #[tokio::test]
    async fn test_milestones_projected_from_roles() {
        let f = fixture();
        let courier_id = Uuid::new_v4();
        let pickup = GeoPoint::new(12.5683, 55.6761);
        let dropoff = GeoPoint::new(12.7000, 55.7500);
        let (order_id, _, _) = seed_order(&f, courier_id, pickup, dropoff).await;

        // At the store.
        f.pipeline
            .process_update(update(courier_id, pickup, Some(10.0)))
            .await
            .unwrap();
        // At the customer (inside arrival radius immediately).
        f.pipeline
            .process_update(update(courier_id, dropoff, Some(10.0)))
            .await
            .unwrap();

        let order = f.orders.get(order_id).await.unwrap().unwrap();
        let kinds: Vec<MilestoneType> =
            order.milestones.iter().map(|m| m.milestone_type).collect();
        assert!(kinds.contains(&MilestoneType::StoreReached));
        assert!(kinds.contains(&MilestoneType::CustomerApproaching));
        assert!(kinds.contains(&MilestoneType::CustomerReached));
        assert!(order.last_location.is_some());
    }

    #[tokio::test]
    async fn test_customer_reached_appended_once() {
        let f = fixture();
        let courier_id = Uuid::new_v4();
        let pickup = GeoPoint::new(12.5683, 55.6761);
        let dropoff = GeoPoint::new(12.7000, 55.7500);
        let (order_id, _, _) = seed_order(&f, courier_id, pickup, dropoff).await;

        for _ in 0..3 {
            f.pipeline
                .process_update(update(courier_id, dropoff, Some(10.0)))
                .await
                .unwrap();
        }

        let order = f.orders.get(order_id).await.unwrap().unwrap();
        let reached = order
            .milestones
            .iter()
            .filter(|m| m.milestone_type == MilestoneType::CustomerReached)
            .count();
        assert_eq!(reached, 1);
    }
}
