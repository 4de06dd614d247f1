//! The tracking engine facade.
//!
//! Wires the detection pipeline, dispatcher and scheduler over a set of
//! stores and exposes the engine's ingress operations: location updates,
//! start/stop tracking and the order-scoped read surface.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use domain::models::courier_location::{CourierLocation, LocationUpdateRequest};
use domain::models::geofence::{Geofence, GeofenceRole};
use domain::models::geofence_event::GeofenceEvent;
use domain::models::order_tracking::{
    MilestoneType, OrderTracking, TrackingMilestone, TrackingStatus,
};
use domain::models::point::GeoPoint;
use domain::services::notification::NotificationSender;
use domain::stores::{CourierStateStore, EventStore, GeofenceStore, OrderGateway};

use crate::config::TrackingConfig;
use crate::delivery::{destination_geofence, origin_geofence, StartTrackingRequest};
use crate::dispatcher::NotificationDispatcher;
use crate::error::EngineError;
use crate::pipeline::{DetectionPipeline, DetectionSummary};
use crate::queue::EventQueue;
use crate::scheduler::{MonitoringStatus, TrackingScheduler};

/// How many persisted unprocessed events to recover at startup.
const STARTUP_DRAIN_LIMIT: i64 = 100;

/// Result of starting tracking for an order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedTracking {
    pub order_id: Uuid,
    pub geofence_ids: Vec<Uuid>,
    pub status: TrackingStatus,
}

/// Read surface for one order's tracking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTrackingView {
    pub order: OrderTracking,
    pub geofences: Vec<Geofence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_location: Option<CourierLocation>,
}

/// The geofence tracking engine.
pub struct TrackingEngine {
    geofences: Arc<dyn GeofenceStore>,
    states: Arc<dyn CourierStateStore>,
    events: Arc<dyn EventStore>,
    orders: Arc<dyn OrderGateway>,
    pipeline: Arc<DetectionPipeline>,
    dispatcher: Arc<NotificationDispatcher>,
    scheduler: Arc<TrackingScheduler>,
    config: TrackingConfig,
}

impl TrackingEngine {
    pub fn new(
        geofences: Arc<dyn GeofenceStore>,
        states: Arc<dyn CourierStateStore>,
        events: Arc<dyn EventStore>,
        orders: Arc<dyn OrderGateway>,
        sender: Arc<dyn NotificationSender>,
        config: TrackingConfig,
    ) -> Self {
        let queue = Arc::new(EventQueue::new());
        let pipeline = Arc::new(DetectionPipeline::new(
            Arc::clone(&geofences),
            Arc::clone(&states),
            Arc::clone(&events),
            Arc::clone(&orders),
            Arc::clone(&queue),
            config.clone(),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&events),
            Arc::clone(&geofences),
            sender,
        ));
        let scheduler = Arc::new(TrackingScheduler::new(
            Arc::clone(&pipeline),
            Arc::clone(&dispatcher),
            Arc::clone(&states),
            Arc::clone(&queue),
            config.clone(),
        ));

        Self {
            geofences,
            states,
            events,
            orders,
            pipeline,
            dispatcher,
            scheduler,
            config,
        }
    }

    /// Brings the engine up: recovers persisted unprocessed events, rebuilds
    /// polling tasks for tracked couriers and starts the drain task.
    pub async fn start(&self) -> Result<(), EngineError> {
        let drained = self.dispatcher.drain_pending(STARTUP_DRAIN_LIMIT).await?;
        if drained.dispatched > 0 {
            info!(
                dispatched = drained.dispatched,
                delivered = drained.delivered,
                "Recovered pending events at startup"
            );
        }
        let resumed = self.scheduler.resume_tracking().await?;
        self.scheduler.start_drain().await;
        info!(resumed_couriers = resumed, "Tracking engine started");
        Ok(())
    }

    /// Ingests a pushed location sample for a courier.
    pub async fn update_location(
        &self,
        request: LocationUpdateRequest,
    ) -> Result<DetectionSummary, EngineError> {
        self.pipeline.process_update(request).await
    }

    /// Starts delivery tracking for an order: creates the origin and
    /// destination proximity geofences, binds them, activates the order's
    /// projection and begins polling the courier.
    pub async fn start_tracking(
        &self,
        request: StartTrackingRequest,
    ) -> Result<StartedTracking, EngineError> {
        request.validate()?;
        let now = Utc::now();

        let mut tracking = self
            .orders
            .get(request.order_id)
            .await?
            .unwrap_or_else(|| OrderTracking::new(request.order_id));
        tracking.enable(request.courier_id);
        self.orders.upsert(&tracking).await?;

        let origin = origin_geofence(&request, &self.config, now);
        let destination = destination_geofence(&request, &self.config, now);
        self.geofences.create(&origin).await?;
        self.geofences.create(&destination).await?;

        let geofence_ids = vec![origin.id, destination.id];
        self.orders
            .bind_geofences(request.order_id, &geofence_ids)
            .await?;

        self.scheduler
            .start_tracking(request.courier_id, request.settings.clone())
            .await?;

        info!(
            order_id = %request.order_id,
            courier_id = %request.courier_id,
            "Started delivery tracking"
        );

        Ok(StartedTracking {
            order_id: request.order_id,
            geofence_ids,
            status: TrackingStatus::Active,
        })
    }

    /// Stops delivery tracking for an order. Always appends the
    /// `delivery_completed` milestone and completes the order's projection,
    /// independent of geofence state; the order's geofences are deactivated,
    /// never deleted. The courier's polling stops once they have no other
    /// active orders.
    pub async fn stop_tracking(&self, order_id: Uuid, courier_id: Uuid) -> Result<(), EngineError> {
        let tracking = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))?;

        let location = self.completion_location(&tracking).await?;
        let milestone = TrackingMilestone::new(MilestoneType::DeliveryCompleted, location, Utc::now());
        self.orders.append_milestone(order_id, &milestone).await?;
        self.orders
            .set_status(order_id, TrackingStatus::Completed)
            .await?;

        let deactivated = self.geofences.deactivate_for_order(order_id).await?;

        let remaining = self.orders.find_active_for_courier(courier_id).await?;
        if remaining.is_empty() {
            self.scheduler.stop_tracking(courier_id).await?;
        }

        info!(
            order_id = %order_id,
            courier_id = %courier_id,
            geofences_deactivated = deactivated,
            "Stopped delivery tracking"
        );
        Ok(())
    }

    /// Tracking read surface for one order.
    pub async fn tracking_status(&self, order_id: Uuid) -> Result<OrderTrackingView, EngineError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))?;

        let geofences = self.geofences.find_by_ids(&order.geofence_ids).await?;
        let courier_location = match order.courier_id {
            Some(courier_id) => self
                .states
                .get(courier_id)
                .await?
                .and_then(|state| state.current_location),
            None => None,
        };

        Ok(OrderTrackingView {
            order,
            geofences,
            courier_location,
        })
    }

    /// Geofence events for an order, newest first.
    pub async fn order_events(&self, order_id: Uuid) -> Result<Vec<GeofenceEvent>, EngineError> {
        Ok(self.events.find_by_order(order_id).await?)
    }

    /// Geofence events for a courier, newest first, bounded.
    pub async fn courier_events(
        &self,
        courier_id: Uuid,
        limit: i64,
    ) -> Result<Vec<GeofenceEvent>, EngineError> {
        Ok(self.events.find_by_courier(courier_id, limit).await?)
    }

    /// Force-processes persisted unprocessed events, bypassing the queue.
    pub async fn drain_pending(&self, limit: i64) -> Result<crate::dispatcher::DrainSummary, EngineError> {
        self.dispatcher.drain_pending(limit).await
    }

    /// Scheduler snapshot: monitored couriers and queue depth.
    pub async fn monitoring_status(&self) -> MonitoringStatus {
        self.scheduler.status().await
    }

    /// Signals all background tasks to stop.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Waits for background tasks to finish, up to `timeout`.
    pub async fn wait_for_shutdown(&self, timeout: Duration) {
        self.scheduler.wait_for_shutdown(timeout).await;
    }

    /// Completion point for the final milestone: the destination geofence's
    /// center when available, otherwise the order's last known location.
    async fn completion_location(
        &self,
        tracking: &OrderTracking,
    ) -> Result<Option<GeoPoint>, EngineError> {
        let fences = self.geofences.find_by_ids(&tracking.geofence_ids).await?;
        let destination_center = fences
            .iter()
            .find(|f| f.role() == Some(GeofenceRole::Destination))
            .and_then(|f| f.shape.center());
        Ok(destination_center.or_else(|| tracking.last_location.as_ref().map(|l| l.point)))
    }
}
