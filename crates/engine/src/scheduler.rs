//! Tracking scheduler.
//!
//! Owns one polling task per courier under active tracking plus a single
//! fixed-cadence drain task for the pending-event queue. The registry is
//! explicit process-wide state: entries are added on `start_tracking`,
//! removed on `stop_tracking`, and rebuilt from persisted `tracking = true`
//! states by `resume_tracking` at engine start.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use domain::models::courier_state::TrackingSettings;
use domain::stores::CourierStateStore;

use crate::config::TrackingConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::error::EngineError;
use crate::pipeline::{DetectionPipeline, TickOutcome};
use crate::queue::EventQueue;

/// A spawned background task with its shutdown signal.
struct ScheduledTask {
    task_id: Uuid,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Snapshot of the scheduler's state.
#[derive(Debug, Clone)]
pub struct MonitoringStatus {
    pub running: bool,
    pub monitored_couriers: Vec<Uuid>,
    pub queue_depth: usize,
}

/// Owns the per-courier polling tasks and the event drain task.
pub struct TrackingScheduler {
    pipeline: Arc<DetectionPipeline>,
    dispatcher: Arc<NotificationDispatcher>,
    states: Arc<dyn CourierStateStore>,
    queue: Arc<EventQueue>,
    config: TrackingConfig,
    tasks: Arc<Mutex<HashMap<Uuid, ScheduledTask>>>,
    drain: Mutex<Option<ScheduledTask>>,
    running: AtomicBool,
}

impl TrackingScheduler {
    pub fn new(
        pipeline: Arc<DetectionPipeline>,
        dispatcher: Arc<NotificationDispatcher>,
        states: Arc<dyn CourierStateStore>,
        queue: Arc<EventQueue>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            pipeline,
            dispatcher,
            states,
            queue,
            config,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            drain: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Flips the courier into tracking, applies settings and spawns the
    /// polling task. Safe to call for a courier already being tracked.
    pub async fn start_tracking(
        &self,
        courier_id: Uuid,
        settings: Option<TrackingSettings>,
    ) -> Result<(), EngineError> {
        let state = self.pipeline.set_tracking(courier_id, true, settings).await?;
        self.spawn_poll_task(courier_id, state.settings.update_interval_ms)
            .await;
        info!(
            courier_id = %courier_id,
            interval_ms = state.settings.update_interval_ms,
            "Started tracking"
        );
        Ok(())
    }

    /// Cancels the courier's polling task and flips `tracking` off. The
    /// courier state is kept. An in-flight tick may finish writing, but no
    /// further tick is scheduled.
    pub async fn stop_tracking(&self, courier_id: Uuid) -> Result<(), EngineError> {
        if let Some(task) = self.tasks.lock().await.remove(&courier_id) {
            let _ = task.shutdown_tx.send(true);
        }
        self.pipeline.set_tracking(courier_id, false, None).await?;
        info!(courier_id = %courier_id, "Stopped tracking");
        Ok(())
    }

    /// Recreates polling tasks for every persisted `tracking = true` state.
    /// Returns the number of couriers resumed.
    pub async fn resume_tracking(&self) -> Result<usize, EngineError> {
        let tracking = self.states.find_tracking().await?;
        let count = tracking.len();
        for state in tracking {
            self.spawn_poll_task(state.courier_id, state.settings.update_interval_ms)
                .await;
        }
        if count > 0 {
            info!(couriers = count, "Resumed tracking");
        }
        Ok(count)
    }

    async fn spawn_poll_task(&self, courier_id: Uuid, interval_ms: u64) {
        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.get(&courier_id) {
            if !existing.handle.is_finished() {
                warn!(courier_id = %courier_id, "Already monitoring courier");
                return;
            }
            tasks.remove(&courier_id);
        }

        let task_id = Uuid::new_v4();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let pipeline = Arc::clone(&self.pipeline);
        let registry = Arc::clone(&self.tasks);

        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            // Skip the first immediate tick
            interval.tick().await;

            debug!(courier_id = %courier_id, interval_ms, "Polling task scheduled");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match pipeline.process_tick(courier_id).await {
                            Ok(TickOutcome::NotTracking) => {
                                info!(courier_id = %courier_id, "Courier no longer tracking; polling task stopping");
                                let mut tasks = registry.lock().await;
                                if tasks.get(&courier_id).map(|t| t.task_id) == Some(task_id) {
                                    tasks.remove(&courier_id);
                                }
                                break;
                            }
                            Ok(TickOutcome::Processed(summary)) => {
                                if !summary.is_empty() {
                                    debug!(
                                        courier_id = %courier_id,
                                        entered = summary.entered.len(),
                                        exited = summary.exited.len(),
                                        "Tick processed"
                                    );
                                }
                            }
                            Ok(_) => {}
                            Err(err) => {
                                // One courier's failure never stops its own
                                // polling or anyone else's.
                                error!(courier_id = %courier_id, error = %err, "Tick failed");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!(courier_id = %courier_id, "Polling task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        tasks.insert(
            courier_id,
            ScheduledTask {
                task_id,
                shutdown_tx,
                handle,
            },
        );
    }

    /// Starts the fixed-cadence drain task that pops a bounded batch from
    /// the pending-event queue and dispatches it sequentially.
    pub async fn start_drain(&self) {
        let mut drain = self.drain.lock().await;
        if drain.as_ref().map(|t| !t.handle.is_finished()).unwrap_or(false) {
            warn!("Drain task already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let dispatcher = Arc::clone(&self.dispatcher);
        let queue = Arc::clone(&self.queue);
        let interval_ms = self.config.drain_interval_ms;
        let batch_size = self.config.drain_batch_size;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let batch = queue.pop_batch(batch_size).await;
                        gauge!("tracking_event_queue_depth").set(queue.depth() as f64);
                        if batch.is_empty() {
                            continue;
                        }
                        let summary = dispatcher.drain_batch(&batch).await;
                        debug!(
                            dispatched = summary.dispatched,
                            delivered = summary.delivered,
                            failed = summary.failed,
                            "Drained event batch"
                        );
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Drain task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        *drain = Some(ScheduledTask {
            task_id: Uuid::new_v4(),
            shutdown_tx,
            handle,
        });
        self.running.store(true, Ordering::SeqCst);
        info!(interval_ms, batch_size, "Drain task started");
    }

    /// Signals every polling task and the drain task to stop. Returns
    /// immediately; in-flight ticks finish on their own.
    pub async fn shutdown(&self) {
        info!("Initiating tracking scheduler shutdown");
        self.running.store(false, Ordering::SeqCst);
        for task in self.tasks.lock().await.values() {
            let _ = task.shutdown_tx.send(true);
        }
        if let Some(drain) = self.drain.lock().await.as_ref() {
            let _ = drain.shutdown_tx.send(true);
        }
    }

    /// Waits for all tasks to finish, up to `timeout`.
    pub async fn wait_for_shutdown(&self, timeout: Duration) {
        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        {
            let mut tasks = self.tasks.lock().await;
            for (_, task) in tasks.drain() {
                handles.push(task.handle);
            }
        }
        if let Some(drain) = self.drain.lock().await.take() {
            handles.push(drain.handle);
        }

        let join_all = async {
            for handle in handles {
                if let Err(err) = handle.await {
                    warn!("Scheduler task panicked: {}", err);
                }
            }
        };

        match tokio::time::timeout(timeout, join_all).await {
            Ok(()) => info!("All scheduler tasks completed gracefully"),
            Err(_) => warn!("Scheduler shutdown timed out after {:?}", timeout),
        }
    }

    /// Current monitoring snapshot: drain running, monitored couriers and
    /// queue depth.
    pub async fn status(&self) -> MonitoringStatus {
        let tasks = self.tasks.lock().await;
        let monitored_couriers = tasks
            .iter()
            .filter(|(_, task)| !task.handle.is_finished())
            .map(|(courier_id, _)| *courier_id)
            .collect();
        MonitoringStatus {
            running: self.running.load(Ordering::SeqCst),
            monitored_couriers,
            queue_depth: self.queue.depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::point::GeoPoint;
    use domain::services::notification::MockNotificationSender;
    use domain::stores::{GeofenceStore, OrderGateway};
    use persistence::memory::{
        InMemoryCourierStateStore, InMemoryEventStore, InMemoryGeofenceStore, InMemoryOrderGateway,
    };

    struct Fixture {
        scheduler: TrackingScheduler,
        states: Arc<InMemoryCourierStateStore>,
        geofences: Arc<InMemoryGeofenceStore>,
        orders: Arc<InMemoryOrderGateway>,
        events: Arc<InMemoryEventStore>,
        pipeline: Arc<DetectionPipeline>,
    }

    fn fixture() -> Fixture {
        let geofences = Arc::new(InMemoryGeofenceStore::new());
        let states = Arc::new(InMemoryCourierStateStore::new());
        let events = Arc::new(InMemoryEventStore::new());
        let orders = Arc::new(InMemoryOrderGateway::new());
        let queue = Arc::new(EventQueue::new());
        let config = TrackingConfig::default();

        let pipeline = Arc::new(DetectionPipeline::new(
            geofences.clone(),
            states.clone(),
            events.clone(),
            orders.clone(),
            queue.clone(),
            config.clone(),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            events.clone(),
            geofences.clone(),
            Arc::new(MockNotificationSender::new()),
        ));
        let scheduler = TrackingScheduler::new(
            pipeline.clone(),
            dispatcher,
            states.clone(),
            queue,
            config,
        );
        Fixture {
            scheduler,
            states,
            geofences,
            orders,
            events,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_start_tracking_registers_task_and_persists_flag() {
        let f = fixture();
        let courier_id = Uuid::new_v4();
        f.scheduler.start_tracking(courier_id, None).await.unwrap();

        let status = f.scheduler.status().await;
        assert_eq!(status.monitored_couriers, vec![courier_id]);

        let state = f.states.get(courier_id).await.unwrap().unwrap();
        assert!(state.tracking);
    }

    #[tokio::test]
    async fn test_start_tracking_applies_settings() {
        let f = fixture();
        let courier_id = Uuid::new_v4();
        let settings = TrackingSettings {
            update_interval_ms: 2_000,
            accuracy_threshold_meters: 50.0,
            notifications_enabled: true,
        };
        f.scheduler
            .start_tracking(courier_id, Some(settings.clone()))
            .await
            .unwrap();

        let state = f.states.get(courier_id).await.unwrap().unwrap();
        assert_eq!(state.settings, settings);
    }

    #[tokio::test]
    async fn test_stop_tracking_removes_task_and_keeps_state() {
        let f = fixture();
        let courier_id = Uuid::new_v4();
        f.scheduler.start_tracking(courier_id, None).await.unwrap();
        f.scheduler.stop_tracking(courier_id).await.unwrap();

        let status = f.scheduler.status().await;
        assert!(status.monitored_couriers.is_empty());

        // State toggled off, not deleted.
        let state = f.states.get(courier_id).await.unwrap().unwrap();
        assert!(!state.tracking);
    }

    #[tokio::test]
    async fn test_resume_tracking_rebuilds_registry() {
        let f = fixture();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for courier_id in [a, b] {
            f.pipeline
                .set_tracking(courier_id, true, None)
                .await
                .unwrap();
        }
        // A courier that stopped tracking must not be resumed.
        f.pipeline
            .set_tracking(Uuid::new_v4(), false, None)
            .await
            .unwrap();

        let resumed = f.scheduler.resume_tracking().await.unwrap();
        assert_eq!(resumed, 2);

        let status = f.scheduler.status().await;
        assert_eq!(status.monitored_couriers.len(), 2);
        assert!(status.monitored_couriers.contains(&a));
        assert!(status.monitored_couriers.contains(&b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_detects_transitions_from_last_location() {
        use crate::delivery::{destination_geofence, origin_geofence, StartTrackingRequest};
        use domain::models::courier_location::LocationUpdateRequest;
        use domain::models::order_tracking::OrderTracking;

        let f = fixture();
        let courier_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        let pickup = GeoPoint::new(12.5683, 55.6761);

        let request = StartTrackingRequest {
            order_id,
            courier_id,
            pickup,
            dropoff: GeoPoint::new(12.7, 55.75),
            store_id: None,
            customer_id: None,
            settings: None,
        };
        let config = TrackingConfig::default();
        let now = chrono::Utc::now();
        let origin = origin_geofence(&request, &config, now);
        let destination = destination_geofence(&request, &config, now);
        f.geofences.create(&origin).await.unwrap();
        f.geofences.create(&destination).await.unwrap();
        let mut tracking = OrderTracking::new(order_id);
        tracking.enable(courier_id);
        f.orders.upsert(&tracking).await.unwrap();

        // Push a sample at the store with detection disabled by having no
        // polling yet, then start polling and let a tick fire.
        f.scheduler.start_tracking(courier_id, None).await.unwrap();
        f.pipeline
            .process_update(LocationUpdateRequest {
                courier_id,
                coordinates: pickup,
                accuracy: Some(10.0),
                heading: None,
                speed: None,
            })
            .await
            .unwrap();
        // The push already produced the enter; subsequent polls re-evaluate
        // the same sample and must stay quiet (idempotence).
        tokio::time::sleep(Duration::from_millis(5_100)).await;

        let events = f.events.all().await;
        assert_eq!(events.len(), 1);

        f.scheduler.shutdown().await;
        f.scheduler.wait_for_shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_task_dispatches_queued_events() {
        let f = fixture();
        // Seed a fence + pending event through the pipeline by a direct push.
        use crate::delivery::{origin_geofence, StartTrackingRequest};
        use domain::models::courier_location::LocationUpdateRequest;
        use domain::models::order_tracking::OrderTracking;

        let courier_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        let pickup = GeoPoint::new(12.5683, 55.6761);
        let request = StartTrackingRequest {
            order_id,
            courier_id,
            pickup,
            dropoff: GeoPoint::new(12.7, 55.75),
            store_id: None,
            customer_id: None,
            settings: None,
        };
        let fence = origin_geofence(&request, &TrackingConfig::default(), chrono::Utc::now());
        f.geofences.create(&fence).await.unwrap();
        let mut tracking = OrderTracking::new(order_id);
        tracking.enable(courier_id);
        f.orders.upsert(&tracking).await.unwrap();

        f.pipeline
            .process_update(LocationUpdateRequest {
                courier_id,
                coordinates: pickup,
                accuracy: Some(10.0),
                heading: None,
                speed: None,
            })
            .await
            .unwrap();
        assert_eq!(f.scheduler.status().await.queue_depth, 1);

        f.scheduler.start_drain().await;
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        assert_eq!(f.scheduler.status().await.queue_depth, 0);
        let events = f.events.all().await;
        assert!(events[0].processed);
        assert!(events[0].notification.sent);

        f.scheduler.shutdown().await;
        f.scheduler.wait_for_shutdown(Duration::from_secs(2)).await;
    }
}
