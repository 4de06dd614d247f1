//! Notification dispatcher.
//!
//! Turns pending geofence events into user-facing notifications and keeps
//! the processed/retry bookkeeping on each event. Sender failures are data,
//! not errors: the event stays unprocessed and its retry count grows until
//! the budget is exhausted, at which point it is dead-lettered.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{debug, error, info, warn};

use domain::models::geofence_event::GeofenceEvent;
use domain::services::notification::{render_trigger, NotificationSender};
use domain::stores::{EventStore, GeofenceStore, StoreError};

use crate::error::EngineError;

/// Outcome of dispatching a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Notification accepted by the sender; event processed.
    Delivered,
    /// Nothing to notify (no trigger template); event processed as a no-op.
    NoTemplate,
    /// Sender failed; retry count incremented.
    Failed {
        /// The failure exhausted the retry budget.
        dead_lettered: bool,
    },
    /// Event already processed or dead-lettered by another path.
    Skipped,
}

/// Aggregate outcome of a drain batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub dispatched: usize,
    pub delivered: usize,
    pub no_template: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Dispatches pending events through the notification sender.
pub struct NotificationDispatcher {
    events: Arc<dyn EventStore>,
    geofences: Arc<dyn GeofenceStore>,
    sender: Arc<dyn NotificationSender>,
}

impl NotificationDispatcher {
    pub fn new(
        events: Arc<dyn EventStore>,
        geofences: Arc<dyn GeofenceStore>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            events,
            geofences,
            sender,
        }
    }

    /// Dispatches one event. Mutates only the event's bookkeeping fields.
    pub async fn dispatch(&self, event: &GeofenceEvent) -> DispatchOutcome {
        // The queued copy may lag the stored bookkeeping (an event can reach
        // the dispatcher through both the queue and the unprocessed query).
        let refreshed = match self.events.get(event.id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => event.clone(),
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "Failed to refresh event; using queued copy");
                event.clone()
            }
        };
        if !refreshed.is_retryable() {
            debug!(event_id = %refreshed.id, "Event no longer pending; skipping dispatch");
            return DispatchOutcome::Skipped;
        }
        let event = &refreshed;

        let fence = match self.geofences.get(event.geofence_id).await {
            Ok(fence) => fence,
            Err(err) => {
                error!(event_id = %event.id, error = %err, "Failed to load geofence for event");
                return self.record_failure(event, "geofence lookup failed").await;
            }
        };

        let rendered = fence.as_ref().and_then(|f| render_trigger(f, event.action));
        let Some(rendered) = rendered else {
            // No template (or the geofence is gone): nothing to notify.
            debug!(
                event_id = %event.id,
                geofence_id = %event.geofence_id,
                action = event.action.as_str(),
                "No trigger template for event; marking processed"
            );
            self.mark_processed(event).await;
            return DispatchOutcome::NoTemplate;
        };

        let result = self
            .sender
            .send(
                event.courier_id,
                &rendered.title,
                &rendered.message,
                rendered.channel,
            )
            .await;

        let now = Utc::now();
        let success = result.success;
        let mut updated = event.clone();
        updated.mark_notification(
            result,
            Some(rendered.title),
            Some(rendered.message),
            rendered.channel,
            now,
        );

        if let Err(err) = self
            .events
            .mark_notification(event.id, &updated.notification)
            .await
        {
            error!(event_id = %event.id, error = %err, "Failed to record notification result");
        }

        if success {
            counter!("geofence_notifications_sent_total").increment(1);
            info!(
                event_id = %event.id,
                courier_id = %event.courier_id,
                action = event.action.as_str(),
                "Geofence notification sent"
            );
            self.mark_processed(event).await;
            DispatchOutcome::Delivered
        } else {
            counter!("geofence_notifications_failed_total").increment(1);
            self.increment_retry(event).await
        }
    }

    /// Dispatches a batch sequentially. One event's failure never blocks the
    /// rest of the batch.
    pub async fn drain_batch(&self, batch: &[GeofenceEvent]) -> DrainSummary {
        let mut summary = DrainSummary::default();
        for event in batch {
            summary.dispatched += 1;
            match self.dispatch(event).await {
                DispatchOutcome::Delivered => summary.delivered += 1,
                DispatchOutcome::NoTemplate => summary.no_template += 1,
                DispatchOutcome::Failed { .. } => summary.failed += 1,
                DispatchOutcome::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Drains persisted unprocessed events (queue recovery after restart).
    pub async fn drain_pending(&self, limit: i64) -> Result<DrainSummary, EngineError> {
        let pending = self.events.find_unprocessed(limit).await?;
        if pending.is_empty() {
            return Ok(DrainSummary::default());
        }
        info!(count = pending.len(), "Draining persisted unprocessed events");
        Ok(self.drain_batch(&pending).await)
    }

    async fn mark_processed(&self, event: &GeofenceEvent) {
        if let Err(err) = self.events.mark_processed(event.id, Utc::now()).await {
            error!(event_id = %event.id, error = %err, "Failed to mark event processed");
        }
    }

    async fn record_failure(&self, event: &GeofenceEvent, reason: &str) -> DispatchOutcome {
        warn!(event_id = %event.id, reason = reason, "Event dispatch failed");
        counter!("geofence_notifications_failed_total").increment(1);
        self.increment_retry(event).await
    }

    async fn increment_retry(&self, event: &GeofenceEvent) -> DispatchOutcome {
        match self.events.increment_retry(event.id).await {
            Ok(()) => {
                let dead_lettered = event.retry_count + 1 >= event.max_retries;
                if dead_lettered {
                    counter!("geofence_events_dead_lettered_total").increment(1);
                    warn!(
                        event_id = %event.id,
                        retries = event.retry_count + 1,
                        "Event exhausted its retry budget; dead-lettered"
                    );
                }
                DispatchOutcome::Failed { dead_lettered }
            }
            Err(StoreError::NotFound(_)) => {
                warn!(event_id = %event.id, "Event vanished while incrementing retry");
                DispatchOutcome::Failed {
                    dead_lettered: false,
                }
            }
            Err(err) => {
                error!(event_id = %event.id, error = %err, "Failed to increment retry count");
                DispatchOutcome::Failed {
                    dead_lettered: false,
                }
            }
        }
    }
}
