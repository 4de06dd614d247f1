//! Geofence transition event model.
//!
//! Events are append-only: once created they are immutable except for the
//! processed/notification/retry bookkeeping mutated by the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::courier_location::CourierLocation;
use super::geofence::NotificationChannel;

/// Default retry budget for event notification delivery.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Geofence transition direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceAction {
    Enter,
    Exit,
}

impl GeofenceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enter" => Some(Self::Enter),
            "exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

impl std::fmt::Display for GeofenceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Correlation and measurement metadata on an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_id: Option<Uuid>,
    /// Distance from the geofence center, populated for circles only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    /// Dwell time inside the geofence, populated for exit events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dwell_ms: Option<i64>,
}

/// Outcome reported by the notification transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl DeliveryResult {
    pub fn sent(provider: &str) -> Self {
        Self {
            success: true,
            error: None,
            provider: Some(provider.to_string()),
        }
    }

    pub fn failed(error: &str, provider: &str) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            provider: Some(provider.to_string()),
        }
    }
}

/// Notification bookkeeping carried on an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub channel: NotificationChannel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DeliveryResult>,
}

/// A single enter/exit transition for one courier and one geofence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceEvent {
    pub id: Uuid,
    pub courier_id: Uuid,
    pub geofence_id: Uuid,
    pub action: GeofenceAction,
    /// Location snapshot at detection time.
    pub location: CourierLocation,
    #[serde(default)]
    pub metadata: EventMetadata,
    #[serde(default)]
    pub notification: NotificationRecord,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
}

impl GeofenceEvent {
    /// Creates a transition event with a fresh identity.
    pub fn new(
        courier_id: Uuid,
        geofence_id: Uuid,
        action: GeofenceAction,
        location: CourierLocation,
        metadata: EventMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            courier_id,
            geofence_id,
            action,
            location,
            metadata,
            notification: NotificationRecord::default(),
            processed: false,
            processed_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: now,
        }
    }

    /// Marks the event fully handled.
    pub fn mark_processed(&mut self, now: DateTime<Utc>) {
        self.processed = true;
        self.processed_at = Some(now);
    }

    /// Records the outcome of a notification send attempt.
    pub fn mark_notification(
        &mut self,
        result: DeliveryResult,
        title: Option<String>,
        message: Option<String>,
        channel: NotificationChannel,
        now: DateTime<Utc>,
    ) {
        self.notification.sent = result.success;
        if result.success {
            self.notification.sent_at = Some(now);
        }
        self.notification.title = title;
        self.notification.message = message;
        self.notification.channel = channel;
        self.notification.result = Some(result);
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    /// Still eligible for the unprocessed queue.
    pub fn is_retryable(&self) -> bool {
        !self.processed && self.retry_count < self.max_retries
    }

    /// Terminal failure state: retry budget exhausted, never processed.
    /// Distinguishable from "pending" and from "processed".
    pub fn is_dead_lettered(&self) -> bool {
        !self.processed && self.retry_count >= self.max_retries
    }
}
