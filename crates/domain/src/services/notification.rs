//! Notification sending contract and trigger rendering.
//!
//! The engine renders trigger templates into user-facing notifications and
//! hands them to a [`NotificationSender`] capability. Actual transport
//! (push/SMS providers) lives outside this workspace.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use uuid::Uuid;

use crate::models::geofence::{Geofence, NotificationChannel, TriggerTemplate};
use crate::models::geofence_event::{DeliveryResult, GeofenceAction};

/// A trigger template rendered against a concrete geofence.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNotification {
    pub title: String,
    pub message: String,
    pub channel: NotificationChannel,
}

/// Renders the geofence's trigger for the given action. Returns `None` when
/// the geofence has no template for that side of the transition; there is
/// nothing to notify.
pub fn render_trigger(geofence: &Geofence, action: GeofenceAction) -> Option<RenderedNotification> {
    let template: &TriggerTemplate = match action {
        GeofenceAction::Enter => geofence.triggers.on_enter.as_ref()?,
        GeofenceAction::Exit => geofence.triggers.on_exit.as_ref()?,
    };

    let (default_title, default_message) = match action {
        GeofenceAction::Enter => (
            format!("{} - Entered", geofence.name),
            format!("You have entered {}", geofence.name),
        ),
        GeofenceAction::Exit => (
            format!("{} - Exited", geofence.name),
            format!("You have exited {}", geofence.name),
        ),
    };

    Some(RenderedNotification {
        title: template.title.clone().unwrap_or(default_title),
        message: template.message.clone().unwrap_or(default_message),
        channel: template.channel,
    })
}

/// Capability for delivering a notification to a user.
#[async_trait::async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        channel: NotificationChannel,
    ) -> DeliveryResult;
}

/// A notification captured by the mock sender.
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub channel: NotificationChannel,
}

/// Mock notification sender for development and testing.
///
/// Logs notifications instead of delivering them, and can be scripted to
/// fail the first N sends to exercise retry handling.
#[derive(Debug, Default)]
pub struct MockNotificationSender {
    fail_remaining: AtomicUsize,
    sent: Mutex<Vec<SentNotification>>,
}

impl MockNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender whose next `n` sends fail before succeeding.
    pub fn failing_times(n: usize) -> Self {
        Self {
            fail_remaining: AtomicUsize::new(n),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A sender that fails every send.
    pub fn failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    /// Notifications accepted so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().expect("mock sender lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl NotificationSender for MockNotificationSender {
    async fn send(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        channel: NotificationChannel,
    ) -> DeliveryResult {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            }
            tracing::warn!(
                user_id = %user_id,
                title = %title,
                "Mock notification sender simulating failure"
            );
            return DeliveryResult::failed("Simulated failure", "mock");
        }

        tracing::info!(
            user_id = %user_id,
            title = %title,
            channel = channel.as_str(),
            "Mock: would send notification"
        );
        self.sent
            .lock()
            .expect("mock sender lock poisoned")
            .push(SentNotification {
                user_id,
                title: title.to_string(),
                message: message.to_string(),
                channel,
            });

        DeliveryResult::sent("mock")
    }
}
