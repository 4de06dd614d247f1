//! Domain services for courier tracking.
//!
//! Pure detection logic plus the notification sending contract.

pub mod containment;
pub mod notification;
pub mod transition;

pub use notification::{
    render_trigger, MockNotificationSender, NotificationSender, RenderedNotification,
};
pub use transition::{AppliedTransitions, ExitedTransition, TransitionDelta};
