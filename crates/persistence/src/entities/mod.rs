//! Entity definitions (database row mappings).

pub mod courier_state;
pub mod geofence;
pub mod geofence_event;
pub mod order_tracking;

pub use courier_state::CourierStateEntity;
pub use geofence::GeofenceEntity;
pub use geofence_event::GeofenceEventEntity;
pub use order_tracking::OrderTrackingEntity;
