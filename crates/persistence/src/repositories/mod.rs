//! Repository implementations of the domain store traits.

pub mod courier_state;
pub mod geofence;
pub mod geofence_event;
pub mod order_tracking;

pub use courier_state::CourierStateRepository;
pub use geofence::GeofenceRepository;
pub use geofence_event::GeofenceEventRepository;
pub use order_tracking::OrderTrackingRepository;
