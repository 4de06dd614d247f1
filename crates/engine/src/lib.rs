//! Courier geofence tracking engine.
//!
//! Ingests courier location samples, detects geofence enter/exit transitions
//! against per-courier state, turns transitions into retried,
//! notification-bearing events and projects order delivery milestones.

pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod locks;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod scheduler;

pub use config::{Config, TrackingConfig};
pub use delivery::StartTrackingRequest;
pub use dispatcher::{DispatchOutcome, DrainSummary, NotificationDispatcher};
pub use engine::{OrderTrackingView, StartedTracking, TrackingEngine};
pub use error::EngineError;
pub use pipeline::{DetectionPipeline, DetectionSummary, TickOutcome};
pub use scheduler::{MonitoringStatus, TrackingScheduler};
