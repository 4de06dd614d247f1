//! Domain layer for the courier tracking backend.
//!
//! This crate contains:
//! - Domain models (Geofence, CourierState, GeofenceEvent, OrderTracking)
//! - Pure detection services (containment, transition)
//! - Collaborator contracts (stores, notification sender)

pub mod models;
pub mod services;
pub mod stores;
