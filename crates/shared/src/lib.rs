//! Shared utilities for the courier tracking backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Validation helpers for coordinates, location samples and geofence geometry

pub mod validation;
