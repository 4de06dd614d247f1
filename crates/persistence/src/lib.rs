//! Persistence layer for the courier tracking backend.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Repository implementations of the domain store traits
//! - In-memory store implementations for tests and embedded use

pub mod db;
pub mod entities;
pub mod memory;
pub mod repositories;
