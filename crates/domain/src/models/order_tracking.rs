//! Order-scoped delivery tracking projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::point::GeoPoint;

/// Lifecycle of geofence tracking for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    #[default]
    NotStarted,
    Active,
    Paused,
    Completed,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Domain milestones derived from geofence transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneType {
    StoreReached,
    CustomerApproaching,
    CustomerReached,
    DeliveryCompleted,
}

impl MilestoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoreReached => "store_reached",
            Self::CustomerApproaching => "customer_approaching",
            Self::CustomerReached => "customer_reached",
            Self::DeliveryCompleted => "delivery_completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "store_reached" => Some(Self::StoreReached),
            "customer_approaching" => Some(Self::CustomerApproaching),
            "customer_reached" => Some(Self::CustomerReached),
            "delivery_completed" => Some(Self::DeliveryCompleted),
            _ => None,
        }
    }

    /// Default human-readable description for the milestone.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::StoreReached => "Driver has reached the store",
            Self::CustomerApproaching => "Driver is approaching customer location",
            Self::CustomerReached => "Driver has reached customer location",
            Self::DeliveryCompleted => "Delivery completed successfully",
        }
    }
}

impl std::fmt::Display for MilestoneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in an order's milestone timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingMilestone {
    pub milestone_type: MilestoneType,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    pub description: String,
}

impl TrackingMilestone {
    pub fn new(milestone_type: MilestoneType, location: Option<GeoPoint>, now: DateTime<Utc>) -> Self {
        Self {
            milestone_type,
            timestamp: now,
            location,
            description: milestone_type.describe().to_string(),
        }
    }
}

/// Last location snapshot recorded on the order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastLocationUpdate {
    pub point: GeoPoint,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// Geofence tracking projection for one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTracking {
    pub order_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_id: Option<Uuid>,
    pub enabled: bool,
    pub geofence_ids: Vec<Uuid>,
    pub status: TrackingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_location: Option<LastLocationUpdate>,
    /// Append-only milestone timeline.
    pub milestones: Vec<TrackingMilestone>,
}

impl OrderTracking {
    pub fn new(order_id: Uuid) -> Self {
        Self {
            order_id,
            courier_id: None,
            enabled: false,
            geofence_ids: Vec::new(),
            status: TrackingStatus::NotStarted,
            last_location: None,
            milestones: Vec::new(),
        }
    }

    /// Turns tracking on and moves the order into the active status.
    pub fn enable(&mut self, courier_id: Uuid) {
        self.enabled = true;
        self.courier_id = Some(courier_id);
        self.status = TrackingStatus::Active;
    }

    /// Turns tracking off; the order is done regardless of geofence state.
    pub fn complete(&mut self) {
        self.enabled = false;
        self.status = TrackingStatus::Completed;
    }

    pub fn bind_geofence(&mut self, geofence_id: Uuid) {
        if !self.geofence_ids.contains(&geofence_id) {
            self.geofence_ids.push(geofence_id);
        }
    }

    pub fn record_location(&mut self, point: GeoPoint, accuracy: Option<f64>, now: DateTime<Utc>) {
        self.last_location = Some(LastLocationUpdate {
            point,
            timestamp: now,
            accuracy,
        });
    }

    /// Appends to the timeline. The timeline only grows.
    pub fn push_milestone(&mut self, milestone: TrackingMilestone) {
        self.milestones.push(milestone);
    }

    pub fn has_milestone(&self, milestone_type: MilestoneType) -> bool {
        self.milestones
            .iter()
            .any(|m| m.milestone_type == milestone_type)
    }
}
