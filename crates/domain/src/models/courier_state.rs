//! Per-courier geofence tracking state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::courier_location::CourierLocation;
use super::point::GeoPoint;

/// Bound on the recently-exited membership history.
const MAX_EXITED_HISTORY: usize = 20;

/// An active geofence membership: the courier is currently inside.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceMembership {
    pub geofence_id: Uuid,
    pub entered_at: DateTime<Utc>,
    pub entry_location: GeoPoint,
}

/// A recently-exited membership, kept for a bounded history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExitedMembership {
    pub geofence_id: Uuid,
    pub exited_at: DateTime<Utc>,
    pub exit_location: GeoPoint,
}

/// Per-courier tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSettings {
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default = "default_accuracy_threshold_meters")]
    pub accuracy_threshold_meters: f64,

    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
}

fn default_update_interval_ms() -> u64 {
    5_000
}

fn default_accuracy_threshold_meters() -> f64 {
    100.0
}

fn default_notifications_enabled() -> bool {
    true
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            accuracy_threshold_meters: default_accuracy_threshold_meters(),
            notifications_enabled: default_notifications_enabled(),
        }
    }
}

/// Mutable tracking record for one courier.
///
/// Created on the courier's first location update; mutated exclusively
/// through the detection pipeline; never deleted, only toggled inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierState {
    pub courier_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_location: Option<CourierLocation>,
    /// Geofences currently containing the courier.
    pub active_memberships: Vec<GeofenceMembership>,
    /// Recently exited geofences, newest last, bounded.
    pub exited_memberships: Vec<ExitedMembership>,
    pub tracking: bool,
    pub settings: TrackingSettings,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CourierState {
    pub fn new(courier_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            courier_id,
            current_location: None,
            active_memberships: Vec::new(),
            exited_memberships: Vec::new(),
            tracking: false,
            settings: TrackingSettings::default(),
            last_updated: now,
            created_at: now,
        }
    }

    /// Ids of the geofences the courier is currently inside.
    pub fn active_geofence_ids(&self) -> HashSet<Uuid> {
        self.active_memberships
            .iter()
            .map(|m| m.geofence_id)
            .collect()
    }

    /// Records a fresh location sample. Always applied, transition or not.
    pub fn record_location(&mut self, location: CourierLocation, now: DateTime<Utc>) {
        self.current_location = Some(location);
        self.last_updated = now;
    }

    /// Adds an active membership, replacing any stale entry for the same
    /// geofence.
    pub fn add_membership(&mut self, geofence_id: Uuid, location: GeoPoint, now: DateTime<Utc>) {
        self.active_memberships.retain(|m| m.geofence_id != geofence_id);
        self.active_memberships.push(GeofenceMembership {
            geofence_id,
            entered_at: now,
            entry_location: location,
        });
    }

    /// Moves a membership from active to the exited history and returns the
    /// dwell duration in milliseconds, or `None` when the courier was not
    /// inside that geofence.
    pub fn remove_membership(
        &mut self,
        geofence_id: Uuid,
        location: GeoPoint,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        let membership = self
            .active_memberships
            .iter()
            .find(|m| m.geofence_id == geofence_id)
            .cloned()?;

        self.active_memberships.retain(|m| m.geofence_id != geofence_id);
        self.exited_memberships.push(ExitedMembership {
            geofence_id,
            exited_at: now,
            exit_location: location,
        });
        if self.exited_memberships.len() > MAX_EXITED_HISTORY {
            let excess = self.exited_memberships.len() - MAX_EXITED_HISTORY;
            self.exited_memberships.drain(..excess);
        }

        Some((now - membership.entered_at).num_milliseconds().max(0))
    }

    /// True when the last sample is too old to evaluate: older than twice
    /// the polling interval.
    pub fn is_location_stale(&self, now: DateTime<Utc>) -> bool {
        match &self.current_location {
            Some(location) => {
                location.age_ms(now) > (self.settings.update_interval_ms as i64) * 2
            }
            None => true,
        }
    }

    /// True when the last sample's accuracy exceeds the configured
    /// threshold. Samples without accuracy are accepted.
    pub fn is_location_inaccurate(&self) -> bool {
        match &self.current_location {
            Some(location) => location
                .accuracy
                .map(|a| a > self.settings.accuracy_threshold_meters)
                .unwrap_or(false),
            None => false,
        }
    }
}
