//! Transition detection between containment sets.
//!
//! Compares a freshly computed containment set against a courier's previous
//! memberships and yields the entered/exited deltas. Applying the same
//! location twice is idempotent: membership reflects the set, not the
//! history of calls.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::courier_location::CourierLocation;
use crate::models::courier_state::CourierState;

/// Raw set-difference between previous and current containment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionDelta {
    /// Newly containing geofences, in containment (priority) order.
    pub entered: Vec<Uuid>,
    /// No-longer-containing geofences, in previous membership order.
    pub exited: Vec<Uuid>,
}

impl TransitionDelta {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

/// An exit paired with the dwell time of the membership it closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitedTransition {
    pub geofence_id: Uuid,
    pub dwell_ms: i64,
}

/// Deltas after they have been applied to the courier state.
#[derive(Debug, Clone, Default)]
pub struct AppliedTransitions {
    pub entered: Vec<Uuid>,
    pub exited: Vec<ExitedTransition>,
}

impl AppliedTransitions {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

/// Computes entered/exited sets. `previous_order` supplies a stable ordering
/// for the exited ids.
pub fn detect(
    previous_order: &[Uuid],
    previous: &HashSet<Uuid>,
    current: &[Uuid],
) -> TransitionDelta {
    let current_set: HashSet<Uuid> = current.iter().copied().collect();

    TransitionDelta {
        entered: current
            .iter()
            .filter(|id| !previous.contains(id))
            .copied()
            .collect(),
        exited: previous_order
            .iter()
            .filter(|id| !current_set.contains(id))
            .copied()
            .collect(),
    }
}

/// Applies a detection pass to the courier state: records the location
/// unconditionally, opens memberships for entered geofences and closes
/// memberships (computing dwell) for exited ones.
pub fn apply(
    state: &mut CourierState,
    location: &CourierLocation,
    current: &[Uuid],
    now: DateTime<Utc>,
) -> AppliedTransitions {
    let previous_order: Vec<Uuid> = state
        .active_memberships
        .iter()
        .map(|m| m.geofence_id)
        .collect();
    let previous = state.active_geofence_ids();
    let delta = detect(&previous_order, &previous, current);

    for geofence_id in &delta.entered {
        state.add_membership(*geofence_id, location.point, now);
    }

    let mut exited = Vec::with_capacity(delta.exited.len());
    for geofence_id in &delta.exited {
        if let Some(dwell_ms) = state.remove_membership(*geofence_id, location.point, now) {
            exited.push(ExitedTransition {
                geofence_id: *geofence_id,
                dwell_ms,
            });
        }
    }

    state.record_location(location.clone(), now);

    AppliedTransitions {
        entered: delta.entered,
        exited,
    }
}
