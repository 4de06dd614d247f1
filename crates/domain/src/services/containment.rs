//! Pure geofence containment engine.
//!
//! Circle containment uses the haversine great-circle distance over a
//! spherical earth. Polygon containment is delegated to the `geo` crate's
//! even-odd containment test; a point exactly on a polygon edge may resolve
//! to either side, but is deterministic for identical input.

use geo::{Contains, LineString, Point, Polygon};
use uuid::Uuid;

use crate::models::geofence::{Geofence, GeofenceShape};
use crate::models::point::GeoPoint;

/// Mean earth radius in meters for the spherical-earth approximation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters (haversine formula).
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Tests whether a shape contains a point. Circle boundaries are inclusive
/// (`distance <= radius`).
pub fn shape_contains(shape: &GeofenceShape, point: GeoPoint) -> bool {
    match shape {
        GeofenceShape::Circle {
            center,
            radius_meters,
        } => distance_meters(point, *center) <= *radius_meters,
        GeofenceShape::Polygon { ring } => {
            let exterior: LineString<f64> = ring
                .iter()
                .map(|v| (v.longitude, v.latitude))
                .collect::<Vec<_>>()
                .into();
            let polygon = Polygon::new(exterior, vec![]);
            polygon.contains(&Point::new(point.longitude, point.latitude))
        }
    }
}

/// Returns the active geofences containing `point`, ordered by descending
/// priority (the first entry is the most relevant for overlapping regions).
pub fn containing_geofences<'a>(point: GeoPoint, fences: &'a [Geofence]) -> Vec<&'a Geofence> {
    let mut containing: Vec<&Geofence> = fences
        .iter()
        .filter(|f| f.active && shape_contains(&f.shape, point))
        .collect();
    containing.sort_by(|a, b| b.priority.cmp(&a.priority));
    containing
}

/// Ids of the active geofences containing `point`, descending priority.
pub fn containing(point: GeoPoint, fences: &[Geofence]) -> Vec<Uuid> {
    containing_geofences(point, fences)
        .into_iter()
        .map(|f| f.id)
        .collect()
}
