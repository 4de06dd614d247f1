//! Geographic point type.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use validator::ValidationError;

/// A WGS84 coordinate pair, serialized as a `[longitude, latitude]` array
/// (geographic point convention, longitude first).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Checks both components against their valid ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        shared::validation::validate_longitude(self.longitude)?;
        shared::validation::validate_latitude(self.latitude)?;
        Ok(())
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(p: GeoPoint) -> Self {
        geo::Point::new(p.longitude, p.latitude)
    }
}

impl Serialize for GeoPoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.longitude)?;
        seq.serialize_element(&self.latitude)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for GeoPoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PointVisitor;

        impl<'de> Visitor<'de> for PointVisitor {
            type Value = GeoPoint;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a [longitude, latitude] array")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<GeoPoint, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let longitude: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let latitude: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                if seq.next_element::<f64>()?.is_some() {
                    return Err(de::Error::custom(
                        "expected exactly two coordinate components",
                    ));
                }
                Ok(GeoPoint {
                    longitude,
                    latitude,
                })
            }
        }

        deserializer.deserialize_seq(PointVisitor)
    }
}
