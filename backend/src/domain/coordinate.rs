//! Geotagged points owned by passengers, drivers and ride endpoints.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UnknownVariant;

/// Discriminator for the entity a coordinate belongs to. For any
/// `(entity_id, entity_type)` pair at most one row has `is_current = true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Driver,
    Passenger,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Passenger => "passenger",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "driver" => Ok(Self::Driver),
            "passenger" => Ok(Self::Passenger),
            other => Err(UnknownVariant::new("entity type", other)),
        }
    }
}

/// A stored geotagged point. The optional fare/distance/duration attachments
/// are set when the coordinate describes a ride endpoint.
#[derive(Debug, Clone)]
pub struct Coordinate {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: EntityType,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub fare_amount: Option<f64>,
    pub distance_km: Option<f64>,
    pub duration_minutes: Option<i32>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One driver location report bound for `location_history` and the current-
/// coordinate upsert.
#[derive(Debug, Clone)]
pub struct LocationSample {
    pub driver_id: Uuid,
    pub ride_id: Option<Uuid>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_degrees: Option<f64>,
}

/// Inclusive latitude/longitude range check shared by every inbound surface.
pub fn validate_lat_lng(lat: f64, lng: f64) -> Result<(), super::Error> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(super::Error::invalid_request(
            "latitude out of range (-90..90)",
        ));
    }
    if !(-180.0..=180.0).contains(&lng) {
        return Err(super::Error::invalid_request(
            "longitude out of range (-180..180)",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(90.0, 180.0, true)]
    #[case(-90.0, -180.0, true)]
    #[case(0.0, 0.0, true)]
    #[case(90.0001, 0.0, false)]
    #[case(-90.0001, 0.0, false)]
    #[case(0.0, 180.0001, false)]
    #[case(0.0, -180.0001, false)]
    fn boundary_values_are_inclusive(#[case] lat: f64, #[case] lng: f64, #[case] ok: bool) {
        assert_eq!(validate_lat_lng(lat, lng).is_ok(), ok);
    }

    #[rstest]
    fn entity_type_round_trips() {
        assert_eq!("driver".parse::<EntityType>().expect("parse"), EntityType::Driver);
        assert_eq!(EntityType::Passenger.to_string(), "passenger");
    }
}
