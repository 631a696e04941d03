//! Message shapes exchanged over the broker and the in-process hub channels.
//!
//! Everything here is plain JSON with snake_case fields; these shapes are the
//! wire contract between services and with connected clients, so field names
//! must stay stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::driver::{VehicleDescription, VehicleType};

/// Bare latitude/longitude pair used inside broker messages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A geotagged endpoint with its display address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedLocation {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

/// Offer fanned out to drivers when a passenger requests a ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequestedMessage {
    pub ride_id: String,
    pub ride_number: String,
    pub pickup_location: NamedLocation,
    pub destination_location: NamedLocation,
    pub ride_type: VehicleType,
    pub estimated_fare: f64,
    pub max_distance_km: f64,
    pub timeout_seconds: u32,
    pub correlation_id: String,
}

/// Driver identity block attached to an accepted offer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverSummary {
    pub name: String,
    pub rating: f64,
    pub vehicle: VehicleDescription,
}

/// A driver's answer to an offer, enriched with profile and arrival estimate
/// before it reaches the matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverResponseMessage {
    pub ride_id: String,
    #[serde(default)]
    pub offer_id: String,
    pub driver_id: String,
    pub accepted: bool,
    pub estimated_arrival_minutes: i64,
    pub driver_location: GeoPoint,
    #[serde(default)]
    pub driver_info: DriverSummary,
    pub estimated_arrival: DateTime<Utc>,
    pub responded_at: DateTime<Utc>,
}

/// Live driver position relayed to the matched passenger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdateMessage {
    pub driver_id: String,
    #[serde(default)]
    pub ride_id: Option<String>,
    pub location: GeoPoint,
    #[serde(default)]
    pub speed_kmh: f64,
    #[serde(default)]
    pub heading_degrees: f64,
    pub timestamp: DateTime<Utc>,
}

/// Ride lifecycle notification pushed towards the passenger session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideStatusUpdateMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub ride_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Pickup metadata a passenger shares with the matched driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PickupSpot {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub notes: String,
}

/// Passenger details forwarded to the matched driver after acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassengerInfoMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub ride_id: String,
    #[serde(default)]
    pub passenger_name: String,
    #[serde(default)]
    pub passenger_phone: String,
    #[serde(default)]
    pub pickup_location: PickupSpot,
}

/// Raw accept/decline received on a driver WebSocket, before enrichment.
#[derive(Debug, Clone)]
pub struct RideOfferResponse {
    pub offer_id: String,
    pub ride_id: String,
    pub driver_id: String,
    pub accepted: bool,
    pub latitude: f64,
    pub longitude: f64,
}

/// Raw location report received on a driver WebSocket, before it becomes a
/// [`LocationUpdateMessage`] on the fanout exchange.
#[derive(Debug, Clone)]
pub struct DriverLocationPing {
    pub driver_id: String,
    pub ride_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    pub heading_degrees: f64,
}

/// Client ids may arrive with or without the hub's `driver_` prefix; the
/// store only ever sees the bare identifier.
pub fn normalize_driver_id(raw: &str) -> &str {
    raw.strip_prefix("driver_").unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn ride_requested_message_wire_shape() {
        let msg = RideRequestedMessage {
            ride_id: "r-1".into(),
            ride_number: "RIDE_20250314_092653".into(),
            pickup_location: NamedLocation {
                lat: 43.2389,
                lng: 76.8897,
                address: "A".into(),
            },
            destination_location: NamedLocation {
                lat: 43.256,
                lng: 76.9286,
                address: "B".into(),
            },
            ride_type: VehicleType::Economy,
            estimated_fare: 1268.0,
            max_distance_km: 3.68,
            timeout_seconds: 30,
            correlation_id: "r-1".into(),
        };
        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["ride_type"], "ECONOMY");
        assert_eq!(value["pickup_location"]["lat"], 43.2389);
        assert_eq!(value["timeout_seconds"], 30);
        assert_eq!(value["correlation_id"], "r-1");
    }

    #[rstest]
    fn driver_response_tolerates_missing_optional_blocks() {
        let raw = r#"{
            "ride_id": "r-1",
            "driver_id": "driver_7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "accepted": true,
            "estimated_arrival_minutes": 4,
            "driver_location": { "lat": 43.24, "lng": 76.89 },
            "estimated_arrival": "2025-03-14T09:31:00Z",
            "responded_at": "2025-03-14T09:27:00Z"
        }"#;
        let msg: DriverResponseMessage = serde_json::from_str(raw).expect("decode");
        assert!(msg.accepted);
        assert_eq!(msg.offer_id, "");
        assert_eq!(
            normalize_driver_id(&msg.driver_id),
            "7c9e6679-7425-40de-944b-e07fc1f90ae7"
        );
    }

    #[rstest]
    #[case("driver_abc", "abc")]
    #[case("abc", "abc")]
    #[case("driver_", "")]
    fn driver_id_prefix_is_tolerated(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_driver_id(raw), expected);
    }

    #[rstest]
    fn passenger_info_round_trips_type_field() {
        let msg = PassengerInfoMessage {
            kind: "ride_details".into(),
            ride_id: "r-1".into(),
            passenger_name: "Aliya".into(),
            passenger_phone: "+7 700 000 0000".into(),
            pickup_location: PickupSpot {
                latitude: 43.2389,
                longitude: 76.8897,
                address: "A".into(),
                notes: "main entrance".into(),
            },
        };
        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["type"], "ride_details");
        let back: PassengerInfoMessage =
            serde_json::from_value(value).expect("decode");
        assert_eq!(back.pickup_location.notes, "main entrance");
    }
}
