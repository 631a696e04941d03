//! Wire-level frame definitions for the WebSocket adapter.
//!
//! Incoming frames are one JSON object tagged by `type`. Decoding is strict
//! on the tag and lenient on the payload: optional fields default rather
//! than reject, because driver apps in the field omit them freely.

use serde::{Deserialize, Serialize};

use crate::domain::messages::{
    normalize_driver_id, DriverLocationPing, PassengerInfoMessage, PickupSpot, RideOfferResponse,
};

/// Every frame a client may send, tagged by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth(AuthFrame),
    LocationUpdate(LocationFrame),
    RideResponse(RideResponseFrame),
    RideDetails(RideDetailsFrame),
}

/// First frame on every connection.
#[derive(Debug, Deserialize)]
pub struct AuthFrame {
    pub token: String,
}

/// Driver position report.
#[derive(Debug, Deserialize)]
pub struct LocationFrame {
    #[serde(default)]
    pub ride_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed_kmh: f64,
    #[serde(default)]
    pub heading_degrees: f64,
}

/// Coordinates attached to a ride response.
#[derive(Debug, Default, Deserialize)]
pub struct ResponseLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Driver accept/decline of an offer.
#[derive(Debug, Deserialize)]
pub struct RideResponseFrame {
    #[serde(default)]
    pub offer_id: String,
    pub ride_id: String,
    #[serde(default)]
    pub driver_id: String,
    pub accepted: bool,
    #[serde(default)]
    pub current_location: ResponseLocation,
}

/// Passenger pickup details for the matched driver.
#[derive(Debug, Deserialize)]
pub struct RideDetailsFrame {
    pub ride_id: String,
    #[serde(default)]
    pub passenger_name: String,
    #[serde(default)]
    pub passenger_phone: String,
    #[serde(default)]
    pub pickup_location: PickupSpot,
}

/// Ack sent once authentication succeeds.
#[derive(Debug, Serialize)]
pub struct AuthAck {
    pub status: &'static str,
}

impl AuthAck {
    pub fn authenticated() -> Self {
        Self {
            status: "authenticated",
        }
    }
}

impl LocationFrame {
    /// Attach the session's identity; the frame's own driver id is not
    /// trusted.
    pub fn into_ping(self, session_user_id: &str) -> DriverLocationPing {
        DriverLocationPing {
            driver_id: session_user_id.to_string(),
            ride_id: self.ride_id,
            latitude: self.latitude,
            longitude: self.longitude,
            speed_kmh: self.speed_kmh,
            heading_degrees: self.heading_degrees,
        }
    }
}

impl RideResponseFrame {
    /// Prefer the session identity; fall back to the frame's driver id,
    /// with or without the `driver_` prefix.
    pub fn into_response(self, session_user_id: &str) -> RideOfferResponse {
        let driver_id = if self.driver_id.is_empty() {
            session_user_id.to_string()
        } else {
            normalize_driver_id(&self.driver_id).to_string()
        };
        RideOfferResponse {
            offer_id: self.offer_id,
            ride_id: self.ride_id,
            driver_id,
            accepted: self.accepted,
            latitude: self.current_location.latitude,
            longitude: self.current_location.longitude,
        }
    }
}

impl RideDetailsFrame {
    pub fn into_message(self) -> PassengerInfoMessage {
        PassengerInfoMessage {
            kind: "ride_details".to_string(),
            ride_id: self.ride_id,
            passenger_name: self.passenger_name,
            passenger_phone: self.passenger_phone,
            pickup_location: self.pickup_location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn decodes_ride_response_frames() {
        let raw = r#"{
            "type": "ride_response",
            "offer_id": "offer-1",
            "ride_id": "r-1",
            "driver_id": "driver_abc",
            "accepted": true,
            "current_location": { "latitude": 43.24, "longitude": 76.89 }
        }"#;
        let frame: ClientFrame = serde_json::from_str(raw).expect("decode");
        let ClientFrame::RideResponse(frame) = frame else {
            panic!("expected ride_response");
        };
        let response = frame.into_response("session-id");
        assert_eq!(response.driver_id, "abc");
        assert!(response.accepted);
        assert!((response.latitude - 43.24).abs() < 1e-9);
    }

    #[rstest]
    fn ride_response_without_driver_id_uses_the_session_identity() {
        let raw = r#"{ "type": "ride_response", "ride_id": "r-1", "accepted": false }"#;
        let frame: ClientFrame = serde_json::from_str(raw).expect("decode");
        let ClientFrame::RideResponse(frame) = frame else {
            panic!("expected ride_response");
        };
        let response = frame.into_response("7c9e6679-7425-40de-944b-e07fc1f90ae7");
        assert_eq!(response.driver_id, "7c9e6679-7425-40de-944b-e07fc1f90ae7");
        assert!(!response.accepted);
    }

    #[rstest]
    fn decodes_location_update_frames_with_defaults() {
        let raw = r#"{ "type": "location_update", "latitude": 43.25, "longitude": 76.93 }"#;
        let frame: ClientFrame = serde_json::from_str(raw).expect("decode");
        let ClientFrame::LocationUpdate(frame) = frame else {
            panic!("expected location_update");
        };
        let ping = frame.into_ping("abc");
        assert_eq!(ping.driver_id, "abc");
        assert_eq!(ping.speed_kmh, 0.0);
        assert!(ping.ride_id.is_none());
    }

    #[rstest]
    fn unknown_frame_types_fail_to_decode() {
        let raw = r#"{ "type": "teleport", "latitude": 1.0 }"#;
        assert!(serde_json::from_str::<ClientFrame>(raw).is_err());
    }

    #[rstest]
    fn auth_ack_shape_is_stable() {
        let ack = serde_json::to_string(&AuthAck::authenticated()).expect("serialize");
        assert_eq!(ack, r#"{"status":"authenticated"}"#);
    }
}
