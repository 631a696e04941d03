//! Ride coordinator: booking, cancellation and the matching/relay loops.
//!
//! The coordinator owns the ride state machine. Matching is decided by a
//! compare-and-swap on the ride status, so N concurrent accepts produce
//! exactly one winner without any in-process locking; losers are dropped
//! silently.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::coordinate::{validate_lat_lng, LocationSample};
use super::driver::VehicleType;
use super::geo;
use super::messages::{
    normalize_driver_id, DriverResponseMessage, LocationUpdateMessage, NamedLocation,
    PassengerInfoMessage, RideRequestedMessage, RideStatusUpdateMessage,
};
use super::ports::{
    ClientPush, EndpointDraft, EventPublisher, RideDraft, RidePersistenceError, RideRepository,
    RideTransition, TransitionOutcome,
};
use super::ride::{ride_number_for, RideStatus};
use super::Error;

/// Semantic TTL carried inside every offer; drivers ignore stale offers.
const OFFER_TIMEOUT_SECS: u32 = 30;

/// Minimum length of a human-entered address.
const MIN_ADDRESS_LEN: usize = 3;

/// A passenger's booking request, already syntactically decoded.
#[derive(Debug, Clone)]
pub struct RideBooking {
    pub passenger_id: Uuid,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub pickup_address: String,
    pub destination_latitude: f64,
    pub destination_longitude: f64,
    pub destination_address: String,
    pub ride_type: VehicleType,
}

/// What the passenger gets back from a successful booking.
#[derive(Debug, Clone)]
pub struct RideReceipt {
    pub ride_id: Uuid,
    pub ride_number: String,
    pub status: RideStatus,
    pub estimated_fare: f64,
    pub estimated_duration_minutes: i32,
    pub estimated_distance_km: f64,
}

/// Outcome of a cancellation.
#[derive(Debug, Clone)]
pub struct RideCancellation {
    pub ride_id: Uuid,
    pub status: RideStatus,
    pub cancelled_at: chrono::DateTime<Utc>,
}

pub struct RideCoordinator {
    rides: Arc<dyn RideRepository>,
    publisher: Arc<dyn EventPublisher>,
    sessions: Arc<dyn ClientPush>,
}

impl RideCoordinator {
    pub fn new(
        rides: Arc<dyn RideRepository>,
        publisher: Arc<dyn EventPublisher>,
        sessions: Arc<dyn ClientPush>,
    ) -> Self {
        Self {
            rides,
            publisher,
            sessions,
        }
    }

    /// Validate, price and persist a booking, then fan the offer out.
    ///
    /// The offer is published after the transaction commits; a publish
    /// failure leaves the ride REQUESTED and is only logged.
    pub async fn create_ride(&self, booking: RideBooking) -> Result<RideReceipt, Error> {
        validate_booking(&booking)?;

        let (distance_km, duration_min) = geo::estimate_route(
            booking.pickup_latitude,
            booking.pickup_longitude,
            booking.destination_latitude,
            booking.destination_longitude,
        );
        let estimated_fare = geo::estimate_fare(booking.ride_type, distance_km, duration_min);

        let draft = RideDraft {
            passenger_id: booking.passenger_id,
            vehicle_type: booking.ride_type,
            ride_number: ride_number_for(Utc::now()),
            pickup: EndpointDraft {
                latitude: booking.pickup_latitude,
                longitude: booking.pickup_longitude,
                address: booking.pickup_address.clone(),
            },
            destination: EndpointDraft {
                latitude: booking.destination_latitude,
                longitude: booking.destination_longitude,
                address: booking.destination_address.clone(),
            },
            estimated_fare,
            estimated_distance_km: distance_km,
            estimated_duration_minutes: duration_min,
            priority: 1,
        };

        let created = self.rides.create_ride(draft).await.map_err(map_ride_error)?;

        let offer = RideRequestedMessage {
            ride_id: created.ride_id.to_string(),
            ride_number: created.ride_number.clone(),
            pickup_location: NamedLocation {
                lat: booking.pickup_latitude,
                lng: booking.pickup_longitude,
                address: booking.pickup_address,
            },
            destination_location: NamedLocation {
                lat: booking.destination_latitude,
                lng: booking.destination_longitude,
                address: booking.destination_address,
            },
            ride_type: booking.ride_type,
            estimated_fare,
            max_distance_km: distance_km,
            timeout_seconds: OFFER_TIMEOUT_SECS,
            correlation_id: created.ride_id.to_string(),
        };
        if let Err(err) = self.publisher.publish_ride_requested(&offer).await {
            warn!(error = %err, ride_id = %created.ride_id, "failed to publish ride offer");
        }

        info!(ride_id = %created.ride_id, ride_number = %created.ride_number, "ride requested");

        Ok(RideReceipt {
            ride_id: created.ride_id,
            ride_number: created.ride_number,
            status: created.status,
            estimated_fare,
            estimated_duration_minutes: duration_min,
            estimated_distance_km: distance_km,
        })
    }

    /// Cancel a ride that has not been matched yet.
    pub async fn cancel_ride(&self, ride_id: Uuid, reason: &str) -> Result<RideCancellation, Error> {
        if reason.trim().is_empty() {
            return Err(Error::invalid_request("cancellation reason is required"));
        }

        let cancelled = self
            .rides
            .cancel(ride_id, reason.trim())
            .await
            .map_err(map_ride_error)?;

        info!(ride_id = %ride_id, "ride cancelled");
        Ok(RideCancellation {
            ride_id: cancelled.ride_id,
            status: RideStatus::Cancelled,
            cancelled_at: cancelled.cancelled_at,
        })
    }

    /// Consume one driver response from the broker. The first accepted
    /// response wins the status CAS; every later one sees `Conflict` and is
    /// dropped without side effects.
    pub async fn handle_driver_response(&self, msg: DriverResponseMessage) {
        if !msg.accepted {
            debug!(ride_id = %msg.ride_id, driver_id = %msg.driver_id, "driver declined offer");
            return;
        }

        let Ok(ride_id) = Uuid::parse_str(&msg.ride_id) else {
            warn!(ride_id = %msg.ride_id, "driver response carries a malformed ride id");
            return;
        };
        let Ok(driver_id) = Uuid::parse_str(normalize_driver_id(&msg.driver_id)) else {
            warn!(driver_id = %msg.driver_id, "driver response carries a malformed driver id");
            return;
        };

        let passenger_id = match self.rides.passenger_for_ride(ride_id).await {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, ride_id = %ride_id, "cannot resolve passenger for response");
                return;
            }
        };

        match self
            .rides
            .transition(ride_id, RideStatus::Requested, RideTransition::Matched { driver_id })
            .await
        {
            Ok(TransitionOutcome::Applied) => {
                info!(ride_id = %ride_id, driver_id = %driver_id, "ride matched");
                self.push_to_passenger(passenger_id, &msg);
            }
            Ok(TransitionOutcome::Conflict) => {
                debug!(ride_id = %ride_id, driver_id = %driver_id, "accept lost the matching race");
            }
            Err(err) => {
                warn!(error = %err, ride_id = %ride_id, "ride transition failed");
            }
        }
    }

    /// Consume one driver location from the fanout exchange: audit it and
    /// relay it to the passenger of the (non-terminal) ride.
    pub async fn handle_location_update(&self, msg: LocationUpdateMessage) {
        let Some(ride_id_raw) = msg.ride_id.as_deref() else {
            // A free-roaming driver position has no passenger to relay to.
            return;
        };
        let Ok(ride_id) = Uuid::parse_str(ride_id_raw) else {
            warn!(ride_id = %ride_id_raw, "location update carries a malformed ride id");
            return;
        };

        let status = match self.rides.ride_status(ride_id).await {
            Ok(status) => status,
            Err(err) => {
                warn!(error = %err, ride_id = %ride_id, "cannot resolve ride for location update");
                return;
            }
        };
        if status.is_terminal() {
            debug!(ride_id = %ride_id, status = %status, "dropping location update for finished ride");
            return;
        }

        if let Ok(driver_id) = Uuid::parse_str(normalize_driver_id(&msg.driver_id)) {
            let sample = LocationSample {
                driver_id,
                ride_id: Some(ride_id),
                latitude: msg.location.lat,
                longitude: msg.location.lng,
                accuracy_meters: None,
                speed_kmh: Some(msg.speed_kmh),
                heading_degrees: Some(msg.heading_degrees),
            };
            if let Err(err) = self.rides.record_location_event(ride_id, sample).await {
                warn!(error = %err, ride_id = %ride_id, "failed to audit location update");
            }
        }

        match self.rides.passenger_for_ride(ride_id).await {
            Ok(passenger_id) => self.push_to_passenger(passenger_id, &msg),
            Err(err) => {
                warn!(error = %err, ride_id = %ride_id, "cannot resolve passenger for location update");
            }
        }
    }

    /// Consume one ride status notification and relay it to the passenger.
    pub async fn handle_status_update(&self, msg: RideStatusUpdateMessage) {
        let Ok(ride_id) = Uuid::parse_str(&msg.ride_id) else {
            warn!(ride_id = %msg.ride_id, "status update carries a malformed ride id");
            return;
        };
        match self.rides.passenger_for_ride(ride_id).await {
            Ok(passenger_id) => self.push_to_passenger(passenger_id, &msg),
            Err(err) => {
                warn!(error = %err, ride_id = %ride_id, "cannot resolve passenger for status update");
            }
        }
    }

    /// Drain passenger-supplied ride details from the hub and republish them
    /// for the matched driver's service.
    pub async fn forward_passenger_info(&self, mut rx: mpsc::Receiver<PassengerInfoMessage>) {
        while let Some(mut info) = rx.recv().await {
            if info.kind.is_empty() {
                info.kind = "ride_details".to_string();
            }
            if let Err(err) = self.publisher.publish_passenger_info(&info).await {
                warn!(error = %err, ride_id = %info.ride_id, "failed to republish passenger info");
            }
        }
        debug!("passenger info channel closed");
    }

    fn push_to_passenger<T: serde::Serialize>(&self, passenger_id: Uuid, payload: &T) {
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "failed to serialize passenger push");
                return;
            }
        };
        let client_id = format!("passenger_{passenger_id}");
        if !self.sessions.send_to_client(&client_id, &body) {
            debug!(client_id = %client_id, "passenger not connected, push dropped");
        }
    }
}

fn validate_booking(booking: &RideBooking) -> Result<(), Error> {
    validate_lat_lng(booking.pickup_latitude, booking.pickup_longitude)
        .map_err(|err| Error::invalid_request(format!("invalid pickup coordinates: {err}")))?;
    validate_lat_lng(booking.destination_latitude, booking.destination_longitude)
        .map_err(|err| Error::invalid_request(format!("invalid destination coordinates: {err}")))?;

    if booking.pickup_address.trim().len() < MIN_ADDRESS_LEN {
        return Err(Error::invalid_request("pickup address is too short"));
    }
    if booking.destination_address.trim().len() < MIN_ADDRESS_LEN {
        return Err(Error::invalid_request("destination address is too short"));
    }

    if !geo::endpoints_distinct(
        booking.pickup_latitude,
        booking.pickup_longitude,
        booking.destination_latitude,
        booking.destination_longitude,
    ) {
        return Err(Error::invalid_request(
            "pickup and destination cannot be the same location",
        ));
    }

    Ok(())
}

fn map_ride_error(err: RidePersistenceError) -> Error {
    match err {
        RidePersistenceError::NotFound { ride_id } => {
            Error::not_found(format!("ride not found: {ride_id}"))
        }
        RidePersistenceError::Conflict { message } => Error::conflict(message),
        other => Error::internal(other.to_string()),
    }
}
