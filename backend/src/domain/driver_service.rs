//! Driver coordinator: session state, location reporting and the offer /
//! response plumbing between driver WebSockets and the broker.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::coordinate::{validate_lat_lng, LocationSample};
use super::driver::DriverStatus;
use super::geo;
use super::messages::{
    normalize_driver_id, DriverLocationPing, DriverResponseMessage, DriverSummary, GeoPoint,
    LocationUpdateMessage, PassengerInfoMessage, RideOfferResponse, RideRequestedMessage,
    RideStatusUpdateMessage,
};
use super::ports::{
    ClientPush, DriverPersistenceError, DriverRepository, EventPublisher, OnlineSession,
    RideCompletionRecord, SavedLocation, SessionSummary,
};
use super::ride::RideStatus;
use super::Error;

/// One location report arriving over HTTP.
#[derive(Debug, Clone)]
pub struct LocationPing {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    pub speed_kmh: f64,
    pub heading_degrees: f64,
}

/// Completion payload arriving over HTTP.
#[derive(Debug, Clone)]
pub struct RideCompletion {
    pub ride_id: Uuid,
    pub final_latitude: f64,
    pub final_longitude: f64,
    pub actual_distance_km: f64,
    pub actual_duration_minutes: f64,
}

/// Outcome of starting a ride.
#[derive(Debug, Clone)]
pub struct RideStarted {
    pub ride_id: Uuid,
    pub driver_status: DriverStatus,
    pub started_at: DateTime<Utc>,
}

/// Outcome of completing a ride.
#[derive(Debug, Clone)]
pub struct RideCompleted {
    pub ride_id: Uuid,
    pub driver_status: DriverStatus,
    pub completed_at: DateTime<Utc>,
    pub driver_earning: f64,
}

pub struct DriverCoordinator {
    drivers: Arc<dyn DriverRepository>,
    publisher: Arc<dyn EventPublisher>,
    sessions: Arc<dyn ClientPush>,
}

impl DriverCoordinator {
    pub fn new(
        drivers: Arc<dyn DriverRepository>,
        publisher: Arc<dyn EventPublisher>,
        sessions: Arc<dyn ClientPush>,
    ) -> Self {
        Self {
            drivers,
            publisher,
            sessions,
        }
    }

    /// Open a shift. Only an OFFLINE driver may come online.
    pub async fn go_online(
        &self,
        driver_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<OnlineSession, Error> {
        validate_lat_lng(latitude, longitude)?;

        let status = self.current_status(driver_id).await?;
        if status != DriverStatus::Offline {
            return Err(Error::conflict("driver is not offline"));
        }

        let session = self
            .drivers
            .go_online(driver_id, latitude, longitude)
            .await
            .map_err(map_driver_error)?;
        info!(driver_id = %driver_id, session_id = %session.session_id, "driver online");
        Ok(session)
    }

    /// Close the shift. Drivers on an active job must finish it first.
    pub async fn go_offline(&self, driver_id: Uuid) -> Result<SessionSummary, Error> {
        let status = self.current_status(driver_id).await?;
        if !status.may_go_offline() {
            return Err(Error::conflict("driver cannot go offline"));
        }

        let summary = self
            .drivers
            .go_offline(driver_id)
            .await
            .map_err(map_driver_error)?;
        info!(driver_id = %driver_id, session_id = %summary.session_id, "driver offline");
        Ok(summary)
    }

    /// Persist a location report and fan it out on the location exchange.
    pub async fn update_location(
        &self,
        driver_id: Uuid,
        ping: LocationPing,
    ) -> Result<SavedLocation, Error> {
        validate_lat_lng(ping.latitude, ping.longitude)?;
        if !(0.0..=50.0).contains(&ping.accuracy_meters) {
            return Err(Error::invalid_request(
                "accuracy_meters out of range (0..50)",
            ));
        }
        if !(0.0..=490.0).contains(&ping.speed_kmh) {
            return Err(Error::invalid_request("speed_kmh out of range (0..490)"));
        }
        if !(0.0..360.0).contains(&ping.heading_degrees) {
            return Err(Error::invalid_request(
                "heading_degrees out of range (0..360)",
            ));
        }

        let status = self.current_status(driver_id).await?;
        if status == DriverStatus::Offline {
            return Err(Error::conflict("driver is offline"));
        }

        let sample = LocationSample {
            driver_id,
            ride_id: None,
            latitude: ping.latitude,
            longitude: ping.longitude,
            accuracy_meters: Some(ping.accuracy_meters),
            speed_kmh: Some(ping.speed_kmh),
            heading_degrees: Some(ping.heading_degrees),
        };
        let saved = self
            .drivers
            .save_location(&sample)
            .await
            .map_err(map_driver_error)?;

        let msg = LocationUpdateMessage {
            driver_id: driver_id.to_string(),
            ride_id: None,
            location: GeoPoint {
                lat: ping.latitude,
                lng: ping.longitude,
            },
            speed_kmh: ping.speed_kmh,
            heading_degrees: ping.heading_degrees,
            timestamp: saved.recorded_at,
        };
        if let Err(err) = self.publisher.publish_location_update(&msg).await {
            warn!(error = %err, driver_id = %driver_id, "failed to publish location update");
        }

        Ok(saved)
    }

    /// Begin the trip: ride → IN_PROGRESS, driver → BUSY.
    pub async fn start_ride(
        &self,
        driver_id: Uuid,
        ride_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<RideStarted, Error> {
        validate_lat_lng(latitude, longitude)?;

        let ride_status = self
            .drivers
            .ride_status(driver_id, ride_id)
            .await
            .map_err(map_driver_error)?;
        if ride_status.is_terminal() {
            return Err(Error::conflict(
                "ride cannot be started (already completed or cancelled)",
            ));
        }

        let status = self.current_status(driver_id).await?;
        if status != DriverStatus::Available {
            return Err(Error::conflict("driver is not available"));
        }

        let started_at = self
            .drivers
            .start_ride(driver_id, ride_id, latitude, longitude)
            .await
            .map_err(map_driver_error)?;

        self.publish_status(ride_id, RideStatus::InProgress).await;
        info!(driver_id = %driver_id, ride_id = %ride_id, "ride started");

        Ok(RideStarted {
            ride_id,
            driver_status: DriverStatus::Busy,
            started_at,
        })
    }

    /// Finish the trip: ride → COMPLETED with the driver's earning as the
    /// final fare, driver → AVAILABLE with incremented totals.
    pub async fn complete_ride(
        &self,
        driver_id: Uuid,
        completion: RideCompletion,
    ) -> Result<RideCompleted, Error> {
        if completion.actual_distance_km <= 0.0 {
            return Err(Error::invalid_request("actual_distance_km must be positive"));
        }
        if completion.actual_duration_minutes <= 0.0 {
            return Err(Error::invalid_request(
                "actual_duration_minutes must be positive",
            ));
        }
        validate_lat_lng(completion.final_latitude, completion.final_longitude)?;

        let ride_status = self
            .drivers
            .ride_status(driver_id, completion.ride_id)
            .await
            .map_err(map_driver_error)?;
        if ride_status.is_terminal() {
            return Err(Error::conflict(
                "ride cannot be completed (already completed or cancelled)",
            ));
        }

        let status = self.current_status(driver_id).await?;
        if status != DriverStatus::Busy {
            return Err(Error::conflict("driver status not busy"));
        }

        let earning = geo::completion_earning(
            completion.actual_distance_km,
            completion.actual_duration_minutes,
        );
        let completed_at = self
            .drivers
            .complete_ride(RideCompletionRecord {
                driver_id,
                ride_id: completion.ride_id,
                earning,
                final_latitude: completion.final_latitude,
                final_longitude: completion.final_longitude,
                actual_distance_km: completion.actual_distance_km,
                actual_duration_minutes: completion.actual_duration_minutes,
            })
            .await
            .map_err(map_driver_error)?;

        self.publish_status(completion.ride_id, RideStatus::Completed)
            .await;
        info!(driver_id = %driver_id, ride_id = %completion.ride_id, earning, "ride completed");

        Ok(RideCompleted {
            ride_id: completion.ride_id,
            driver_status: DriverStatus::Available,
            completed_at,
            driver_earning: earning,
        })
    }

    /// Consume one offer from the broker and fan it out to every connected
    /// driver session. Spatial or vehicle-type filtering is the driver app's
    /// concern.
    pub async fn handle_ride_offer(&self, msg: RideRequestedMessage) {
        let payload = match serde_json::to_string(&msg) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, ride_id = %msg.ride_id, "failed to serialize ride offer");
                return;
            }
        };
        let reached = self.sessions.broadcast_ride_offer(&payload);
        debug!(ride_id = %msg.ride_id, reached, "ride offer broadcast");
    }

    /// Consume passenger details for a matched ride and push them to the
    /// assigned driver's session.
    pub async fn handle_passenger_info(&self, msg: PassengerInfoMessage) {
        let Ok(ride_id) = Uuid::parse_str(&msg.ride_id) else {
            warn!(ride_id = %msg.ride_id, "passenger info carries a malformed ride id");
            return;
        };
        let driver_id = match self.drivers.driver_for_ride(ride_id).await {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, ride_id = %ride_id, "cannot resolve driver for passenger info");
                return;
            }
        };
        let payload = match serde_json::to_string(&msg) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, ride_id = %ride_id, "failed to serialize passenger info");
                return;
            }
        };
        let client_id = format!("driver_{driver_id}");
        if !self.sessions.send_to_client(&client_id, &payload) {
            debug!(client_id = %client_id, "driver not connected, passenger info dropped");
        }
    }

    /// Drain raw offer responses from driver sessions, enrich them with the
    /// driver profile and an arrival estimate, and publish them for the
    /// matcher.
    pub async fn forward_driver_responses(&self, mut rx: mpsc::Receiver<RideOfferResponse>) {
        while let Some(response) = rx.recv().await {
            self.forward_one_response(response).await;
        }
        debug!("driver response channel closed");
    }

    async fn forward_one_response(&self, response: RideOfferResponse) {
        let Ok(driver_id) = Uuid::parse_str(normalize_driver_id(&response.driver_id)) else {
            warn!(driver_id = %response.driver_id, "offer response carries a malformed driver id");
            return;
        };
        let Ok(ride_id) = Uuid::parse_str(&response.ride_id) else {
            warn!(ride_id = %response.ride_id, "offer response carries a malformed ride id");
            return;
        };

        match self.drivers.status(driver_id).await {
            Ok(DriverStatus::Available) => {}
            Ok(status) => {
                debug!(driver_id = %driver_id, status = %status, "dropping response from unavailable driver");
                return;
            }
            Err(err) => {
                warn!(error = %err, driver_id = %driver_id, "cannot resolve driver status");
                return;
            }
        }

        let profile = match self.drivers.profile(driver_id).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(error = %err, driver_id = %driver_id, "cannot resolve driver profile");
                return;
            }
        };
        let (pickup_lat, pickup_lng) = match self.drivers.pickup_location(ride_id).await {
            Ok(point) => point,
            Err(err) => {
                warn!(error = %err, ride_id = %ride_id, "cannot resolve pickup location");
                return;
            }
        };

        let minutes = geo::approach_minutes(
            response.latitude,
            response.longitude,
            pickup_lat,
            pickup_lng,
        );
        let now = Utc::now();
        let msg = DriverResponseMessage {
            ride_id: response.ride_id.clone(),
            offer_id: response.offer_id.clone(),
            driver_id: driver_id.to_string(),
            accepted: response.accepted,
            estimated_arrival_minutes: minutes,
            driver_location: GeoPoint {
                lat: response.latitude,
                lng: response.longitude,
            },
            driver_info: DriverSummary {
                name: profile.name,
                rating: profile.rating,
                vehicle: profile.vehicle,
            },
            estimated_arrival: now + Duration::minutes(minutes),
            responded_at: now,
        };

        if let Err(err) = self.publisher.publish_driver_response(&msg).await {
            warn!(error = %err, ride_id = %ride_id, "failed to publish driver response");
        }
    }

    /// Drain location pings from driver sessions and republish them on the
    /// location fanout exchange.
    pub async fn forward_location_updates(&self, mut rx: mpsc::Receiver<DriverLocationPing>) {
        while let Some(ping) = rx.recv().await {
            let msg = LocationUpdateMessage {
                driver_id: normalize_driver_id(&ping.driver_id).to_string(),
                ride_id: ping.ride_id.clone(),
                location: GeoPoint {
                    lat: ping.latitude,
                    lng: ping.longitude,
                },
                speed_kmh: ping.speed_kmh,
                heading_degrees: ping.heading_degrees,
                timestamp: Utc::now(),
            };
            if let Err(err) = self.publisher.publish_location_update(&msg).await {
                warn!(error = %err, driver_id = %msg.driver_id, "failed to publish location update");
            }
        }
        debug!("location update channel closed");
    }

    async fn current_status(&self, driver_id: Uuid) -> Result<DriverStatus, Error> {
        self.drivers
            .status(driver_id)
            .await
            .map_err(map_driver_error)
    }

    async fn publish_status(&self, ride_id: Uuid, status: RideStatus) {
        let msg = RideStatusUpdateMessage {
            kind: "status_update".to_string(),
            ride_id: ride_id.to_string(),
            status: status.to_string(),
            message: None,
        };
        if let Err(err) = self.publisher.publish_ride_status(&msg).await {
            warn!(error = %err, ride_id = %ride_id, "failed to publish ride status");
        }
    }
}

fn map_driver_error(err: DriverPersistenceError) -> Error {
    match err {
        DriverPersistenceError::NotFound { driver_id } => {
            Error::not_found(format!("driver not found: {driver_id}"))
        }
        DriverPersistenceError::Conflict { message } => Error::conflict(message),
        other => Error::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::driver::VehicleDescription;
    use crate::domain::ports::{BusError, DriverProfile};
    use crate::domain::ErrorCode;
    use async_trait::async_trait;
    use rstest::rstest;
    use std::sync::Mutex;

    struct StubDrivers {
        status: DriverStatus,
        ride_status: RideStatus,
        online_calls: Mutex<u32>,
    }

    impl Default for StubDrivers {
        fn default() -> Self {
            Self {
                status: DriverStatus::Offline,
                ride_status: RideStatus::Matched,
                online_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl DriverRepository for StubDrivers {
        async fn status(&self, _driver_id: Uuid) -> Result<DriverStatus, DriverPersistenceError> {
            Ok(self.status)
        }

        async fn go_online(
            &self,
            _driver_id: Uuid,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<OnlineSession, DriverPersistenceError> {
            *self.online_calls.lock().expect("lock") += 1;
            Ok(OnlineSession {
                session_id: Uuid::new_v4(),
                status: DriverStatus::Available,
            })
        }

        async fn go_offline(
            &self,
            _driver_id: Uuid,
        ) -> Result<SessionSummary, DriverPersistenceError> {
            Ok(SessionSummary {
                session_id: Uuid::new_v4(),
                duration_hours: 2.5,
                rides_completed: 3,
                earnings: 4200.0,
            })
        }

        async fn save_location(
            &self,
            _sample: &LocationSample,
        ) -> Result<SavedLocation, DriverPersistenceError> {
            Ok(SavedLocation {
                coordinate_id: Uuid::new_v4(),
                recorded_at: Utc::now(),
            })
        }

        async fn start_ride(
            &self,
            _driver_id: Uuid,
            _ride_id: Uuid,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<DateTime<Utc>, DriverPersistenceError> {
            Ok(Utc::now())
        }

        async fn complete_ride(
            &self,
            _completion: RideCompletionRecord,
        ) -> Result<DateTime<Utc>, DriverPersistenceError> {
            Ok(Utc::now())
        }

        async fn ride_status(
            &self,
            _driver_id: Uuid,
            _ride_id: Uuid,
        ) -> Result<RideStatus, DriverPersistenceError> {
            Ok(self.ride_status)
        }

        async fn profile(
            &self,
            driver_id: Uuid,
        ) -> Result<DriverProfile, DriverPersistenceError> {
            Ok(DriverProfile {
                driver_id,
                name: "Bekzat".into(),
                rating: 4.9,
                status: self.status,
                vehicle: VehicleDescription {
                    make: "Toyota".into(),
                    model: "Camry".into(),
                    color: "white".into(),
                    plate: "001AAA02".into(),
                },
            })
        }

        async fn driver_for_ride(&self, _ride_id: Uuid) -> Result<Uuid, DriverPersistenceError> {
            Ok(Uuid::new_v4())
        }

        async fn pickup_location(
            &self,
            _ride_id: Uuid,
        ) -> Result<(f64, f64), DriverPersistenceError> {
            Ok((43.2389, 76.8897))
        }
    }

    #[derive(Default)]
    struct StubPublisher {
        responses: Mutex<Vec<DriverResponseMessage>>,
        locations: Mutex<Vec<LocationUpdateMessage>>,
        statuses: Mutex<Vec<RideStatusUpdateMessage>>,
    }

    #[async_trait]
    impl EventPublisher for StubPublisher {
        async fn publish_ride_requested(
            &self,
            _msg: &RideRequestedMessage,
        ) -> Result<(), BusError> {
            Ok(())
        }

        async fn publish_passenger_info(
            &self,
            _msg: &PassengerInfoMessage,
        ) -> Result<(), BusError> {
            Ok(())
        }

        async fn publish_driver_response(
            &self,
            msg: &DriverResponseMessage,
        ) -> Result<(), BusError> {
            self.responses.lock().expect("lock").push(msg.clone());
            Ok(())
        }

        async fn publish_ride_status(
            &self,
            msg: &RideStatusUpdateMessage,
        ) -> Result<(), BusError> {
            self.statuses.lock().expect("lock").push(msg.clone());
            Ok(())
        }

        async fn publish_location_update(
            &self,
            msg: &LocationUpdateMessage,
        ) -> Result<(), BusError> {
            self.locations.lock().expect("lock").push(msg.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubSessions {
        sent: Mutex<Vec<(String, String)>>,
        broadcasts: Mutex<Vec<String>>,
    }

    impl ClientPush for StubSessions {
        fn send_to_client(&self, client_id: &str, payload: &str) -> bool {
            self.sent
                .lock()
                .expect("lock")
                .push((client_id.to_string(), payload.to_string()));
            true
        }

        fn broadcast_ride_offer(&self, payload: &str) -> usize {
            self.broadcasts.lock().expect("lock").push(payload.to_string());
            2
        }
    }

    fn coordinator(
        drivers: StubDrivers,
    ) -> (DriverCoordinator, Arc<StubPublisher>, Arc<StubSessions>) {
        let publisher = Arc::new(StubPublisher::default());
        let sessions = Arc::new(StubSessions::default());
        let coordinator = DriverCoordinator::new(
            Arc::new(drivers),
            publisher.clone() as Arc<dyn EventPublisher>,
            sessions.clone() as Arc<dyn ClientPush>,
        );
        (coordinator, publisher, sessions)
    }

    fn ping() -> LocationPing {
        LocationPing {
            latitude: 43.25,
            longitude: 76.92,
            accuracy_meters: 5.0,
            speed_kmh: 42.0,
            heading_degrees: 115.0,
        }
    }

    #[rstest]
    #[actix_rt::test]
    async fn offline_driver_may_come_online() {
        let (coordinator, _, _) = coordinator(StubDrivers::default());
        let session = coordinator
            .go_online(Uuid::new_v4(), 43.25, 76.92)
            .await
            .expect("online");
        assert_eq!(session.status, DriverStatus::Available);
    }

    #[rstest]
    #[actix_rt::test]
    async fn available_driver_cannot_come_online_again() {
        let (coordinator, _, _) = coordinator(StubDrivers {
            status: DriverStatus::Available,
            ..Default::default()
        });
        let err = coordinator
            .go_online(Uuid::new_v4(), 43.25, 76.92)
            .await
            .expect_err("must fail");
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(err.message(), "driver is not offline");
    }

    #[rstest]
    #[case(DriverStatus::Busy)]
    #[case(DriverStatus::EnRoute)]
    #[actix_rt::test]
    async fn busy_driver_cannot_go_offline(#[case] status: DriverStatus) {
        let (coordinator, _, _) = coordinator(StubDrivers {
            status,
            ..Default::default()
        });
        let err = coordinator
            .go_offline(Uuid::new_v4())
            .await
            .expect_err("must fail");
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(err.message(), "driver cannot go offline");
    }

    #[rstest]
    #[actix_rt::test]
    async fn offline_summary_reports_the_session() {
        let (coordinator, _, _) = coordinator(StubDrivers {
            status: DriverStatus::Available,
            ..Default::default()
        });
        let summary = coordinator
            .go_offline(Uuid::new_v4())
            .await
            .expect("offline");
        assert_eq!(summary.rides_completed, 3);
        assert!((summary.duration_hours - 2.5).abs() < 1e-9);
    }

    #[rstest]
    #[case(-0.1, 42.0, 115.0)]
    #[case(50.1, 42.0, 115.0)]
    #[case(5.0, -1.0, 115.0)]
    #[case(5.0, 491.0, 115.0)]
    #[case(5.0, 42.0, -1.0)]
    #[case(5.0, 42.0, 360.0)]
    #[actix_rt::test]
    async fn location_metric_bounds_are_enforced(
        #[case] accuracy: f64,
        #[case] speed: f64,
        #[case] heading: f64,
    ) {
        let (coordinator, _, _) = coordinator(StubDrivers {
            status: DriverStatus::Available,
            ..Default::default()
        });
        let mut bad = ping();
        bad.accuracy_meters = accuracy;
        bad.speed_kmh = speed;
        bad.heading_degrees = heading;
        let err = coordinator
            .update_location(Uuid::new_v4(), bad)
            .await
            .expect_err("must fail");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    #[actix_rt::test]
    async fn offline_driver_cannot_report_location() {
        let (coordinator, _, _) = coordinator(StubDrivers::default());
        let err = coordinator
            .update_location(Uuid::new_v4(), ping())
            .await
            .expect_err("must fail");
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[rstest]
    #[actix_rt::test]
    async fn location_reports_are_fanned_out() {
        let (coordinator, publisher, _) = coordinator(StubDrivers {
            status: DriverStatus::Available,
            ..Default::default()
        });
        coordinator
            .update_location(Uuid::new_v4(), ping())
            .await
            .expect("update");
        let published = publisher.locations.lock().expect("lock");
        assert_eq!(published.len(), 1);
        assert!((published[0].speed_kmh - 42.0).abs() < 1e-9);
    }

    #[rstest]
    #[actix_rt::test]
    async fn start_requires_an_available_driver() {
        let (coordinator, _, _) = coordinator(StubDrivers {
            status: DriverStatus::Busy,
            ..Default::default()
        });
        let err = coordinator
            .start_ride(Uuid::new_v4(), Uuid::new_v4(), 43.25, 76.92)
            .await
            .expect_err("must fail");
        assert_eq!(err.message(), "driver is not available");
    }

    #[rstest]
    #[actix_rt::test]
    async fn start_rejects_finished_rides() {
        let (coordinator, _, _) = coordinator(StubDrivers {
            status: DriverStatus::Available,
            ride_status: RideStatus::Completed,
            ..Default::default()
        });
        let err = coordinator
            .start_ride(Uuid::new_v4(), Uuid::new_v4(), 43.25, 76.92)
            .await
            .expect_err("must fail");
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[rstest]
    #[actix_rt::test]
    async fn completion_computes_the_driver_earning() {
        let (coordinator, publisher, _) = coordinator(StubDrivers {
            status: DriverStatus::Busy,
            ride_status: RideStatus::InProgress,
            ..Default::default()
        });
        let completed = coordinator
            .complete_ride(
                Uuid::new_v4(),
                RideCompletion {
                    ride_id: Uuid::new_v4(),
                    final_latitude: 43.26,
                    final_longitude: 76.93,
                    actual_distance_km: 4.0,
                    actual_duration_minutes: 11.0,
                },
            )
            .await
            .expect("complete");

        let expected = 400.0 + 4.0 * 120.0 + 11.0 * 20.0;
        assert!((completed.driver_earning - expected).abs() < 1e-9);
        assert_eq!(completed.driver_status, DriverStatus::Available);

        let statuses = publisher.statuses.lock().expect("lock");
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, "COMPLETED");
    }

    #[rstest]
    #[actix_rt::test]
    async fn completion_requires_a_busy_driver() {
        let (coordinator, _, _) = coordinator(StubDrivers {
            status: DriverStatus::Available,
            ride_status: RideStatus::InProgress,
            ..Default::default()
        });
        let err = coordinator
            .complete_ride(
                Uuid::new_v4(),
                RideCompletion {
                    ride_id: Uuid::new_v4(),
                    final_latitude: 43.26,
                    final_longitude: 76.93,
                    actual_distance_km: 4.0,
                    actual_duration_minutes: 11.0,
                },
            )
            .await
            .expect_err("must fail");
        assert_eq!(err.message(), "driver status not busy");
    }

    #[rstest]
    #[actix_rt::test]
    async fn offers_are_broadcast_to_driver_sessions() {
        let (coordinator, _, sessions) = coordinator(StubDrivers::default());
        let msg = RideRequestedMessage {
            ride_id: Uuid::new_v4().to_string(),
            ride_number: "RIDE_20250314_092653".into(),
            pickup_location: crate::domain::messages::NamedLocation {
                lat: 43.2389,
                lng: 76.8897,
                address: "A".into(),
            },
            destination_location: crate::domain::messages::NamedLocation {
                lat: 43.256,
                lng: 76.9286,
                address: "B".into(),
            },
            ride_type: crate::domain::driver::VehicleType::Economy,
            estimated_fare: 1268.0,
            max_distance_km: 3.68,
            timeout_seconds: 30,
            correlation_id: "c-1".into(),
        };
        coordinator.handle_ride_offer(msg).await;
        assert_eq!(sessions.broadcasts.lock().expect("lock").len(), 1);
    }

    #[rstest]
    #[actix_rt::test]
    async fn responses_are_enriched_before_publication() {
        let (coordinator, publisher, _) = coordinator(StubDrivers {
            status: DriverStatus::Available,
            ..Default::default()
        });

        let (tx, rx) = mpsc::channel(4);
        let driver_id = Uuid::new_v4();
        tx.send(RideOfferResponse {
            offer_id: "offer-1".into(),
            ride_id: Uuid::new_v4().to_string(),
            driver_id: format!("driver_{driver_id}"),
            accepted: true,
            latitude: 43.24,
            longitude: 76.89,
        })
        .await
        .expect("send");
        drop(tx);

        coordinator.forward_driver_responses(rx).await;

        let published = publisher.responses.lock().expect("lock");
        assert_eq!(published.len(), 1);
        let msg = &published[0];
        assert_eq!(msg.driver_id, driver_id.to_string());
        assert_eq!(msg.driver_info.name, "Bekzat");
        assert_eq!(msg.driver_info.vehicle.plate, "001AAA02");
        assert!(msg.estimated_arrival_minutes >= 0);
        assert!(msg.accepted);
    }

    #[rstest]
    #[actix_rt::test]
    async fn responses_from_unavailable_drivers_are_dropped() {
        let (coordinator, publisher, _) = coordinator(StubDrivers {
            status: DriverStatus::Busy,
            ..Default::default()
        });

        let (tx, rx) = mpsc::channel(4);
        tx.send(RideOfferResponse {
            offer_id: "offer-1".into(),
            ride_id: Uuid::new_v4().to_string(),
            driver_id: Uuid::new_v4().to_string(),
            accepted: true,
            latitude: 43.24,
            longitude: 76.89,
        })
        .await
        .expect("send");
        drop(tx);

        coordinator.forward_driver_responses(rx).await;

        assert!(publisher.responses.lock().expect("lock").is_empty());
    }
}
