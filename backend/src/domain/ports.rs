//! Domain ports defining the edges of the hexagon.
//!
//! Ports describe how the domain expects to interact with driven adapters
//! (database, message broker, live sessions). Each trait exposes strongly
//! typed errors so adapters map their failures into predictable variants.
//! Multi-row operations are port methods so the adapter can guarantee a
//! single transaction around them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::coordinate::LocationSample;
use super::driver::{DriverStatus, VehicleDescription, VehicleType};
use super::messages::{
    DriverResponseMessage, LocationUpdateMessage, PassengerInfoMessage, RideRequestedMessage,
    RideStatusUpdateMessage,
};
use super::ride::RideStatus;
use super::user::{Role, User};

/// Errors surfaced by the user persistence adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserPersistenceError {
    #[error("user persistence connection failed: {message}")]
    Connection { message: String },
    #[error("user persistence query failed: {message}")]
    Query { message: String },
    #[error("email already registered: {email}")]
    DuplicateEmail { email: String },
}

impl UserPersistenceError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn duplicate_email(email: impl Into<String>) -> Self {
        Self::DuplicateEmail {
            email: email.into(),
        }
    }
}

/// Errors surfaced by the ride persistence adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RidePersistenceError {
    #[error("ride persistence connection failed: {message}")]
    Connection { message: String },
    #[error("ride persistence query failed: {message}")]
    Query { message: String },
    #[error("ride not found: {ride_id}")]
    NotFound { ride_id: Uuid },
    #[error("{message}")]
    Conflict { message: String },
}

impl RidePersistenceError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn not_found(ride_id: Uuid) -> Self {
        Self::NotFound { ride_id }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the driver persistence adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverPersistenceError {
    #[error("driver persistence connection failed: {message}")]
    Connection { message: String },
    #[error("driver persistence query failed: {message}")]
    Query { message: String },
    #[error("driver not found: {driver_id}")]
    NotFound { driver_id: Uuid },
    #[error("{message}")]
    Conflict { message: String },
}

impl DriverPersistenceError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn not_found(driver_id: Uuid) -> Self {
        Self::NotFound { driver_id }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the admin read-model adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminQueryError {
    #[error("admin query connection failed: {message}")]
    Connection { message: String },
    #[error("admin query failed: {message}")]
    Query { message: String },
}

impl AdminQueryError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the message-broker adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("broker connection failed: {message}")]
    Connection { message: String },
    #[error("publish to {exchange} failed: {message}")]
    Publish { exchange: String, message: String },
    #[error("subscription on {queue} failed: {message}")]
    Subscribe { queue: String, message: String },
}

impl BusError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn publish(exchange: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            exchange: exchange.into(),
            message: message.into(),
        }
    }

    pub fn subscribe(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscribe {
            queue: queue.into(),
            message: message.into(),
        }
    }
}

/// New account payload. The password is already hashed by the time it
/// crosses this port.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub attrs: serde_json::Value,
}

/// Driver profile created alongside a DRIVER account, in the same
/// transaction.
#[derive(Debug, Clone)]
pub struct NewDriverProfile {
    pub license_number: String,
    pub vehicle_type: VehicleType,
    pub vehicle_attrs: serde_json::Value,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert the account (and driver profile when present) atomically.
    async fn create_account(
        &self,
        account: NewAccount,
        driver_profile: Option<NewDriverProfile>,
    ) -> Result<User, UserPersistenceError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserPersistenceError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, UserPersistenceError>;
}

/// One endpoint of a requested trip.
#[derive(Debug, Clone)]
pub struct EndpointDraft {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

/// Everything the store needs to persist a freshly requested ride: both
/// endpoint coordinates, the ride row and the request audit event.
#[derive(Debug, Clone)]
pub struct RideDraft {
    pub passenger_id: Uuid,
    pub vehicle_type: VehicleType,
    pub ride_number: String,
    pub pickup: EndpointDraft,
    pub destination: EndpointDraft,
    pub estimated_fare: f64,
    pub estimated_distance_km: f64,
    pub estimated_duration_minutes: i32,
    pub priority: i32,
}

/// Identity of a persisted ride, as returned to the requesting passenger.
#[derive(Debug, Clone)]
pub struct CreatedRide {
    pub ride_id: Uuid,
    pub ride_number: String,
    pub status: RideStatus,
    pub requested_at: DateTime<Utc>,
}

/// Status-guarded mutation applied by [`RideRepository::transition`].
#[derive(Debug, Clone, Copy)]
pub enum RideTransition {
    /// REQUESTED → MATCHED: set the winning driver and `matched_at`.
    Matched { driver_id: Uuid },
}

/// Result of a compare-and-swap transition. `Conflict` means the guard saw a
/// different status: a lost race, never an error to retry blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Conflict,
}

/// Outcome of a successful cancellation.
#[derive(Debug, Clone)]
pub struct CancelledRide {
    pub ride_id: Uuid,
    pub cancelled_at: DateTime<Utc>,
}

#[async_trait]
pub trait RideRepository: Send + Sync {
    /// Persist a requested ride (coordinates + ride + audit event) in one
    /// transaction.
    async fn create_ride(&self, draft: RideDraft) -> Result<CreatedRide, RidePersistenceError>;

    /// Compare-and-swap the ride status from `expected`, applying `change`
    /// and its audit event in the same transaction. Zero matched rows yields
    /// [`TransitionOutcome::Conflict`].
    async fn transition(
        &self,
        ride_id: Uuid,
        expected: RideStatus,
        change: RideTransition,
    ) -> Result<TransitionOutcome, RidePersistenceError>;

    /// REQUESTED → CANCELLED with a reason; conflict when the ride has
    /// already progressed.
    async fn cancel(
        &self,
        ride_id: Uuid,
        reason: &str,
    ) -> Result<CancelledRide, RidePersistenceError>;

    async fn ride_status(&self, ride_id: Uuid) -> Result<RideStatus, RidePersistenceError>;

    async fn passenger_for_ride(&self, ride_id: Uuid) -> Result<Uuid, RidePersistenceError>;

    /// Append a LOCATION_UPDATED audit event and a location-history row in
    /// one transaction.
    async fn record_location_event(
        &self,
        ride_id: Uuid,
        sample: LocationSample,
    ) -> Result<(), RidePersistenceError>;
}

/// Outcome of a driver going online.
#[derive(Debug, Clone)]
pub struct OnlineSession {
    pub session_id: Uuid,
    pub status: DriverStatus,
}

/// Shift summary returned when a driver goes offline.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub duration_hours: f64,
    pub rides_completed: i32,
    pub earnings: f64,
}

/// Outcome of persisting a location report.
#[derive(Debug, Clone)]
pub struct SavedLocation {
    pub coordinate_id: Uuid,
    pub recorded_at: DateTime<Utc>,
}

/// Profile block used to enrich driver responses before publication.
#[derive(Debug, Clone)]
pub struct DriverProfile {
    pub driver_id: Uuid,
    pub name: String,
    pub rating: f64,
    pub status: DriverStatus,
    pub vehicle: VehicleDescription,
}

/// Actuals reported by the driver at ride completion.
#[derive(Debug, Clone)]
pub struct RideCompletionRecord {
    pub driver_id: Uuid,
    pub ride_id: Uuid,
    pub earning: f64,
    pub final_latitude: f64,
    pub final_longitude: f64,
    pub actual_distance_km: f64,
    pub actual_duration_minutes: f64,
}

#[async_trait]
pub trait DriverRepository: Send + Sync {
    async fn status(&self, driver_id: Uuid) -> Result<DriverStatus, DriverPersistenceError>;

    /// Open a session, mark the driver AVAILABLE and record the first
    /// location, atomically.
    async fn go_online(
        &self,
        driver_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<OnlineSession, DriverPersistenceError>;

    /// Close the open session and mark the driver OFFLINE, atomically.
    async fn go_offline(&self, driver_id: Uuid) -> Result<SessionSummary, DriverPersistenceError>;

    /// Upsert the driver's current coordinate (preserving the single
    /// `is_current` row per entity) and append location history, atomically.
    async fn save_location(
        &self,
        sample: &LocationSample,
    ) -> Result<SavedLocation, DriverPersistenceError>;

    /// Ride → IN_PROGRESS (guarded against terminal states), driver → BUSY,
    /// plus coordinate, history and audit rows, atomically. Returns
    /// `started_at`.
    async fn start_ride(
        &self,
        driver_id: Uuid,
        ride_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<DateTime<Utc>, DriverPersistenceError>;

    /// Ride → COMPLETED with the final fare, driver → AVAILABLE with
    /// incremented totals, plus the completion audit event, atomically.
    /// Returns `completed_at`.
    async fn complete_ride(
        &self,
        completion: RideCompletionRecord,
    ) -> Result<DateTime<Utc>, DriverPersistenceError>;

    /// Status of a ride assigned to this driver.
    async fn ride_status(
        &self,
        driver_id: Uuid,
        ride_id: Uuid,
    ) -> Result<RideStatus, DriverPersistenceError>;

    async fn profile(&self, driver_id: Uuid) -> Result<DriverProfile, DriverPersistenceError>;

    async fn driver_for_ride(&self, ride_id: Uuid) -> Result<Uuid, DriverPersistenceError>;

    async fn pickup_location(&self, ride_id: Uuid) -> Result<(f64, f64), DriverPersistenceError>;
}

/// System-wide aggregate figures for operators.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SystemMetrics {
    pub average_wait_time_minutes: f64,
    pub average_ride_duration_minutes: f64,
    pub cancellation_rate: f64,
    pub total_rides: i64,
}

/// Snapshot block returned by the overview endpoint.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SystemOverview {
    pub total_users: i64,
    pub total_drivers: i64,
    pub online_drivers: i64,
    pub active_rides: i64,
    pub completed_rides_today: i64,
    pub cancelled_rides_today: i64,
    pub metrics: SystemMetrics,
}

/// One row of the active-rides listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActiveRideSummary {
    pub ride_id: Uuid,
    pub ride_number: String,
    pub status: String,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub vehicle_type: String,
    pub requested_at: DateTime<Utc>,
}

/// Page of active rides.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ActiveRidesPage {
    pub rides: Vec<ActiveRideSummary>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

/// One row of the online-drivers listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OnlineDriver {
    pub driver_id: Uuid,
    pub email: String,
    pub status: String,
    pub rating: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub session_started_at: DateTime<Utc>,
}

#[async_trait]
pub trait AdminQuery: Send + Sync {
    async fn system_overview(&self) -> Result<SystemOverview, AdminQueryError>;

    async fn active_rides(
        &self,
        page: i64,
        page_size: i64,
    ) -> Result<ActiveRidesPage, AdminQueryError>;

    async fn online_drivers(&self) -> Result<Vec<OnlineDriver>, AdminQueryError>;

    async fn system_metrics(&self) -> Result<SystemMetrics, AdminQueryError>;
}

/// Outbound broker publications used by the coordinators.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_ride_requested(&self, msg: &RideRequestedMessage) -> Result<(), BusError>;

    async fn publish_passenger_info(&self, msg: &PassengerInfoMessage) -> Result<(), BusError>;

    async fn publish_driver_response(&self, msg: &DriverResponseMessage) -> Result<(), BusError>;

    async fn publish_ride_status(&self, msg: &RideStatusUpdateMessage) -> Result<(), BusError>;

    async fn publish_location_update(&self, msg: &LocationUpdateMessage) -> Result<(), BusError>;
}

/// Push access to live WebSocket sessions. Implementations must never block:
/// a slow client is dropped, not waited for.
pub trait ClientPush: Send + Sync {
    /// Deliver `payload` to one client. Returns false when the client is not
    /// connected or its send buffer is full.
    fn send_to_client(&self, client_id: &str, payload: &str) -> bool;

    /// Deliver `payload` to every connected driver session. Returns the
    /// number of sessions the frame was handed to.
    fn broadcast_ride_offer(&self, payload: &str) -> usize;
}
