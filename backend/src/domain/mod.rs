//! Domain core: entities, state machines, coordinators and ports.
//!
//! Nothing in this module depends on actix, diesel or lapin; adapters plug in
//! through the traits in [`ports`].

pub mod auth;
pub mod coordinate;
pub mod driver;
pub mod driver_service;
pub mod error;
pub mod geo;
pub mod messages;
pub mod ports;
pub mod ride;
pub mod ride_service;
pub mod user;

pub use coordinate::{validate_lat_lng, Coordinate, EntityType, LocationSample};
pub use driver::{Driver, DriverSession, DriverStatus, VehicleDescription, VehicleType};
pub use driver_service::{DriverCoordinator, LocationPing, RideCompletion};
pub use error::{Error, ErrorCode};
pub use ride::{Ride, RideEvent, RideEventType, RideStatus};
pub use ride_service::{RideBooking, RideCoordinator};
pub use user::{Role, User, UserStatus};
