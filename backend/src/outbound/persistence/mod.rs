//! Diesel-backed persistence adapters.

pub mod diesel_admin_query;
pub mod diesel_driver_repository;
pub mod diesel_ride_repository;
pub mod diesel_user_repository;
mod error_mapping;
pub mod models;
pub mod pool;
pub mod schema;

pub use diesel_admin_query::DieselAdminQuery;
pub use diesel_driver_repository::DieselDriverRepository;
pub use diesel_ride_repository::DieselRideRepository;
pub use diesel_user_repository::DieselUserRepository;
pub use pool::{DbPool, PoolError};
