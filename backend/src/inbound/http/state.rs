//! Shared HTTP adapter state.
//!
//! Handlers accept this bundle via `actix_web::web::Data` so they only
//! depend on domain services and remain testable without I/O.

use std::sync::Arc;

use crate::domain::auth::{AuthService, JwtManager};
use crate::domain::ports::AdminQuery;
use crate::domain::{DriverCoordinator, RideCoordinator};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub rides: Arc<RideCoordinator>,
    pub drivers: Arc<DriverCoordinator>,
    pub auth: Arc<AuthService>,
    pub admin: Arc<dyn AdminQuery>,
    pub jwt: JwtManager,
}

impl HttpState {
    pub fn new(
        rides: Arc<RideCoordinator>,
        drivers: Arc<DriverCoordinator>,
        auth: Arc<AuthService>,
        admin: Arc<dyn AdminQuery>,
        jwt: JwtManager,
    ) -> Self {
        Self {
            rides,
            drivers,
            auth,
            admin,
            jwt,
        }
    }
}
