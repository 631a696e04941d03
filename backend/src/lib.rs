//! Ride dispatch and lifecycle coordination backend.
//!
//! The domain core owns the ride state machine and the coordinators; the
//! inbound adapters speak HTTP and WebSocket, the outbound adapters speak
//! PostgreSQL and AMQP.

pub mod config;
pub mod doc;
pub mod domain;
pub mod inbound;
pub mod outbound;

pub use doc::ApiDoc;
