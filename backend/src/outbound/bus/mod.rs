//! AMQP broker adapters: connection, publishers and consumer loops.

pub mod client;
pub mod consumer;
pub mod publisher;

pub use client::BusClient;
pub use consumer::{
    spawn_consumer, QueueBinding, DRIVER_MATCHING, DRIVER_RESPONSES, DRIVER_STATUS_UPDATES,
    LOCATION_UPDATES_RIDE, RIDE_REQUESTS,
};
pub use publisher::LapinEventPublisher;
