//! Long-running queue consumers.
//!
//! Each subscription runs on its own task: declare a durable queue, bind it,
//! then decode deliveries and hand them to the callback. Malformed payloads
//! and callback panics are logged and skipped; only a closed stream ends the
//! task.

use futures_util::{FutureExt, StreamExt};
use lapin::options::{BasicConsumeOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{info, warn};

use crate::domain::ports::BusError;

use super::client::{DRIVER_TOPIC, LOCATION_FANOUT, RIDE_TOPIC};

/// A queue and the binding that feeds it.
#[derive(Debug, Clone, Copy)]
pub struct QueueBinding {
    pub queue: &'static str,
    pub exchange: &'static str,
    pub routing_key: &'static str,
}

/// Offers for the driver coordinator, any vehicle type.
pub const RIDE_REQUESTS: QueueBinding = QueueBinding {
    queue: "ride_requests",
    exchange: RIDE_TOPIC,
    routing_key: "ride.request.*",
};

/// Passenger details for the driver coordinator.
pub const DRIVER_MATCHING: QueueBinding = QueueBinding {
    queue: "driver_matching",
    exchange: RIDE_TOPIC,
    routing_key: "ride.passenger.*",
};

/// Driver responses for the ride coordinator.
pub const DRIVER_RESPONSES: QueueBinding = QueueBinding {
    queue: "driver_responses",
    exchange: DRIVER_TOPIC,
    routing_key: "driver.response.*",
};

/// Ride status notifications for the ride coordinator.
pub const DRIVER_STATUS_UPDATES: QueueBinding = QueueBinding {
    queue: "driver_status_updates",
    exchange: DRIVER_TOPIC,
    routing_key: "driver.status.*",
};

/// Location fanout for the ride coordinator. Fanout bindings ignore the key.
pub const LOCATION_UPDATES_RIDE: QueueBinding = QueueBinding {
    queue: "location_updates_ride",
    exchange: LOCATION_FANOUT,
    routing_key: "",
};

/// Bind the queue and spawn its consumer loop. Deliveries are auto-acked
/// (at-least-once); downstream handlers are idempotent against duplicates.
pub async fn spawn_consumer<M, F, Fut>(
    channel: Channel,
    binding: QueueBinding,
    handler: F,
) -> Result<(), BusError>
where
    M: DeserializeOwned + Send + 'static,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let queue_error = |err: lapin::Error| BusError::subscribe(binding.queue, err.to_string());

    channel
        .queue_declare(
            binding.queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(queue_error)?;

    channel
        .queue_bind(
            binding.queue,
            binding.exchange,
            binding.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(queue_error)?;

    let mut deliveries = channel
        .basic_consume(
            binding.queue,
            "",
            BasicConsumeOptions {
                no_ack: true,
                ..BasicConsumeOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(queue_error)?;

    info!(queue = binding.queue, routing_key = binding.routing_key, "consumer started");

    tokio::spawn(async move {
        while let Some(delivery) = deliveries.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(err) => {
                    warn!(queue = binding.queue, error = %err, "delivery failed");
                    continue;
                }
            };

            let msg = match serde_json::from_slice::<M>(&delivery.data) {
                Ok(msg) => msg,
                Err(err) => {
                    warn!(queue = binding.queue, error = %err, "skipping undecodable message");
                    continue;
                }
            };

            if AssertUnwindSafe(handler(msg)).catch_unwind().await.is_err() {
                warn!(queue = binding.queue, "consumer callback panicked");
            }
        }
        warn!(queue = binding.queue, "consumer stream closed");
    });

    Ok(())
}
