//! JSON publisher over the shared AMQP channel.
//!
//! Every publication carries `content-type: application/json` and a
//! correlation id defaulting to the ride id, so consumers can stitch a ride's
//! messages together across exchanges.

use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};
use serde::Serialize;
use tracing::debug;

use crate::domain::messages::{
    DriverResponseMessage, LocationUpdateMessage, PassengerInfoMessage, RideRequestedMessage,
    RideStatusUpdateMessage,
};
use crate::domain::ports::{BusError, EventPublisher};

use super::client::{DRIVER_TOPIC, LOCATION_FANOUT, RIDE_TOPIC};

#[derive(Clone)]
pub struct LapinEventPublisher {
    channel: Channel,
}

impl LapinEventPublisher {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    async fn publish_json<T: Serialize + Sync>(
        &self,
        exchange: &str,
        routing_key: &str,
        correlation_id: &str,
        msg: &T,
    ) -> Result<(), BusError> {
        let body = serde_json::to_vec(msg)
            .map_err(|err| BusError::publish(exchange, format!("failed to encode body: {err}")))?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_correlation_id(correlation_id.into());

        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|err| BusError::publish(exchange, err.to_string()))?
            .await
            .map_err(|err| BusError::publish(exchange, err.to_string()))?;

        debug!(exchange, routing_key, correlation_id, "message published");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for LapinEventPublisher {
    async fn publish_ride_requested(&self, msg: &RideRequestedMessage) -> Result<(), BusError> {
        let routing_key = format!("ride.request.{}", msg.ride_type);
        let correlation_id = if msg.correlation_id.is_empty() {
            msg.ride_id.as_str()
        } else {
            msg.correlation_id.as_str()
        };
        self.publish_json(RIDE_TOPIC, &routing_key, correlation_id, msg)
            .await
    }

    async fn publish_passenger_info(&self, msg: &PassengerInfoMessage) -> Result<(), BusError> {
        let routing_key = format!("ride.passenger.{}", msg.ride_id);
        self.publish_json(RIDE_TOPIC, &routing_key, &msg.ride_id, msg)
            .await
    }

    async fn publish_driver_response(&self, msg: &DriverResponseMessage) -> Result<(), BusError> {
        let routing_key = format!("driver.response.{}", msg.ride_id);
        self.publish_json(DRIVER_TOPIC, &routing_key, &msg.ride_id, msg)
            .await
    }

    async fn publish_ride_status(&self, msg: &RideStatusUpdateMessage) -> Result<(), BusError> {
        let routing_key = format!("driver.status.{}", msg.ride_id);
        self.publish_json(DRIVER_TOPIC, &routing_key, &msg.ride_id, msg)
            .await
    }

    async fn publish_location_update(&self, msg: &LocationUpdateMessage) -> Result<(), BusError> {
        // Fanout exchanges ignore the routing key.
        let correlation_id = msg.ride_id.clone().unwrap_or_else(|| msg.driver_id.clone());
        self.publish_json(LOCATION_FANOUT, "", &correlation_id, msg)
            .await
    }
}
