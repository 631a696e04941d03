//! AMQP connection handling and exchange topology.
//!
//! One connection and one channel are shared by every publisher within a
//! service; consumers get their own channel so a failing consumer cannot
//! poison publishes.

use std::time::Duration;

use lapin::options::ExchangeDeclareOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{info, warn};

use crate::domain::ports::BusError;

/// Topic exchange carrying ride offers and passenger details.
pub const RIDE_TOPIC: &str = "ride_topic";
/// Topic exchange carrying driver responses and ride status notifications.
pub const DRIVER_TOPIC: &str = "driver_topic";
/// Fanout exchange carrying live driver locations.
pub const LOCATION_FANOUT: &str = "location_fanout";

/// Reconnect policy: exponential backoff starting at 2 s, five attempts.
const CONNECT_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_SECS: u64 = 2;

pub struct BusClient {
    connection: Connection,
    channel: Channel,
}

impl BusClient {
    /// Dial the broker with backoff and declare the exchange topology.
    /// Failing every attempt is fatal to the caller.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let connection = dial(url).await?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|err| BusError::connection(format!("failed to open channel: {err}")))?;

        declare_exchanges(&channel).await?;

        Ok(Self {
            connection,
            channel,
        })
    }

    /// The shared publish channel.
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// A dedicated channel for one consumer.
    pub async fn consumer_channel(&self) -> Result<Channel, BusError> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|err| BusError::connection(format!("failed to open channel: {err}")))?;
        declare_exchanges(&channel).await?;
        Ok(channel)
    }
}

async fn dial(url: &str) -> Result<Connection, BusError> {
    let mut last_error = String::new();
    for attempt in 1..=CONNECT_ATTEMPTS {
        match Connection::connect(url, ConnectionProperties::default()).await {
            Ok(connection) => {
                info!(attempt, "connected to message broker");
                return Ok(connection);
            }
            Err(err) => {
                last_error = err.to_string();
                warn!(attempt, error = %err, "broker connect attempt failed");
                if attempt < CONNECT_ATTEMPTS {
                    let wait = BACKOFF_BASE_SECS.pow(attempt);
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
            }
        }
    }
    Err(BusError::connection(format!(
        "failed to connect after {CONNECT_ATTEMPTS} attempts: {last_error}"
    )))
}

async fn declare_exchanges(channel: &Channel) -> Result<(), BusError> {
    let durable = ExchangeDeclareOptions {
        durable: true,
        ..ExchangeDeclareOptions::default()
    };

    for (name, kind) in [
        (RIDE_TOPIC, ExchangeKind::Topic),
        (DRIVER_TOPIC, ExchangeKind::Topic),
        (LOCATION_FANOUT, ExchangeKind::Fanout),
    ] {
        channel
            .exchange_declare(name, kind, durable, FieldTable::default())
            .await
            .map_err(|err| {
                BusError::connection(format!("failed to declare exchange {name}: {err}"))
            })?;
    }
    Ok(())
}
