//! Process-wide registry of live WebSocket sessions.
//!
//! Sessions register under `driver_<id>` / `passenger_<id>` and receive
//! outbound frames through their actor mailbox. Delivery is non-blocking:
//! a client whose mailbox is full is dropped from the registry, the message
//! pipeline never stalls on one slow consumer.
//!
//! Traffic in the other direction (frames read from clients) flows into
//! three bounded channels drained by the coordinators.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use actix::prelude::{Message, Recipient, SendError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::messages::{DriverLocationPing, PassengerInfoMessage, RideOfferResponse};
use crate::domain::ports::ClientPush;

/// Capacity of each outbound channel towards the coordinators. A full
/// channel suspends the sending session only.
const OUTBOUND_CHANNEL_CAPACITY: usize = 100;

/// One text frame bound for a client session.
#[derive(Message)]
#[rtype(result = "()")]
pub struct OutboundFrame(pub String);

/// Receivers drained by the coordinator forward loops.
pub struct HubStreams {
    pub driver_responses: mpsc::Receiver<RideOfferResponse>,
    pub passenger_info: mpsc::Receiver<PassengerInfoMessage>,
    pub location_updates: mpsc::Receiver<DriverLocationPing>,
}

pub struct SessionHub {
    clients: RwLock<HashMap<String, Recipient<OutboundFrame>>>,
    driver_responses: mpsc::Sender<RideOfferResponse>,
    passenger_info: mpsc::Sender<PassengerInfoMessage>,
    location_updates: mpsc::Sender<DriverLocationPing>,
}

impl SessionHub {
    /// Create the hub and the channel ends the coordinators consume.
    pub fn new() -> (Arc<Self>, HubStreams) {
        let (driver_tx, driver_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (passenger_tx, passenger_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (location_tx, location_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

        let hub = Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            driver_responses: driver_tx,
            passenger_info: passenger_tx,
            location_updates: location_tx,
        });
        let streams = HubStreams {
            driver_responses: driver_rx,
            passenger_info: passenger_rx,
            location_updates: location_rx,
        };
        (hub, streams)
    }

    pub fn register(&self, client_id: String, recipient: Recipient<OutboundFrame>) {
        debug!(client_id = %client_id, "session registered");
        self.write_clients().insert(client_id, recipient);
    }

    pub fn unregister(&self, client_id: &str) {
        if self.write_clients().remove(client_id).is_some() {
            debug!(client_id = %client_id, "session unregistered");
        }
    }

    pub fn connected(&self) -> usize {
        self.read_clients().len()
    }

    pub fn driver_response_sender(&self) -> mpsc::Sender<RideOfferResponse> {
        self.driver_responses.clone()
    }

    pub fn passenger_info_sender(&self) -> mpsc::Sender<PassengerInfoMessage> {
        self.passenger_info.clone()
    }

    pub fn location_update_sender(&self) -> mpsc::Sender<DriverLocationPing> {
        self.location_updates.clone()
    }

    fn read_clients(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Recipient<OutboundFrame>>> {
        self.clients.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_clients(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Recipient<OutboundFrame>>> {
        self.clients.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn drop_slow_client(&self, client_id: &str) {
        warn!(client_id = %client_id, "send buffer full, dropping client");
        self.unregister(client_id);
    }
}

impl ClientPush for SessionHub {
    fn send_to_client(&self, client_id: &str, payload: &str) -> bool {
        let recipient = match self.read_clients().get(client_id) {
            Some(recipient) => recipient.clone(),
            None => return false,
        };

        match recipient.try_send(OutboundFrame(payload.to_string())) {
            Ok(()) => true,
            Err(SendError::Full(_)) => {
                self.drop_slow_client(client_id);
                false
            }
            Err(SendError::Closed(_)) => {
                self.unregister(client_id);
                false
            }
        }
    }

    fn broadcast_ride_offer(&self, payload: &str) -> usize {
        let drivers: Vec<(String, Recipient<OutboundFrame>)> = self
            .read_clients()
            .iter()
            .filter(|(id, _)| id.starts_with("driver_"))
            .map(|(id, recipient)| (id.clone(), recipient.clone()))
            .collect();

        let mut reached = 0;
        for (client_id, recipient) in drivers {
            match recipient.try_send(OutboundFrame(payload.to_string())) {
                Ok(()) => reached += 1,
                Err(SendError::Full(_)) => self.drop_slow_client(&client_id),
                Err(SendError::Closed(_)) => self.unregister(&client_id),
            }
        }
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix::prelude::{Actor, Context, Handler};
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static RECEIVED: AtomicUsize = AtomicUsize::new(0);

    struct Sink;

    impl Actor for Sink {
        type Context = Context<Self>;
    }

    impl Handler<OutboundFrame> for Sink {
        type Result = ();

        fn handle(&mut self, _msg: OutboundFrame, _ctx: &mut Context<Self>) {
            RECEIVED.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[rstest]
    #[actix_rt::test]
    async fn broadcast_reaches_only_driver_sessions() {
        let (hub, _streams) = SessionHub::new();
        let driver = Sink.start();
        let passenger = Sink.start();
        hub.register("driver_a".into(), driver.recipient());
        hub.register("passenger_b".into(), passenger.recipient());

        let reached = hub.broadcast_ride_offer("{\"ride_id\":\"r-1\"}");
        assert_eq!(reached, 1);
    }

    #[rstest]
    #[actix_rt::test]
    async fn sends_to_missing_clients_report_failure() {
        let (hub, _streams) = SessionHub::new();
        assert!(!hub.send_to_client("driver_missing", "{}"));
    }

    #[rstest]
    #[actix_rt::test]
    async fn unregister_removes_the_session() {
        let (hub, _streams) = SessionHub::new();
        let sink = Sink.start();
        hub.register("driver_a".into(), sink.recipient());
        assert_eq!(hub.connected(), 1);

        hub.unregister("driver_a");
        assert_eq!(hub.connected(), 0);
        assert!(!hub.send_to_client("driver_a", "{}"));
    }
}
