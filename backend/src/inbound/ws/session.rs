//! Per-connection WebSocket actor.
//!
//! Keeps framing, authentication and heartbeats at the edge and hands typed
//! frames to the hub channels. The public contract pings every 30 s and
//! closes a connection after 60 s without client traffic; the first frame
//! must authenticate within 5 s. Tests shorten these intervals to speed up
//! feedback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::fut::wrap_future;
use actix::{Actor, ActorContext, AsyncContext, Handler, StreamHandler};
use actix_web_actors::ws::{self, CloseCode, CloseReason, Message, ProtocolError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::auth::JwtManager;
use crate::domain::Role;

use super::hub::{OutboundFrame, SessionHub};
use super::messages::{AuthAck, ClientFrame};

#[cfg(not(test))]
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
#[cfg(test)]
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);

#[cfg(not(test))]
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
#[cfg(test)]
const CLIENT_TIMEOUT: Duration = Duration::from_millis(100);

/// How long a fresh connection may stay unauthenticated.
#[cfg(not(test))]
const AUTH_TIMEOUT: Duration = Duration::from_secs(5);
#[cfg(test)]
const AUTH_TIMEOUT: Duration = Duration::from_millis(300);

/// Which side of the platform a connection path serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Driver,
    Passenger,
}

impl SessionRole {
    fn required_role(self) -> Role {
        match self {
            Self::Driver => Role::Driver,
            Self::Passenger => Role::Passenger,
        }
    }

    fn client_prefix(self) -> &'static str {
        match self {
            Self::Driver => "driver_",
            Self::Passenger => "passenger_",
        }
    }
}

pub struct WsSession {
    hub: Arc<SessionHub>,
    jwt: JwtManager,
    role: SessionRole,
    user_id: Option<String>,
    client_id: Option<String>,
    last_heartbeat: Instant,
}

impl WsSession {
    pub fn new(hub: Arc<SessionHub>, jwt: JwtManager, role: SessionRole) -> Self {
        Self {
            hub,
            jwt,
            role,
            user_id: None,
            client_id: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn close_with(&self, ctx: &mut ws::WebsocketContext<Self>, code: CloseCode, reason: &str) {
        ctx.close(Some(CloseReason {
            code,
            description: Some(reason.into()),
        }));
        ctx.stop();
    }

    fn authenticate(&mut self, token: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let claims = match self.jwt.validate(token) {
            Ok(claims) => claims,
            Err(_) => {
                warn!("rejecting WebSocket session with invalid token");
                self.close_with(ctx, CloseCode::Policy, "invalid token");
                return;
            }
        };

        match claims.parsed_role() {
            Ok(role) if role == self.role.required_role() => {}
            _ => {
                warn!(sub = %claims.sub, "rejecting WebSocket session with mismatched role");
                let reason = match self.role {
                    SessionRole::Driver => "user is not a driver",
                    SessionRole::Passenger => "user is not a passenger",
                };
                self.close_with(ctx, CloseCode::Policy, reason);
                return;
            }
        }

        let client_id = format!("{}{}", self.role.client_prefix(), claims.sub);
        self.hub.register(client_id.clone(), ctx.address().recipient());
        self.user_id = Some(claims.sub);
        self.client_id = Some(client_id);

        match serde_json::to_string(&AuthAck::authenticated()) {
            Ok(ack) => ctx.text(ack),
            Err(err) => warn!(error = %err, "failed to serialize auth ack"),
        }
    }

    /// Hand one item to a hub channel. A full channel suspends this session
    /// until space frees up; the rest of the hub keeps flowing.
    fn forward<T: Send + 'static>(
        &self,
        sender: mpsc::Sender<T>,
        item: T,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        ctx.wait(wrap_future(async move {
            if sender.send(item).await.is_err() {
                warn!("hub channel closed, dropping frame");
            }
        }));
    }

    fn handle_frame(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(err) => {
                if self.client_id.is_none() {
                    self.close_with(ctx, CloseCode::Policy, "invalid auth message");
                } else {
                    debug!(error = %err, "discarding unrecognized frame");
                }
                return;
            }
        };

        match frame {
            ClientFrame::Auth(auth) => {
                if self.client_id.is_none() {
                    self.authenticate(&auth.token, ctx);
                }
            }
            _ if self.client_id.is_none() => {
                self.close_with(ctx, CloseCode::Policy, "authentication required");
            }
            ClientFrame::LocationUpdate(frame) => {
                let Some(user_id) = self.user_id.clone() else {
                    return;
                };
                if self.role != SessionRole::Driver {
                    debug!("discarding location_update from passenger session");
                    return;
                }
                self.forward(
                    self.hub.location_update_sender(),
                    frame.into_ping(&user_id),
                    ctx,
                );
            }
            ClientFrame::RideResponse(frame) => {
                let Some(user_id) = self.user_id.clone() else {
                    return;
                };
                if self.role != SessionRole::Driver {
                    debug!("discarding ride_response from passenger session");
                    return;
                }
                self.forward(
                    self.hub.driver_response_sender(),
                    frame.into_response(&user_id),
                    ctx,
                );
            }
            ClientFrame::RideDetails(frame) => {
                if self.role != SessionRole::Passenger {
                    debug!("discarding ride_details from driver session");
                    return;
                }
                self.forward(self.hub.passenger_info_sender(), frame.into_message(), ctx);
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.last_heartbeat = Instant::now();

        ctx.run_interval(HEARTBEAT_INTERVAL, |actor, ctx| {
            if Instant::now().duration_since(actor.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout; closing connection");
                ctx.close(Some(CloseReason {
                    code: CloseCode::Normal,
                    description: Some("heartbeat timeout".into()),
                }));
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });

        ctx.run_later(AUTH_TIMEOUT, |actor, ctx| {
            if actor.client_id.is_none() {
                actor.close_with(ctx, CloseCode::Policy, "auth timeout");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(client_id) = self.client_id.take() {
            self.hub.unregister(&client_id);
        }
    }
}

impl Handler<OutboundFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<Message, ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<Message, ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_frame(&text, ctx);
            }
            Ok(Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(Message::Nop) | Ok(Message::Continuation(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Err(err) => {
                warn!(error = %err, "WebSocket protocol error");
                ctx.close(Some(CloseReason {
                    code: CloseCode::Protocol,
                    description: Some("protocol error".into()),
                }));
                ctx.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbound::ws::{self, WsState};
    use actix_web::{dev::Server, dev::ServerHandle, App, HttpServer};
    use awc::{ws::Codec, ws::Frame, BoxedSocket};
    use futures_util::{SinkExt, StreamExt};
    use rstest::{fixture, rstest};
    use serde_json::{json, Value};
    use uuid::Uuid;

    use crate::inbound::ws::hub::HubStreams;

    const TEST_SECRET: &[u8] = b"ws-session-test-secret";

    fn jwt() -> JwtManager {
        JwtManager::new(TEST_SECRET, 3600, 86400)
    }

    struct TestServer {
        url: String,
        handle: ServerHandle,
        streams: HubStreams,
    }

    #[fixture]
    fn ws_server() -> TestServer {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let (hub, streams) = SessionHub::new();
        let state = WsState::new(hub, jwt());

        let server: Server = HttpServer::new(move || {
            App::new()
                .app_data(actix_web::web::Data::new(state.clone()))
                .service(ws::driver_entry)
                .service(ws::passenger_entry)
        })
        .listen(listener)
        .expect("bind test server")
        .workers(1)
        .disable_signals()
        .run();

        let handle = server.handle();
        actix_web::rt::spawn(server);

        TestServer {
            url: format!("http://{addr}"),
            handle,
            streams,
        }
    }

    async fn connect(url: &str, path: &str) -> actix_codec::Framed<BoxedSocket, Codec> {
        let (_resp, socket) = awc::Client::default()
            .ws(format!("{url}{path}"))
            .connect()
            .await
            .expect("websocket connect");
        socket
    }

    fn auth_frame(token: &str) -> String {
        json!({ "type": "auth", "token": token }).to_string()
    }

    async fn next_text(socket: &mut actix_codec::Framed<BoxedSocket, Codec>) -> Value {
        loop {
            let frame = socket.next().await.expect("frame").expect("frame ok");
            match frame {
                Frame::Text(bytes) => return serde_json::from_slice(&bytes).expect("json"),
                Frame::Ping(_) | Frame::Pong(_) => continue,
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    }

    #[rstest]
    #[actix_rt::test]
    async fn driver_authenticates_and_pushes_a_ride_response(ws_server: TestServer) {
        let TestServer {
            url,
            handle,
            mut streams,
        } = ws_server;
        let driver_id = Uuid::new_v4();
        let token = jwt()
            .issue_access_token(&driver_id.to_string(), "DRIVER")
            .expect("token");

        let mut socket = connect(&url, "/ws/drivers/").await;
        socket
            .send(awc::ws::Message::Text(auth_frame(&token).into()))
            .await
            .expect("send auth");

        let ack = next_text(&mut socket).await;
        assert_eq!(ack["status"], "authenticated");

        let response = json!({
            "type": "ride_response",
            "ride_id": "r-1",
            "accepted": true,
            "current_location": { "latitude": 43.24, "longitude": 76.89 }
        });
        socket
            .send(awc::ws::Message::Text(response.to_string().into()))
            .await
            .expect("send response");

        let received = tokio::time::timeout(
            Duration::from_secs(2),
            streams.driver_responses.recv(),
        )
        .await
        .expect("response forwarded in time")
        .expect("channel open");
        assert_eq!(received.ride_id, "r-1");
        assert_eq!(received.driver_id, driver_id.to_string());
        assert!(received.accepted);

        handle.stop(true).await;
    }

    #[rstest]
    #[actix_rt::test]
    async fn invalid_token_closes_the_session(ws_server: TestServer) {
        let TestServer { url, handle, .. } = ws_server;

        let mut socket = connect(&url, "/ws/drivers/").await;
        socket
            .send(awc::ws::Message::Text(auth_frame("garbage").into()))
            .await
            .expect("send auth");

        loop {
            let frame = socket.next().await.expect("frame").expect("frame ok");
            match frame {
                Frame::Close(reason) => {
                    let reason = reason.expect("close reason");
                    assert_eq!(reason.code, CloseCode::Policy);
                    assert_eq!(reason.description.as_deref(), Some("invalid token"));
                    break;
                }
                Frame::Ping(_) | Frame::Pong(_) => continue,
                other => panic!("expected close frame, got {other:?}"),
            }
        }

        handle.stop(true).await;
    }

    #[rstest]
    #[actix_rt::test]
    async fn passenger_token_is_rejected_on_the_driver_path(ws_server: TestServer) {
        let TestServer { url, handle, .. } = ws_server;
        let token = jwt()
            .issue_access_token(&Uuid::new_v4().to_string(), "PASSENGER")
            .expect("token");

        let mut socket = connect(&url, "/ws/drivers/").await;
        socket
            .send(awc::ws::Message::Text(auth_frame(&token).into()))
            .await
            .expect("send auth");

        loop {
            let frame = socket.next().await.expect("frame").expect("frame ok");
            match frame {
                Frame::Close(reason) => {
                    let reason = reason.expect("close reason");
                    assert_eq!(reason.description.as_deref(), Some("user is not a driver"));
                    break;
                }
                Frame::Ping(_) | Frame::Pong(_) => continue,
                other => panic!("expected close frame, got {other:?}"),
            }
        }

        handle.stop(true).await;
    }

    #[rstest]
    #[actix_rt::test]
    async fn passenger_ride_details_reach_the_hub_channel(ws_server: TestServer) {
        let TestServer {
            url,
            handle,
            mut streams,
        } = ws_server;
        let token = jwt()
            .issue_access_token(&Uuid::new_v4().to_string(), "PASSENGER")
            .expect("token");

        let mut socket = connect(&url, "/ws/passengers/").await;
        socket
            .send(awc::ws::Message::Text(auth_frame(&token).into()))
            .await
            .expect("send auth");
        let ack = next_text(&mut socket).await;
        assert_eq!(ack["status"], "authenticated");

        let details = json!({
            "type": "ride_details",
            "ride_id": "r-9",
            "passenger_name": "Aliya",
            "pickup_location": { "latitude": 43.2, "longitude": 76.9, "notes": "main entrance" }
        });
        socket
            .send(awc::ws::Message::Text(details.to_string().into()))
            .await
            .expect("send details");

        let received = tokio::time::timeout(
            Duration::from_secs(2),
            streams.passenger_info.recv(),
        )
        .await
        .expect("details forwarded in time")
        .expect("channel open");
        assert_eq!(received.ride_id, "r-9");
        assert_eq!(received.kind, "ride_details");
        assert_eq!(received.pickup_location.notes, "main entrance");

        handle.stop(true).await;
    }

    #[rstest]
    #[actix_rt::test]
    async fn unauthenticated_data_frames_close_the_session(ws_server: TestServer) {
        let TestServer { url, handle, .. } = ws_server;

        let mut socket = connect(&url, "/ws/drivers/").await;
        let frame = json!({
            "type": "location_update",
            "latitude": 43.2,
            "longitude": 76.9
        });
        socket
            .send(awc::ws::Message::Text(frame.to_string().into()))
            .await
            .expect("send frame");

        loop {
            let frame = socket.next().await.expect("frame").expect("frame ok");
            match frame {
                Frame::Close(reason) => {
                    let reason = reason.expect("close reason");
                    assert_eq!(
                        reason.description.as_deref(),
                        Some("authentication required")
                    );
                    break;
                }
                Frame::Ping(_) | Frame::Pong(_) => continue,
                other => panic!("expected close frame, got {other:?}"),
            }
        }

        handle.stop(true).await;
    }

    #[rstest]
    #[actix_rt::test]
    async fn silent_clients_are_disconnected_after_the_timeout(ws_server: TestServer) {
        let TestServer { url, handle, .. } = ws_server;
        let token = jwt()
            .issue_access_token(&Uuid::new_v4().to_string(), "DRIVER")
            .expect("token");

        let mut socket = connect(&url, "/ws/drivers/").await;
        socket
            .send(awc::ws::Message::Text(auth_frame(&token).into()))
            .await
            .expect("send auth");
        let _ack = next_text(&mut socket).await;

        tokio::time::sleep(CLIENT_TIMEOUT + HEARTBEAT_INTERVAL * 3).await;

        let observed = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(frame) = socket.next().await {
                match frame.expect("frame ok") {
                    Frame::Close(reason) => return reason,
                    _ => continue,
                }
            }
            None
        })
        .await
        .expect("close frame within timeout")
        .expect("close reason");

        assert_eq!(observed.code, CloseCode::Normal);
        assert_eq!(observed.description.as_deref(), Some("heartbeat timeout"));

        handle.stop(true).await;
    }
}
