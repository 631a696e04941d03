//! WebSocket adapter: session actors, the hub registry and wire frames.

pub mod hub;
pub mod messages;
pub mod session;

use std::sync::Arc;

use actix_web::{get, web, HttpRequest, HttpResponse};
use actix_web_actors::ws as actix_ws;

use crate::domain::auth::JwtManager;

pub use hub::{HubStreams, SessionHub};
pub use session::{SessionRole, WsSession};

/// Dependencies shared by every WebSocket connection.
#[derive(Clone)]
pub struct WsState {
    hub: Arc<SessionHub>,
    jwt: JwtManager,
}

impl WsState {
    pub fn new(hub: Arc<SessionHub>, jwt: JwtManager) -> Self {
        Self { hub, jwt }
    }
}

/// Driver connection entry. Authentication happens in-band via the first
/// frame, so the route itself is open.
#[get("/ws/drivers/{tail:.*}")]
pub async fn driver_entry(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<WsState>,
) -> Result<HttpResponse, actix_web::Error> {
    actix_ws::start(
        WsSession::new(state.hub.clone(), state.jwt.clone(), SessionRole::Driver),
        &req,
        stream,
    )
}

/// Passenger connection entry.
#[get("/ws/passengers/{tail:.*}")]
pub async fn passenger_entry(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<WsState>,
) -> Result<HttpResponse, actix_web::Error> {
    actix_ws::start(
        WsSession::new(state.hub.clone(), state.jwt.clone(), SessionRole::Passenger),
        &req,
        stream,
    )
}
