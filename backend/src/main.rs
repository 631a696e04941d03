//! Process entry-point: wires the store, the broker, the hub and both
//! listeners, then runs until shutdown.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

use backend::config::AppConfig;
use backend::domain::auth::{AuthService, JwtManager};
use backend::domain::messages::{
    DriverResponseMessage, LocationUpdateMessage, PassengerInfoMessage, RideRequestedMessage,
    RideStatusUpdateMessage,
};
use backend::domain::ports::{AdminQuery, BusError, ClientPush, EventPublisher};
use backend::domain::{DriverCoordinator, RideCoordinator};
use backend::inbound::http::{admin, drivers, rides, users, HttpState};
use backend::inbound::ws::{self, HubStreams, SessionHub, WsState};
use backend::outbound::bus::{
    spawn_consumer, BusClient, LapinEventPublisher, DRIVER_MATCHING, DRIVER_RESPONSES,
    DRIVER_STATUS_UPDATES, LOCATION_UPDATES_RIDE, RIDE_REQUESTS,
};
use backend::outbound::persistence::{
    DbPool, DieselAdminQuery, DieselDriverRepository, DieselRideRepository, DieselUserRepository,
};
#[cfg(debug_assertions)]
use backend::ApiDoc;

fn fatal(context: &'static str) -> impl FnOnce(BusError) -> io::Error {
    move |err| io::Error::other(format!("{context}: {err}"))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let cfg = AppConfig::from_env();

    let pool = DbPool::connect(&cfg.database.url())
        .await
        .map_err(|err| io::Error::other(format!("database connect: {err}")))?;
    info!(host = %cfg.database.host, "database pool ready");

    let bus = BusClient::connect(&cfg.broker.url())
        .await
        .map_err(|err| io::Error::other(format!("broker connect: {err}")))?;

    let jwt = JwtManager::with_default_ttls(cfg.jwt_secret.as_bytes());
    let publisher: Arc<dyn EventPublisher> = Arc::new(LapinEventPublisher::new(bus.channel()));
    let (hub, streams) = SessionHub::new();
    let sessions: Arc<dyn ClientPush> = hub.clone();

    let rides_coord = Arc::new(RideCoordinator::new(
        Arc::new(DieselRideRepository::new(pool.clone())),
        publisher.clone(),
        sessions.clone(),
    ));
    let drivers_coord = Arc::new(DriverCoordinator::new(
        Arc::new(DieselDriverRepository::new(pool.clone())),
        publisher.clone(),
        sessions,
    ));
    let auth = Arc::new(AuthService::new(
        Arc::new(DieselUserRepository::new(pool.clone())),
        jwt.clone(),
    ));
    let admin_query: Arc<dyn AdminQuery> = Arc::new(DieselAdminQuery::new(pool));

    start_consumers(&bus, rides_coord.clone(), drivers_coord.clone()).await?;
    start_forward_loops(streams, rides_coord.clone(), drivers_coord.clone());

    let http_state = HttpState::new(
        rides_coord,
        drivers_coord,
        auth,
        admin_query,
        jwt.clone(),
    );
    let ws_state = WsState::new(hub, jwt);

    // The REST API answers on the WS_PORT value; the WebSocket listener on
    // RIDE_SERVICE_PORT.
    let api_addr = ("0.0.0.0", cfg.ws_port);
    let ws_addr = ("0.0.0.0", cfg.services.ride);

    let api_server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(http_state.clone()))
            .service(users::register)
            .service(users::login)
            .service(users::refresh)
            .service(rides::create_ride)
            .service(rides::cancel_ride)
            .service(drivers::go_online)
            .service(drivers::go_offline)
            .service(drivers::update_location)
            .service(drivers::start_ride)
            .service(drivers::complete_ride)
            .service(admin::overview)
            .service(admin::active_rides)
            .service(admin::online_drivers)
            .service(admin::metrics);

        #[cfg(debug_assertions)]
        {
            app = app
                .service(SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()));
        }

        app
    })
    .client_request_timeout(Duration::from_secs(10))
    .bind(api_addr)?;

    let ws_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(ws_state.clone()))
            .service(ws::driver_entry)
            .service(ws::passenger_entry)
    })
    .bind(ws_addr)?
    .disable_signals();

    info!(api_port = api_addr.1, ws_port = ws_addr.1, "listeners starting");
    let (api_result, ws_result) = tokio::join!(api_server.run(), ws_server.run());
    api_result.and(ws_result)
}

/// Bind the queue consumers that feed the coordinators.
async fn start_consumers(
    bus: &BusClient,
    rides_coord: Arc<RideCoordinator>,
    drivers_coord: Arc<DriverCoordinator>,
) -> io::Result<()> {
    {
        let coordinator = rides_coord.clone();
        spawn_consumer(
            bus.consumer_channel().await.map_err(fatal("consumer channel"))?,
            DRIVER_RESPONSES,
            move |msg: DriverResponseMessage| {
                let coordinator = coordinator.clone();
                async move { coordinator.handle_driver_response(msg).await }
            },
        )
        .await
        .map_err(fatal("driver responses consumer"))?;
    }

    {
        let coordinator = rides_coord.clone();
        spawn_consumer(
            bus.consumer_channel().await.map_err(fatal("consumer channel"))?,
            DRIVER_STATUS_UPDATES,
            move |msg: RideStatusUpdateMessage| {
                let coordinator = coordinator.clone();
                async move { coordinator.handle_status_update(msg).await }
            },
        )
        .await
        .map_err(fatal("ride status consumer"))?;
    }

    {
        let coordinator = rides_coord;
        spawn_consumer(
            bus.consumer_channel().await.map_err(fatal("consumer channel"))?,
            LOCATION_UPDATES_RIDE,
            move |msg: LocationUpdateMessage| {
                let coordinator = coordinator.clone();
                async move { coordinator.handle_location_update(msg).await }
            },
        )
        .await
        .map_err(fatal("location updates consumer"))?;
    }

    {
        let coordinator = drivers_coord.clone();
        spawn_consumer(
            bus.consumer_channel().await.map_err(fatal("consumer channel"))?,
            RIDE_REQUESTS,
            move |msg: RideRequestedMessage| {
                let coordinator = coordinator.clone();
                async move { coordinator.handle_ride_offer(msg).await }
            },
        )
        .await
        .map_err(fatal("ride requests consumer"))?;
    }

    {
        let coordinator = drivers_coord;
        spawn_consumer(
            bus.consumer_channel().await.map_err(fatal("consumer channel"))?,
            DRIVER_MATCHING,
            move |msg: PassengerInfoMessage| {
                let coordinator = coordinator.clone();
                async move { coordinator.handle_passenger_info(msg).await }
            },
        )
        .await
        .map_err(fatal("passenger info consumer"))?;
    }

    Ok(())
}

/// Spawn the loops draining hub channels back onto the broker.
fn start_forward_loops(
    streams: HubStreams,
    rides_coord: Arc<RideCoordinator>,
    drivers_coord: Arc<DriverCoordinator>,
) {
    let HubStreams {
        driver_responses,
        passenger_info,
        location_updates,
    } = streams;

    {
        let coordinator = drivers_coord.clone();
        tokio::spawn(async move { coordinator.forward_driver_responses(driver_responses).await });
    }
    {
        let coordinator = rides_coord;
        tokio::spawn(async move { coordinator.forward_passenger_info(passenger_info).await });
    }
    tokio::spawn(async move { drivers_coord.forward_location_updates(location_updates).await });
}
