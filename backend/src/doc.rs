//! OpenAPI document served by Swagger UI in debug builds.

use utoipa::OpenApi;

use crate::inbound::http::{drivers, rides, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        users::register,
        users::login,
        users::refresh,
        rides::create_ride,
        rides::cancel_ride,
        drivers::go_online,
        drivers::go_offline,
        drivers::update_location,
        drivers::start_ride,
        drivers::complete_ride,
    ),
    components(schemas(
        users::RegisterRequestBody,
        users::RegisterResponseBody,
        users::LoginRequestBody,
        users::RefreshRequestBody,
        users::TokenPairBody,
        rides::CreateRideRequestBody,
        rides::RideResponseBody,
        rides::CancelRideRequestBody,
        rides::CancelRideResponseBody,
        drivers::OnlineRequestBody,
        drivers::OnlineResponseBody,
        drivers::OfflineResponseBody,
        drivers::SessionSummaryBody,
        drivers::LocationRequestBody,
        drivers::LocationResponseBody,
        drivers::PointBody,
        drivers::StartRequestBody,
        drivers::StartResponseBody,
        drivers::CompleteRequestBody,
        drivers::CompleteResponseBody,
        crate::domain::Error,
        crate::domain::ErrorCode,
    )),
    tags(
        (name = "auth", description = "Registration and token endpoints"),
        (name = "rides", description = "Passenger booking endpoints"),
        (name = "drivers", description = "Driver lifecycle endpoints"),
    )
)]
pub struct ApiDoc;
