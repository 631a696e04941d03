//! Ride HTTP handlers.
//!
//! ```text
//! POST /rides
//! POST /rides/{ride_id}/cancel
//! ```

use std::str::FromStr;

use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::ride_service::RideBooking;
use crate::domain::{Role, VehicleType};

use super::auth::AuthedUser;
use super::error::ApiResult;
use super::state::HttpState;
use super::validation::parse_uuid;

/// Booking request body.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateRideRequestBody {
    #[schema(format = "uuid")]
    pub passenger_id: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub pickup_address: String,
    pub destination_latitude: f64,
    pub destination_longitude: f64,
    pub destination_address: String,
    #[schema(example = "ECONOMY")]
    pub ride_type: String,
}

/// Booking response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct RideResponseBody {
    #[schema(format = "uuid")]
    pub ride_id: String,
    pub ride_number: String,
    pub status: String,
    pub estimated_fare: f64,
    pub estimated_duration_minutes: i32,
    pub estimated_distance_km: f64,
}

/// Cancellation request body.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CancelRideRequestBody {
    pub reason: String,
}

/// Cancellation response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct CancelRideResponseBody {
    #[schema(format = "uuid")]
    pub ride_id: String,
    pub status: String,
    #[schema(format = "date-time")]
    pub cancelled_at: String,
    pub message: String,
}

/// Request a ride.
#[utoipa::path(
    post,
    path = "/rides",
    request_body = CreateRideRequestBody,
    responses(
        (status = 201, description = "Ride requested", body = RideResponseBody),
        (status = 400, description = "Validation failure"),
        (status = 401, description = "Missing, invalid or non-passenger token")
    ),
    tags = ["rides"]
)]
#[post("/rides")]
pub async fn create_ride(
    state: web::Data<HttpState>,
    user: AuthedUser,
    body: web::Json<CreateRideRequestBody>,
) -> ApiResult<HttpResponse> {
    user.require_role(Role::Passenger)?;

    let body = body.into_inner();
    let passenger_id = parse_uuid(&body.passenger_id, "passenger_id")?;
    let ride_type = VehicleType::from_str(&body.ride_type).map_err(|_| {
        crate::domain::Error::invalid_request(format!("invalid ride_type: {}", body.ride_type))
    })?;

    let receipt = state
        .rides
        .create_ride(RideBooking {
            passenger_id,
            pickup_latitude: body.pickup_latitude,
            pickup_longitude: body.pickup_longitude,
            pickup_address: body.pickup_address,
            destination_latitude: body.destination_latitude,
            destination_longitude: body.destination_longitude,
            destination_address: body.destination_address,
            ride_type,
        })
        .await?;

    Ok(HttpResponse::Created().json(RideResponseBody {
        ride_id: receipt.ride_id.to_string(),
        ride_number: receipt.ride_number,
        status: receipt.status.to_string(),
        estimated_fare: receipt.estimated_fare,
        estimated_duration_minutes: receipt.estimated_duration_minutes,
        estimated_distance_km: receipt.estimated_distance_km,
    }))
}

/// Cancel a ride that has not been matched yet.
#[utoipa::path(
    post,
    path = "/rides/{ride_id}/cancel",
    request_body = CancelRideRequestBody,
    responses(
        (status = 200, description = "Ride cancelled", body = CancelRideResponseBody),
        (status = 404, description = "Unknown ride"),
        (status = 409, description = "Ride already matched or finished")
    ),
    params(("ride_id" = String, Path, description = "Ride identifier")),
    tags = ["rides"]
)]
#[post("/rides/{ride_id}/cancel")]
pub async fn cancel_ride(
    state: web::Data<HttpState>,
    user: AuthedUser,
    path: web::Path<String>,
    body: web::Json<CancelRideRequestBody>,
) -> ApiResult<HttpResponse> {
    user.require_role(Role::Passenger)?;

    let ride_id = parse_uuid(&path.into_inner(), "ride_id")?;
    let cancellation = state.rides.cancel_ride(ride_id, &body.reason).await?;

    Ok(HttpResponse::Ok().json(CancelRideResponseBody {
        ride_id: cancellation.ride_id.to_string(),
        status: cancellation.status.to_string(),
        cancelled_at: cancellation.cancelled_at.to_rfc3339(),
        message: "Ride cancelled successfully".to_string(),
    }))
}
