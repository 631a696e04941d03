//! Driver HTTP handlers.
//!
//! ```text
//! POST /drivers/{driver_id}/online
//! POST /drivers/{driver_id}/offline
//! POST /drivers/{driver_id}/location
//! POST /drivers/{driver_id}/start
//! POST /drivers/{driver_id}/complete
//! ```
//!
//! All routes require a DRIVER access token whose subject matches the path
//! identifier.

use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::driver_service::{LocationPing, RideCompletion};
use crate::domain::Role;

use super::auth::AuthedUser;
use super::error::ApiResult;
use super::state::HttpState;
use super::validation::parse_uuid;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct OnlineRequestBody {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OnlineResponseBody {
    pub status: String,
    #[schema(format = "uuid")]
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummaryBody {
    pub duration_hours: f64,
    pub rides_completed: i32,
    pub earnings: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OfflineResponseBody {
    pub status: String,
    #[schema(format = "uuid")]
    pub session_id: String,
    pub session_summary: SessionSummaryBody,
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LocationRequestBody {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy_meters: f64,
    #[serde(default)]
    pub speed_kmh: f64,
    #[serde(default)]
    pub heading_degrees: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationResponseBody {
    #[schema(format = "uuid")]
    pub coordinate_id: String,
    #[schema(format = "date-time")]
    pub updated_at: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PointBody {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct StartRequestBody {
    #[schema(format = "uuid")]
    pub ride_id: String,
    pub driver_location: PointBody,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartResponseBody {
    #[schema(format = "uuid")]
    pub ride_id: String,
    pub status: String,
    #[schema(format = "date-time")]
    pub started_at: String,
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CompleteRequestBody {
    #[schema(format = "uuid")]
    pub ride_id: String,
    pub final_location: PointBody,
    pub actual_distance_km: f64,
    pub actual_duration_minutes: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompleteResponseBody {
    #[schema(format = "uuid")]
    pub ride_id: String,
    pub status: String,
    #[schema(format = "date-time")]
    pub completed_at: String,
    pub driver_earning: f64,
    pub message: String,
}

fn authorized_driver(user: &AuthedUser, path_id: &str) -> ApiResult<Uuid> {
    user.require_role(Role::Driver)?;
    let driver_id = parse_uuid(path_id, "driver_id")?;
    user.require_subject(driver_id)?;
    Ok(driver_id)
}

/// Open a shift and start receiving offers.
#[utoipa::path(
    post,
    path = "/drivers/{driver_id}/online",
    request_body = OnlineRequestBody,
    responses(
        (status = 200, description = "Driver online", body = OnlineResponseBody),
        (status = 403, description = "Token subject does not match path"),
        (status = 409, description = "Driver is not offline")
    ),
    params(("driver_id" = String, Path, description = "Driver identifier")),
    tags = ["drivers"]
)]
#[post("/drivers/{driver_id}/online")]
pub async fn go_online(
    state: web::Data<HttpState>,
    user: AuthedUser,
    path: web::Path<String>,
    body: web::Json<OnlineRequestBody>,
) -> ApiResult<HttpResponse> {
    let driver_id = authorized_driver(&user, &path.into_inner())?;

    let session = state
        .drivers
        .go_online(driver_id, body.latitude, body.longitude)
        .await?;

    Ok(HttpResponse::Ok().json(OnlineResponseBody {
        status: session.status.to_string(),
        session_id: session.session_id.to_string(),
        message: "You are now online and ready to accept rides".to_string(),
    }))
}

/// Close the shift.
#[utoipa::path(
    post,
    path = "/drivers/{driver_id}/offline",
    responses(
        (status = 200, description = "Driver offline", body = OfflineResponseBody),
        (status = 409, description = "Driver is on an active job")
    ),
    params(("driver_id" = String, Path, description = "Driver identifier")),
    tags = ["drivers"]
)]
#[post("/drivers/{driver_id}/offline")]
pub async fn go_offline(
    state: web::Data<HttpState>,
    user: AuthedUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let driver_id = authorized_driver(&user, &path.into_inner())?;

    let summary = state.drivers.go_offline(driver_id).await?;

    Ok(HttpResponse::Ok().json(OfflineResponseBody {
        status: crate::domain::DriverStatus::Offline.to_string(),
        session_id: summary.session_id.to_string(),
        session_summary: SessionSummaryBody {
            duration_hours: summary.duration_hours,
            rides_completed: summary.rides_completed,
            earnings: summary.earnings,
        },
        message: "You are now offline".to_string(),
    }))
}

/// Report the driver's current position.
#[utoipa::path(
    post,
    path = "/drivers/{driver_id}/location",
    request_body = LocationRequestBody,
    responses(
        (status = 200, description = "Location stored", body = LocationResponseBody),
        (status = 400, description = "Out-of-range coordinates or metrics"),
        (status = 409, description = "Driver is offline")
    ),
    params(("driver_id" = String, Path, description = "Driver identifier")),
    tags = ["drivers"]
)]
#[post("/drivers/{driver_id}/location")]
pub async fn update_location(
    state: web::Data<HttpState>,
    user: AuthedUser,
    path: web::Path<String>,
    body: web::Json<LocationRequestBody>,
) -> ApiResult<HttpResponse> {
    let driver_id = authorized_driver(&user, &path.into_inner())?;

    let saved = state
        .drivers
        .update_location(
            driver_id,
            LocationPing {
                latitude: body.latitude,
                longitude: body.longitude,
                accuracy_meters: body.accuracy_meters,
                speed_kmh: body.speed_kmh,
                heading_degrees: body.heading_degrees,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(LocationResponseBody {
        coordinate_id: saved.coordinate_id.to_string(),
        updated_at: saved.recorded_at.to_rfc3339(),
    }))
}

/// Begin the trip for a matched ride.
#[utoipa::path(
    post,
    path = "/drivers/{driver_id}/start",
    request_body = StartRequestBody,
    responses(
        (status = 200, description = "Ride started", body = StartResponseBody),
        (status = 409, description = "Ride finished or driver unavailable")
    ),
    params(("driver_id" = String, Path, description = "Driver identifier")),
    tags = ["drivers"]
)]
#[post("/drivers/{driver_id}/start")]
pub async fn start_ride(
    state: web::Data<HttpState>,
    user: AuthedUser,
    path: web::Path<String>,
    body: web::Json<StartRequestBody>,
) -> ApiResult<HttpResponse> {
    let driver_id = authorized_driver(&user, &path.into_inner())?;
    let ride_id = parse_uuid(&body.ride_id, "ride_id")?;

    let started = state
        .drivers
        .start_ride(
            driver_id,
            ride_id,
            body.driver_location.latitude,
            body.driver_location.longitude,
        )
        .await?;

    Ok(HttpResponse::Ok().json(StartResponseBody {
        ride_id: started.ride_id.to_string(),
        status: started.driver_status.to_string(),
        started_at: started.started_at.to_rfc3339(),
        message: "Ride started successfully".to_string(),
    }))
}

/// Finish the trip and collect the earning.
#[utoipa::path(
    post,
    path = "/drivers/{driver_id}/complete",
    request_body = CompleteRequestBody,
    responses(
        (status = 200, description = "Ride completed", body = CompleteResponseBody),
        (status = 400, description = "Non-positive actuals or bad coordinates"),
        (status = 409, description = "Ride finished or driver not busy")
    ),
    params(("driver_id" = String, Path, description = "Driver identifier")),
    tags = ["drivers"]
)]
#[post("/drivers/{driver_id}/complete")]
pub async fn complete_ride(
    state: web::Data<HttpState>,
    user: AuthedUser,
    path: web::Path<String>,
    body: web::Json<CompleteRequestBody>,
) -> ApiResult<HttpResponse> {
    let driver_id = authorized_driver(&user, &path.into_inner())?;
    let ride_id = parse_uuid(&body.ride_id, "ride_id")?;

    let completed = state
        .drivers
        .complete_ride(
            driver_id,
            RideCompletion {
                ride_id,
                final_latitude: body.final_location.latitude,
                final_longitude: body.final_location.longitude,
                actual_distance_km: body.actual_distance_km,
                actual_duration_minutes: body.actual_duration_minutes,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(CompleteResponseBody {
        ride_id: completed.ride_id.to_string(),
        status: completed.driver_status.to_string(),
        completed_at: completed.completed_at.to_rfc3339(),
        driver_earning: completed.driver_earning,
        message: "Ride completed successfully".to_string(),
    }))
}
