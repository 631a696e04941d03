//! Registration, login and token refresh handlers.
//!
//! ```text
//! POST /register
//! POST /login
//! POST /refresh
//! ```

use std::str::FromStr;

use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::auth::Registration;
use crate::domain::{Error, Role, VehicleType};

use super::error::ApiResult;
use super::state::HttpState;

/// Registration request body. Driver fields are required when `role` is
/// `DRIVER` and ignored otherwise.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RegisterRequestBody {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[schema(example = "PASSENGER")]
    pub role: String,
    #[serde(default)]
    pub license_number: Option<String>,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub vehicle_attrs: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponseBody {
    #[schema(format = "uuid")]
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[schema(format = "date-time")]
    pub created_at: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LoginRequestBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPairBody {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RefreshRequestBody {
    pub refresh_token: String,
}

/// Create an account.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequestBody,
    responses(
        (status = 201, description = "Account created", body = RegisterResponseBody),
        (status = 400, description = "Validation failure"),
        (status = 409, description = "Email already registered")
    ),
    tags = ["auth"]
)]
#[post("/register")]
pub async fn register(
    state: web::Data<HttpState>,
    body: web::Json<RegisterRequestBody>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    let role = Role::from_str(&body.role)
        .map_err(|_| Error::invalid_request(format!("invalid role: {}", body.role)))?;
    let vehicle_type = body
        .vehicle_type
        .as_deref()
        .map(|raw| {
            VehicleType::from_str(raw)
                .map_err(|_| Error::invalid_request(format!("invalid vehicle_type: {raw}")))
        })
        .transpose()?;

    let user = state
        .auth
        .register(Registration {
            email: body.email,
            password: body.password,
            name: body.name,
            phone: body.phone,
            role,
            license_number: body.license_number,
            vehicle_type,
            vehicle_attrs: body.vehicle_attrs,
        })
        .await?;

    Ok(HttpResponse::Created().json(RegisterResponseBody {
        user_id: user.id.to_string(),
        email: user.email,
        role: user.role.to_string(),
        created_at: user.created_at.to_rfc3339(),
    }))
}

/// Exchange credentials for an access/refresh token pair.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequestBody,
    responses(
        (status = 200, description = "Authenticated", body = TokenPairBody),
        (status = 401, description = "Unknown email or wrong password")
    ),
    tags = ["auth"]
)]
#[post("/login")]
pub async fn login(
    state: web::Data<HttpState>,
    body: web::Json<LoginRequestBody>,
) -> ApiResult<HttpResponse> {
    let (_user, pair) = state.auth.login(&body.email, &body.password).await?;
    Ok(HttpResponse::Ok().json(TokenPairBody {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

/// Rotate a refresh token into a fresh pair.
#[utoipa::path(
    post,
    path = "/refresh",
    request_body = RefreshRequestBody,
    responses(
        (status = 200, description = "Tokens rotated", body = TokenPairBody),
        (status = 401, description = "Invalid or non-refresh token")
    ),
    tags = ["auth"]
)]
#[post("/refresh")]
pub async fn refresh(
    state: web::Data<HttpState>,
    body: web::Json<RefreshRequestBody>,
) -> ApiResult<HttpResponse> {
    let pair = state.auth.refresh(&body.refresh_token)?;
    Ok(HttpResponse::Ok().json(TokenPairBody {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}
