//! Operator read-model endpoints. ADMIN role only.

use actix_web::{get, web, HttpResponse};
use serde::Deserialize;

use crate::domain::ports::AdminQueryError;
use crate::domain::{Error, Role};

use super::auth::AuthedUser;
use super::error::ApiResult;
use super::state::HttpState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

fn map_admin_error(err: AdminQueryError) -> Error {
    Error::internal(err.to_string())
}

#[get("/admin/overview")]
pub async fn overview(state: web::Data<HttpState>, user: AuthedUser) -> ApiResult<HttpResponse> {
    user.require_role(Role::Admin)?;
    let overview = state
        .admin
        .system_overview()
        .await
        .map_err(map_admin_error)?;
    Ok(HttpResponse::Ok().json(overview))
}

#[get("/admin/rides/active")]
pub async fn active_rides(
    state: web::Data<HttpState>,
    user: AuthedUser,
    query: web::Query<PageQuery>,
) -> ApiResult<HttpResponse> {
    user.require_role(Role::Admin)?;
    let page = state
        .admin
        .active_rides(query.page, query.page_size)
        .await
        .map_err(map_admin_error)?;
    Ok(HttpResponse::Ok().json(page))
}

#[get("/admin/drivers/online")]
pub async fn online_drivers(
    state: web::Data<HttpState>,
    user: AuthedUser,
) -> ApiResult<HttpResponse> {
    user.require_role(Role::Admin)?;
    let drivers = state
        .admin
        .online_drivers()
        .await
        .map_err(map_admin_error)?;
    Ok(HttpResponse::Ok().json(drivers))
}

#[get("/admin/metrics")]
pub async fn metrics(state: web::Data<HttpState>, user: AuthedUser) -> ApiResult<HttpResponse> {
    user.require_role(Role::Admin)?;
    let metrics = state
        .admin
        .system_metrics()
        .await
        .map_err(map_admin_error)?;
    Ok(HttpResponse::Ok().json(metrics))
}
