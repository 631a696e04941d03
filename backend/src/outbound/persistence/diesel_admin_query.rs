//! Read-only Diesel adapter behind the operator endpoints.
//!
//! Aggregates that would need interval arithmetic in SQL are computed in
//! process from small projections; the fleet sizes involved keep these
//! queries cheap.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{
    ActiveRideSummary, ActiveRidesPage, AdminQuery, AdminQueryError, OnlineDriver, SystemMetrics,
    SystemOverview,
};
use crate::domain::{DriverStatus, EntityType, RideStatus};

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::pool::{DbPool, PoolError};
use super::schema::{coordinates, driver_sessions, drivers, rides, users};

#[derive(Clone)]
pub struct DieselAdminQuery {
    pool: DbPool,
}

impl DieselAdminQuery {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn pool_error(error: PoolError) -> AdminQueryError {
    map_pool_error(error, AdminQueryError::connection)
}

fn diesel_error(error: diesel::result::Error) -> AdminQueryError {
    map_diesel_error(error, AdminQueryError::query, AdminQueryError::connection)
}

fn active_statuses() -> [&'static str; 5] {
    [
        RideStatus::Requested.as_str(),
        RideStatus::Matched.as_str(),
        RideStatus::EnRoute.as_str(),
        RideStatus::Arrived.as_str(),
        RideStatus::InProgress.as_str(),
    ]
}

fn mean_minutes(spans: &[Duration]) -> f64 {
    if spans.is_empty() {
        return 0.0;
    }
    let total_seconds: i64 = spans.iter().map(Duration::num_seconds).sum();
    total_seconds as f64 / 60.0 / spans.len() as f64
}

#[async_trait]
impl AdminQuery for DieselAdminQuery {
    async fn system_overview(&self) -> Result<SystemOverview, AdminQueryError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let day_start = Utc::now().date_naive().and_hms_opt(0, 0, 0).map_or_else(
            Utc::now,
            |naive| DateTime::from_naive_utc_and_offset(naive, Utc),
        );

        let total_users = users::table
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(diesel_error)?;
        let total_drivers = drivers::table
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(diesel_error)?;
        let online_drivers = drivers::table
            .filter(drivers::status.ne(DriverStatus::Offline.as_str()))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(diesel_error)?;
        let active_rides = rides::table
            .filter(rides::status.eq_any(active_statuses()))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(diesel_error)?;
        let completed_rides_today = rides::table
            .filter(rides::status.eq(RideStatus::Completed.as_str()))
            .filter(rides::completed_at.ge(Some(day_start)))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(diesel_error)?;
        let cancelled_rides_today = rides::table
            .filter(rides::status.eq(RideStatus::Cancelled.as_str()))
            .filter(rides::cancelled_at.ge(Some(day_start)))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(diesel_error)?;

        let metrics = self.system_metrics().await?;

        Ok(SystemOverview {
            total_users,
            total_drivers,
            online_drivers,
            active_rides,
            completed_rides_today,
            cancelled_rides_today,
            metrics,
        })
    }

    async fn active_rides(
        &self,
        page: i64,
        page_size: i64,
    ) -> Result<ActiveRidesPage, AdminQueryError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);

        let total = rides::table
            .filter(rides::status.eq_any(active_statuses()))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(diesel_error)?;

        type ActiveRow = (Uuid, String, String, Uuid, Option<Uuid>, String, DateTime<Utc>);
        let rows: Vec<ActiveRow> = rides::table
            .filter(rides::status.eq_any(active_statuses()))
            .order(rides::requested_at.desc())
            .offset((page - 1) * page_size)
            .limit(page_size)
            .select((
                rides::id,
                rides::ride_number,
                rides::status,
                rides::passenger_id,
                rides::driver_id,
                rides::vehicle_type,
                rides::requested_at,
            ))
            .load(&mut conn)
            .await
            .map_err(diesel_error)?;

        let rides = rows
            .into_iter()
            .map(
                |(ride_id, ride_number, status, passenger_id, driver_id, vehicle_type, requested_at)| {
                    ActiveRideSummary {
                        ride_id,
                        ride_number,
                        status,
                        passenger_id,
                        driver_id,
                        vehicle_type,
                        requested_at,
                    }
                },
            )
            .collect();

        Ok(ActiveRidesPage {
            rides,
            page,
            page_size,
            total,
        })
    }

    async fn online_drivers(&self) -> Result<Vec<OnlineDriver>, AdminQueryError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let sessions: Vec<(Uuid, DateTime<Utc>)> = driver_sessions::table
            .filter(driver_sessions::ended_at.is_null())
            .select((driver_sessions::driver_id, driver_sessions::started_at))
            .load(&mut conn)
            .await
            .map_err(diesel_error)?;
        if sessions.is_empty() {
            return Ok(Vec::new());
        }
        let driver_ids: Vec<Uuid> = sessions.iter().map(|(id, _)| *id).collect();

        let driver_rows: Vec<(Uuid, String, f64)> = drivers::table
            .filter(drivers::id.eq_any(&driver_ids))
            .select((drivers::id, drivers::status, drivers::rating))
            .load(&mut conn)
            .await
            .map_err(diesel_error)?;

        let emails: Vec<(Uuid, String)> = users::table
            .filter(users::id.eq_any(&driver_ids))
            .select((users::id, users::email))
            .load(&mut conn)
            .await
            .map_err(diesel_error)?;

        let positions: Vec<(Uuid, f64, f64)> = coordinates::table
            .filter(coordinates::entity_id.eq_any(&driver_ids))
            .filter(coordinates::entity_type.eq(EntityType::Driver.as_str()))
            .filter(coordinates::is_current.eq(true))
            .select((coordinates::entity_id, coordinates::latitude, coordinates::longitude))
            .load(&mut conn)
            .await
            .map_err(diesel_error)?;

        let listing = sessions
            .into_iter()
            .filter_map(|(driver_id, session_started_at)| {
                let (_, status, rating) = driver_rows
                    .iter()
                    .find(|(id, _, _)| *id == driver_id)?
                    .clone();
                let email = emails
                    .iter()
                    .find(|(id, _)| *id == driver_id)
                    .map(|(_, email)| email.clone())
                    .unwrap_or_default();
                let position = positions.iter().find(|(id, _, _)| *id == driver_id);
                Some(OnlineDriver {
                    driver_id,
                    email,
                    status,
                    rating,
                    latitude: position.map(|(_, lat, _)| *lat),
                    longitude: position.map(|(_, _, lng)| *lng),
                    session_started_at,
                })
            })
            .collect();

        Ok(listing)
    }

    async fn system_metrics(&self) -> Result<SystemMetrics, AdminQueryError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let total_rides = rides::table
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(diesel_error)?;
        let cancelled_rides = rides::table
            .filter(rides::status.eq(RideStatus::Cancelled.as_str()))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .map_err(diesel_error)?;

        let matched: Vec<(DateTime<Utc>, Option<DateTime<Utc>>)> = rides::table
            .filter(rides::matched_at.is_not_null())
            .select((rides::requested_at, rides::matched_at))
            .load(&mut conn)
            .await
            .map_err(diesel_error)?;
        let waits: Vec<Duration> = matched
            .into_iter()
            .filter_map(|(requested_at, matched_at)| Some(matched_at? - requested_at))
            .collect();

        let finished: Vec<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> = rides::table
            .filter(rides::completed_at.is_not_null())
            .select((rides::started_at, rides::completed_at))
            .load(&mut conn)
            .await
            .map_err(diesel_error)?;
        let durations: Vec<Duration> = finished
            .into_iter()
            .filter_map(|(started_at, completed_at)| Some(completed_at? - started_at?))
            .collect();

        let cancellation_rate = if total_rides == 0 {
            0.0
        } else {
            cancelled_rides as f64 / total_rides as f64
        };

        Ok(SystemMetrics {
            average_wait_time_minutes: mean_minutes(&waits),
            average_ride_duration_minutes: mean_minutes(&durations),
            cancellation_rate,
            total_rides,
        })
    }
}
