//! PostgreSQL-backed `DriverRepository` implementation using Diesel.
//!
//! Shift, location and trip mutations are single transactions. The current-
//! coordinate write is an update-or-insert keyed on `(entity_id, driver)`
//! with `is_current = true`, so the uniqueness of the current row survives
//! every code path.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde_json::json;
use uuid::Uuid;

use crate::domain::ports::{
    DriverPersistenceError, DriverProfile, DriverRepository, OnlineSession, RideCompletionRecord,
    SavedLocation, SessionSummary,
};
use crate::domain::{DriverStatus, EntityType, LocationSample, RideEventType, RideStatus};

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{
    DriverRow, DriverSessionRow, NewCoordinateRow, NewDriverSessionRow, NewLocationHistoryRow,
    NewRideEventRow, UserRow,
};
use super::pool::{DbPool, PoolError};
use super::schema::{coordinates, driver_sessions, drivers, location_history, ride_events, rides, users};

#[derive(Clone)]
pub struct DieselDriverRepository {
    pool: DbPool,
}

impl DieselDriverRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn pool_error(error: PoolError) -> DriverPersistenceError {
    map_pool_error(error, DriverPersistenceError::connection)
}

fn diesel_error(error: diesel::result::Error) -> DriverPersistenceError {
    map_diesel_error(
        error,
        DriverPersistenceError::query,
        DriverPersistenceError::connection,
    )
}

fn parse_driver_status(raw: &str) -> Result<DriverStatus, DriverPersistenceError> {
    DriverStatus::from_str(raw).map_err(|err| DriverPersistenceError::query(err.to_string()))
}

fn parse_ride_status(raw: &str) -> Result<RideStatus, DriverPersistenceError> {
    RideStatus::from_str(raw).map_err(|err| DriverPersistenceError::query(err.to_string()))
}

/// Update the driver's current coordinate or create it, returning its id.
async fn upsert_current_coordinate(
    conn: &mut AsyncPgConnection,
    driver_id: Uuid,
    latitude: f64,
    longitude: f64,
    now: DateTime<Utc>,
) -> Result<Uuid, diesel::result::Error> {
    let existing = coordinates::table
        .filter(coordinates::entity_id.eq(driver_id))
        .filter(coordinates::entity_type.eq(EntityType::Driver.as_str()))
        .filter(coordinates::is_current.eq(true))
        .select(coordinates::id)
        .first::<Uuid>(conn)
        .await
        .optional()?;

    match existing {
        Some(coordinate_id) => {
            diesel::update(coordinates::table.filter(coordinates::id.eq(coordinate_id)))
                .set((
                    coordinates::latitude.eq(latitude),
                    coordinates::longitude.eq(longitude),
                    coordinates::updated_at.eq(now),
                ))
                .execute(conn)
                .await?;
            Ok(coordinate_id)
        }
        None => {
            let coordinate_id = Uuid::new_v4();
            diesel::insert_into(coordinates::table)
                .values(&NewCoordinateRow {
                    id: coordinate_id,
                    entity_id: driver_id,
                    entity_type: EntityType::Driver.as_str(),
                    address: "Unknown",
                    latitude,
                    longitude,
                    fare_amount: None,
                    distance_km: None,
                    duration_minutes: None,
                    is_current: true,
                    created_at: now,
                    updated_at: now,
                })
                .execute(conn)
                .await?;
            Ok(coordinate_id)
        }
    }
}

#[async_trait]
impl DriverRepository for DieselDriverRepository {
    async fn status(&self, driver_id: Uuid) -> Result<DriverStatus, DriverPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let raw = drivers::table
            .filter(drivers::id.eq(driver_id))
            .select(drivers::status)
            .first::<String>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?
            .ok_or_else(|| DriverPersistenceError::not_found(driver_id))?;

        parse_driver_status(&raw)
    }

    async fn go_online(
        &self,
        driver_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<OnlineSession, DriverPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();
        let session_id = Uuid::new_v4();

        conn.transaction::<(), diesel::result::Error, _>(|conn| {
            async move {
                diesel::insert_into(driver_sessions::table)
                    .values(&NewDriverSessionRow {
                        id: session_id,
                        driver_id,
                        started_at: now,
                        total_rides: 0,
                        total_earnings: 0.0,
                    })
                    .execute(conn)
                    .await?;

                diesel::update(drivers::table.filter(drivers::id.eq(driver_id)))
                    .set((
                        drivers::status.eq(DriverStatus::Available.as_str()),
                        drivers::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                diesel::insert_into(location_history::table)
                    .values(&NewLocationHistoryRow {
                        id: Uuid::new_v4(),
                        coordinate_id: None,
                        driver_id,
                        ride_id: None,
                        latitude,
                        longitude,
                        accuracy_meters: None,
                        speed_kmh: None,
                        heading_degrees: None,
                        recorded_at: now,
                    })
                    .execute(conn)
                    .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(diesel_error)?;

        Ok(OnlineSession {
            session_id,
            status: DriverStatus::Available,
        })
    }

    async fn go_offline(&self, driver_id: Uuid) -> Result<SessionSummary, DriverPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();

        let session = conn
            .transaction::<Option<DriverSessionRow>, diesel::result::Error, _>(|conn| {
                async move {
                    let open = driver_sessions::table
                        .filter(driver_sessions::driver_id.eq(driver_id))
                        .filter(driver_sessions::ended_at.is_null())
                        .order(driver_sessions::started_at.desc())
                        .select(DriverSessionRow::as_select())
                        .first::<DriverSessionRow>(conn)
                        .await
                        .optional()?;

                    let Some(session) = open else {
                        return Ok(None);
                    };

                    diesel::update(
                        driver_sessions::table.filter(driver_sessions::id.eq(session.id)),
                    )
                    .set(driver_sessions::ended_at.eq(Some(now)))
                    .execute(conn)
                    .await?;

                    diesel::update(drivers::table.filter(drivers::id.eq(driver_id)))
                        .set((
                            drivers::status.eq(DriverStatus::Offline.as_str()),
                            drivers::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;

                    Ok(Some(session))
                }
                .scope_boxed()
            })
            .await
            .map_err(diesel_error)?;

        let session = session
            .ok_or_else(|| DriverPersistenceError::conflict("driver has no open session"))?;

        let duration_hours = (now - session.started_at).num_seconds() as f64 / 3600.0;
        Ok(SessionSummary {
            session_id: session.id,
            duration_hours,
            rides_completed: session.total_rides,
            earnings: session.total_earnings,
        })
    }

    async fn save_location(
        &self,
        sample: &LocationSample,
    ) -> Result<SavedLocation, DriverPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();

        let coordinate_id = conn
            .transaction::<Uuid, diesel::result::Error, _>(|conn| {
                async move {
                    let coordinate_id = upsert_current_coordinate(
                        conn,
                        sample.driver_id,
                        sample.latitude,
                        sample.longitude,
                        now,
                    )
                    .await?;

                    diesel::insert_into(location_history::table)
                        .values(&NewLocationHistoryRow {
                            id: Uuid::new_v4(),
                            coordinate_id: Some(coordinate_id),
                            driver_id: sample.driver_id,
                            ride_id: sample.ride_id,
                            latitude: sample.latitude,
                            longitude: sample.longitude,
                            accuracy_meters: sample.accuracy_meters,
                            speed_kmh: sample.speed_kmh,
                            heading_degrees: sample.heading_degrees,
                            recorded_at: now,
                        })
                        .execute(conn)
                        .await?;

                    Ok(coordinate_id)
                }
                .scope_boxed()
            })
            .await
            .map_err(diesel_error)?;

        Ok(SavedLocation {
            coordinate_id,
            recorded_at: now,
        })
    }

    async fn start_ride(
        &self,
        driver_id: Uuid,
        ride_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<DateTime<Utc>, DriverPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();

        let started = conn
            .transaction::<bool, diesel::result::Error, _>(|conn| {
                async move {
                    let updated = diesel::update(
                        rides::table
                            .filter(rides::id.eq(ride_id))
                            .filter(rides::driver_id.eq(Some(driver_id)))
                            .filter(rides::status.ne_all([
                                RideStatus::Completed.as_str(),
                                RideStatus::Cancelled.as_str(),
                            ])),
                    )
                    .set((
                        rides::status.eq(RideStatus::InProgress.as_str()),
                        rides::started_at.eq(Some(now)),
                        rides::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                    if updated == 0 {
                        return Ok(false);
                    }

                    diesel::update(drivers::table.filter(drivers::id.eq(driver_id)))
                        .set((
                            drivers::status.eq(DriverStatus::Busy.as_str()),
                            drivers::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;

                    let coordinate_id =
                        upsert_current_coordinate(conn, driver_id, latitude, longitude, now)
                            .await?;

                    diesel::insert_into(location_history::table)
                        .values(&NewLocationHistoryRow {
                            id: Uuid::new_v4(),
                            coordinate_id: Some(coordinate_id),
                            driver_id,
                            ride_id: Some(ride_id),
                            latitude,
                            longitude,
                            accuracy_meters: None,
                            speed_kmh: None,
                            heading_degrees: None,
                            recorded_at: now,
                        })
                        .execute(conn)
                        .await?;

                    let event_data = json!({
                        "driver_id": driver_id,
                        "new_status": RideStatus::InProgress.as_str(),
                        "timestamp": now.to_rfc3339(),
                    });
                    diesel::insert_into(ride_events::table)
                        .values(&NewRideEventRow {
                            id: Uuid::new_v4(),
                            ride_id,
                            event_type: RideEventType::RideStarted.as_str(),
                            event_data: &event_data,
                            created_at: now,
                        })
                        .execute(conn)
                        .await?;

                    Ok(true)
                }
                .scope_boxed()
            })
            .await
            .map_err(diesel_error)?;

        if !started {
            return Err(DriverPersistenceError::conflict(
                "ride cannot be started (already completed or cancelled)",
            ));
        }
        Ok(now)
    }

    async fn complete_ride(
        &self,
        completion: RideCompletionRecord,
    ) -> Result<DateTime<Utc>, DriverPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();

        let completed = conn
            .transaction::<bool, diesel::result::Error, _>(|conn| {
                let completion = &completion;
                async move {
                    let updated = diesel::update(
                        rides::table
                            .filter(rides::id.eq(completion.ride_id))
                            .filter(rides::driver_id.eq(Some(completion.driver_id)))
                            .filter(rides::status.ne_all([
                                RideStatus::Completed.as_str(),
                                RideStatus::Cancelled.as_str(),
                            ])),
                    )
                    .set((
                        rides::status.eq(RideStatus::Completed.as_str()),
                        rides::final_fare.eq(Some(completion.earning)),
                        rides::completed_at.eq(Some(now)),
                        rides::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                    if updated == 0 {
                        return Ok(false);
                    }

                    diesel::update(drivers::table.filter(drivers::id.eq(completion.driver_id)))
                        .set((
                            drivers::status.eq(DriverStatus::Available.as_str()),
                            drivers::total_rides.eq(drivers::total_rides + 1),
                            drivers::total_earnings.eq(drivers::total_earnings + completion.earning),
                            drivers::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;

                    diesel::update(
                        driver_sessions::table
                            .filter(driver_sessions::driver_id.eq(completion.driver_id))
                            .filter(driver_sessions::ended_at.is_null()),
                    )
                    .set((
                        driver_sessions::total_rides.eq(driver_sessions::total_rides + 1),
                        driver_sessions::total_earnings
                            .eq(driver_sessions::total_earnings + completion.earning),
                    ))
                    .execute(conn)
                    .await?;

                    let event_data = json!({
                        "driver_id": completion.driver_id,
                        "earned": completion.earning,
                        "distance_km": completion.actual_distance_km,
                        "duration_min": completion.actual_duration_minutes,
                        "final_location": {
                            "lat": completion.final_latitude,
                            "lng": completion.final_longitude,
                        },
                        "completed_at": now.to_rfc3339(),
                    });
                    diesel::insert_into(ride_events::table)
                        .values(&NewRideEventRow {
                            id: Uuid::new_v4(),
                            ride_id: completion.ride_id,
                            event_type: RideEventType::RideCompleted.as_str(),
                            event_data: &event_data,
                            created_at: now,
                        })
                        .execute(conn)
                        .await?;

                    Ok(true)
                }
                .scope_boxed()
            })
            .await
            .map_err(diesel_error)?;

        if !completed {
            return Err(DriverPersistenceError::conflict(
                "ride cannot be completed (already completed or cancelled)",
            ));
        }
        Ok(now)
    }

    async fn ride_status(
        &self,
        driver_id: Uuid,
        ride_id: Uuid,
    ) -> Result<RideStatus, DriverPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let raw = rides::table
            .filter(rides::id.eq(ride_id))
            .filter(rides::driver_id.eq(Some(driver_id)))
            .select(rides::status)
            .first::<String>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?
            .ok_or_else(|| {
                DriverPersistenceError::conflict("ride is not assigned to this driver")
            })?;

        parse_ride_status(&raw)
    }

    async fn profile(&self, driver_id: Uuid) -> Result<DriverProfile, DriverPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let driver = drivers::table
            .filter(drivers::id.eq(driver_id))
            .select(DriverRow::as_select())
            .first::<DriverRow>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?
            .ok_or_else(|| DriverPersistenceError::not_found(driver_id))?;

        let user = users::table
            .filter(users::id.eq(driver_id))
            .select(UserRow::as_select())
            .first::<UserRow>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?;

        let name = user
            .as_ref()
            .and_then(|row| {
                row.attrs
                    .get("name")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            })
            .or_else(|| user.as_ref().map(|row| row.email.clone()))
            .unwrap_or_default();

        let status = parse_driver_status(&driver.status)?;
        let vehicle = serde_json::from_value(driver.vehicle_attrs).unwrap_or_default();

        Ok(DriverProfile {
            driver_id,
            name,
            rating: driver.rating,
            status,
            vehicle,
        })
    }

    async fn driver_for_ride(&self, ride_id: Uuid) -> Result<Uuid, DriverPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        rides::table
            .filter(rides::id.eq(ride_id))
            .select(rides::driver_id)
            .first::<Option<Uuid>>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?
            .flatten()
            .ok_or_else(|| DriverPersistenceError::conflict("ride has no assigned driver"))
    }

    async fn pickup_location(&self, ride_id: Uuid) -> Result<(f64, f64), DriverPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let pickup_coordinate_id = rides::table
            .filter(rides::id.eq(ride_id))
            .select(rides::pickup_coordinate_id)
            .first::<Option<Uuid>>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?
            .flatten()
            .ok_or_else(|| DriverPersistenceError::conflict("ride has no pickup coordinate"))?;

        coordinates::table
            .filter(coordinates::id.eq(pickup_coordinate_id))
            .select((coordinates::latitude, coordinates::longitude))
            .first::<(f64, f64)>(&mut conn)
            .await
            .map_err(diesel_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn driver_status_parsing_rejects_corrupt_values() {
        let err = parse_driver_status("NAPPING").expect_err("must fail");
        assert!(matches!(err, DriverPersistenceError::Query { .. }));
    }

    #[rstest]
    fn ride_status_parsing_accepts_in_progress() {
        assert_eq!(
            parse_ride_status("IN_PROGRESS").expect("parse"),
            RideStatus::InProgress
        );
    }

    #[rstest]
    fn pool_error_maps_to_connection_variant() {
        let err = pool_error(PoolError::build("bad url"));
        assert!(matches!(err, DriverPersistenceError::Connection { .. }));
    }
}
