//! PostgreSQL-backed `RideRepository` implementation using Diesel.
//!
//! Every multi-row operation runs inside a single transaction. Status
//! transitions are compare-and-swap UPDATEs guarded by the expected status;
//! zero affected rows is reported as a conflict outcome, never retried here.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde_json::json;
use uuid::Uuid;

use crate::domain::ports::{
    CancelledRide, CreatedRide, RideDraft, RidePersistenceError, RideRepository, RideTransition,
    TransitionOutcome,
};
use crate::domain::{EntityType, LocationSample, RideEventType, RideStatus};

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{NewCoordinateRow, NewLocationHistoryRow, NewRideEventRow, NewRideRow};
use super::pool::{DbPool, PoolError};
use super::schema::{coordinates, location_history, ride_events, rides};

#[derive(Clone)]
pub struct DieselRideRepository {
    pool: DbPool,
}

impl DieselRideRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn pool_error(error: PoolError) -> RidePersistenceError {
    map_pool_error(error, RidePersistenceError::connection)
}

fn diesel_error(error: diesel::result::Error) -> RidePersistenceError {
    map_diesel_error(
        error,
        RidePersistenceError::query,
        RidePersistenceError::connection,
    )
}

fn parse_status(raw: &str) -> Result<RideStatus, RidePersistenceError> {
    RideStatus::from_str(raw).map_err(|err| RidePersistenceError::query(err.to_string()))
}

#[async_trait]
impl RideRepository for DieselRideRepository {
    async fn create_ride(&self, draft: RideDraft) -> Result<CreatedRide, RidePersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();
        let ride_id = Uuid::new_v4();
        let pickup_id = Uuid::new_v4();
        let destination_id = Uuid::new_v4();

        conn.transaction::<(), diesel::result::Error, _>(|conn| {
            let draft = &draft;
            async move {
                let endpoint_rows = [
                    (pickup_id, &draft.pickup),
                    (destination_id, &draft.destination),
                ];
                for (id, endpoint) in endpoint_rows {
                    diesel::insert_into(coordinates::table)
                        .values(&NewCoordinateRow {
                            id,
                            entity_id: draft.passenger_id,
                            entity_type: EntityType::Passenger.as_str(),
                            address: &endpoint.address,
                            latitude: endpoint.latitude,
                            longitude: endpoint.longitude,
                            fare_amount: Some(draft.estimated_fare),
                            distance_km: Some(draft.estimated_distance_km),
                            duration_minutes: Some(draft.estimated_duration_minutes),
                            is_current: false,
                            created_at: now,
                            updated_at: now,
                        })
                        .execute(conn)
                        .await?;
                }

                diesel::insert_into(rides::table)
                    .values(&NewRideRow {
                        id: ride_id,
                        ride_number: &draft.ride_number,
                        passenger_id: draft.passenger_id,
                        vehicle_type: draft.vehicle_type.as_str(),
                        status: RideStatus::Requested.as_str(),
                        priority: draft.priority,
                        requested_at: now,
                        estimated_fare: Some(draft.estimated_fare),
                        pickup_coordinate_id: Some(pickup_id),
                        destination_coordinate_id: Some(destination_id),
                        created_at: now,
                        updated_at: now,
                    })
                    .execute(conn)
                    .await?;

                let event_data = json!({
                    "old_status": null,
                    "new_status": RideStatus::Requested.as_str(),
                    "vehicle_type": draft.vehicle_type.as_str(),
                    "estimated_fare": draft.estimated_fare,
                    "pickup": { "lat": draft.pickup.latitude, "lng": draft.pickup.longitude },
                    "destination": {
                        "lat": draft.destination.latitude,
                        "lng": draft.destination.longitude,
                    },
                    "timestamp": now.to_rfc3339(),
                });
                diesel::insert_into(ride_events::table)
                    .values(&NewRideEventRow {
                        id: Uuid::new_v4(),
                        ride_id,
                        event_type: RideEventType::RideRequested.as_str(),
                        event_data: &event_data,
                        created_at: now,
                    })
                    .execute(conn)
                    .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(diesel_error)?;

        Ok(CreatedRide {
            ride_id,
            ride_number: draft.ride_number.clone(),
            status: RideStatus::Requested,
            requested_at: now,
        })
    }

    async fn transition(
        &self,
        ride_id: Uuid,
        expected: RideStatus,
        change: RideTransition,
    ) -> Result<TransitionOutcome, RidePersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();

        let RideTransition::Matched { driver_id } = change;
        conn.transaction::<TransitionOutcome, diesel::result::Error, _>(|conn| {
            async move {
                let updated = diesel::update(
                    rides::table
                        .filter(rides::id.eq(ride_id))
                        .filter(rides::status.eq(expected.as_str())),
                )
                .set((
                    rides::status.eq(RideStatus::Matched.as_str()),
                    rides::driver_id.eq(Some(driver_id)),
                    rides::matched_at.eq(Some(now)),
                    rides::updated_at.eq(now),
                ))
                .execute(conn)
                .await?;

                if updated == 0 {
                    return Ok(TransitionOutcome::Conflict);
                }

                let event_data = json!({
                    "old_status": expected.as_str(),
                    "new_status": RideStatus::Matched.as_str(),
                    "driver_id": driver_id,
                    "timestamp": now.to_rfc3339(),
                });
                diesel::insert_into(ride_events::table)
                    .values(&NewRideEventRow {
                        id: Uuid::new_v4(),
                        ride_id,
                        event_type: RideEventType::DriverMatched.as_str(),
                        event_data: &event_data,
                        created_at: now,
                    })
                    .execute(conn)
                    .await?;

                Ok(TransitionOutcome::Applied)
            }
            .scope_boxed()
        })
        .await
        .map_err(diesel_error)
    }

    async fn cancel(
        &self,
        ride_id: Uuid,
        reason: &str,
    ) -> Result<CancelledRide, RidePersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();

        let cancelled = conn
            .transaction::<bool, diesel::result::Error, _>(|conn| {
                async move {
                    let updated = diesel::update(
                        rides::table
                            .filter(rides::id.eq(ride_id))
                            .filter(rides::status.eq(RideStatus::Requested.as_str())),
                    )
                    .set((
                        rides::status.eq(RideStatus::Cancelled.as_str()),
                        rides::cancelled_at.eq(Some(now)),
                        rides::cancellation_reason.eq(Some(reason.to_string())),
                        rides::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                    if updated == 0 {
                        return Ok(false);
                    }

                    let event_data = json!({ "reason": reason, "timestamp": now.to_rfc3339() });
                    diesel::insert_into(ride_events::table)
                        .values(&NewRideEventRow {
                            id: Uuid::new_v4(),
                            ride_id,
                            event_type: RideEventType::RideCancelled.as_str(),
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

        if cancelled {
            return Ok(CancelledRide {
                ride_id,
                cancelled_at: now,
            });
        }

        // The guard did not match: tell a missing ride apart from one that
        // has already progressed past REQUESTED.
        let status = rides::table
            .filter(rides::id.eq(ride_id))
            .select(rides::status)
            .first::<String>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?;

        match status {
            None => Err(RidePersistenceError::not_found(ride_id)),
            Some(current) => Err(RidePersistenceError::conflict(format!(
                "ride cannot be cancelled (status: {current})"
            ))),
        }
    }

    async fn ride_status(&self, ride_id: Uuid) -> Result<RideStatus, RidePersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let raw = rides::table
            .filter(rides::id.eq(ride_id))
            .select(rides::status)
            .first::<String>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?
            .ok_or_else(|| RidePersistenceError::not_found(ride_id))?;

        parse_status(&raw)
    }

    async fn passenger_for_ride(&self, ride_id: Uuid) -> Result<Uuid, RidePersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        rides::table
            .filter(rides::id.eq(ride_id))
            .select(rides::passenger_id)
            .first::<Uuid>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?
            .ok_or_else(|| RidePersistenceError::not_found(ride_id))
    }

    async fn record_location_event(
        &self,
        ride_id: Uuid,
        sample: LocationSample,
    ) -> Result<(), RidePersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();

        conn.transaction::<(), diesel::result::Error, _>(|conn| {
            let sample = &sample;
            async move {
                let event_data = json!({
                    "driver_id": sample.driver_id,
                    "lat": sample.latitude,
                    "lng": sample.longitude,
                    "speed_kmh": sample.speed_kmh,
                    "heading_degrees": sample.heading_degrees,
                    "timestamp": now.to_rfc3339(),
                });
                diesel::insert_into(ride_events::table)
                    .values(&NewRideEventRow {
                        id: Uuid::new_v4(),
                        ride_id,
                        event_type: RideEventType::LocationUpdated.as_str(),
                        event_data: &event_data,
                        created_at: now,
                    })
                    .execute(conn)
                    .await?;

                diesel::insert_into(location_history::table)
                    .values(&NewLocationHistoryRow {
                        id: Uuid::new_v4(),
                        coordinate_id: None,
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

                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(diesel_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn status_parsing_rejects_corrupt_values() {
        let err = parse_status("FLYING").expect_err("must fail");
        assert!(matches!(err, RidePersistenceError::Query { .. }));
    }

    #[rstest]
    fn status_parsing_accepts_every_lifecycle_state() {
        for raw in [
            "REQUESTED",
            "MATCHED",
            "EN_ROUTE",
            "ARRIVED",
            "IN_PROGRESS",
            "COMPLETED",
            "CANCELLED",
        ] {
            assert!(parse_status(raw).is_ok(), "{raw} must parse");
        }
    }

    #[rstest]
    fn pool_error_maps_to_connection_variant() {
        let err = pool_error(PoolError::checkout("timed out"));
        assert!(matches!(err, RidePersistenceError::Connection { .. }));
    }
}
