//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match the deployed migrations exactly; migrations
//! themselves are applied by the deployment tooling, in filename order, each
//! recorded once in `_migrations`.

diesel::table! {
    /// Registered accounts for passengers, drivers and admins.
    users (id) {
        id -> Uuid,
        email -> Varchar,
        role -> Varchar,
        status -> Varchar,
        password_hash -> Varchar,
        attrs -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// One-to-one driver extension of `users`.
    drivers (id) {
        id -> Uuid,
        license_number -> Varchar,
        vehicle_type -> Varchar,
        vehicle_attrs -> Jsonb,
        rating -> Float8,
        total_rides -> Int4,
        total_earnings -> Float8,
        status -> Varchar,
        is_verified -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// One row per driver online period; `ended_at` is null while online.
    driver_sessions (id) {
        id -> Uuid,
        driver_id -> Uuid,
        started_at -> Timestamptz,
        ended_at -> Nullable<Timestamptz>,
        total_rides -> Int4,
        total_earnings -> Float8,
    }
}

diesel::table! {
    /// Geotagged points; ride endpoints carry the estimate attachments.
    coordinates (id) {
        id -> Uuid,
        entity_id -> Uuid,
        entity_type -> Varchar,
        address -> Varchar,
        latitude -> Float8,
        longitude -> Float8,
        fare_amount -> Nullable<Float8>,
        distance_km -> Nullable<Float8>,
        duration_minutes -> Nullable<Int4>,
        is_current -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// The ride aggregate.
    rides (id) {
        id -> Uuid,
        ride_number -> Varchar,
        passenger_id -> Uuid,
        driver_id -> Nullable<Uuid>,
        vehicle_type -> Varchar,
        status -> Varchar,
        priority -> Int4,
        requested_at -> Timestamptz,
        matched_at -> Nullable<Timestamptz>,
        arrived_at -> Nullable<Timestamptz>,
        started_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        cancelled_at -> Nullable<Timestamptz>,
        cancellation_reason -> Nullable<Text>,
        estimated_fare -> Nullable<Float8>,
        final_fare -> Nullable<Float8>,
        pickup_coordinate_id -> Nullable<Uuid>,
        destination_coordinate_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only audit log per ride.
    ride_events (id) {
        id -> Uuid,
        ride_id -> Uuid,
        event_type -> Varchar,
        event_data -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only per-driver location trail.
    location_history (id) {
        id -> Uuid,
        coordinate_id -> Nullable<Uuid>,
        driver_id -> Uuid,
        ride_id -> Nullable<Uuid>,
        latitude -> Float8,
        longitude -> Float8,
        accuracy_meters -> Nullable<Float8>,
        speed_kmh -> Nullable<Float8>,
        heading_degrees -> Nullable<Float8>,
        recorded_at -> Timestamptz,
    }
}

diesel::joinable!(drivers -> users (id));
diesel::joinable!(driver_sessions -> drivers (driver_id));
diesel::joinable!(ride_events -> rides (ride_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    drivers,
    driver_sessions,
    coordinates,
    rides,
    ride_events,
    location_history,
);
