//! Row structs bridging the SQL schema and the domain entities.
//!
//! Enum-valued columns are stored as text and parsed through the domain
//! `FromStr` impls during row conversion, so a corrupted value surfaces as a
//! query error instead of a panic.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{
    coordinates, driver_sessions, drivers, location_history, ride_events, rides, users,
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub status: String,
    pub password_hash: String,
    pub attrs: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub role: &'a str,
    pub status: &'a str,
    pub password_hash: &'a str,
    pub attrs: &'a serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = drivers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DriverRow {
    pub id: Uuid,
    pub license_number: String,
    pub vehicle_type: String,
    pub vehicle_attrs: serde_json::Value,
    pub rating: f64,
    pub total_rides: i32,
    pub total_earnings: f64,
    pub status: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = drivers)]
pub struct NewDriverRow<'a> {
    pub id: Uuid,
    pub license_number: &'a str,
    pub vehicle_type: &'a str,
    pub vehicle_attrs: &'a serde_json::Value,
    pub rating: f64,
    pub total_rides: i32,
    pub total_earnings: f64,
    pub status: &'a str,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = driver_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DriverSessionRow {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_rides: i32,
    pub total_earnings: f64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = driver_sessions)]
pub struct NewDriverSessionRow {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total_rides: i32,
    pub total_earnings: f64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = coordinates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CoordinateRow {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub fare_amount: Option<f64>,
    pub distance_km: Option<f64>,
    pub duration_minutes: Option<i32>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = coordinates)]
pub struct NewCoordinateRow<'a> {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: &'a str,
    pub address: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub fare_amount: Option<f64>,
    pub distance_km: Option<f64>,
    pub duration_minutes: Option<i32>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = rides)]
pub struct NewRideRow<'a> {
    pub id: Uuid,
    pub ride_number: &'a str,
    pub passenger_id: Uuid,
    pub vehicle_type: &'a str,
    pub status: &'a str,
    pub priority: i32,
    pub requested_at: DateTime<Utc>,
    pub estimated_fare: Option<f64>,
    pub pickup_coordinate_id: Option<Uuid>,
    pub destination_coordinate_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ride_events)]
pub struct NewRideEventRow<'a> {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub event_type: &'a str,
    pub event_data: &'a serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = location_history)]
pub struct NewLocationHistoryRow {
    pub id: Uuid,
    pub coordinate_id: Option<Uuid>,
    pub driver_id: Uuid,
    pub ride_id: Option<Uuid>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub heading_degrees: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}
