//! Driver profile, availability states and per-shift sessions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UnknownVariant;

/// Availability of a driver. Persisted transitions are always guarded by a
/// compare-and-swap in the store; multiple service replicas may share the
/// database, so in-process locking is never enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Offline,
    Available,
    Busy,
    EnRoute,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Available => "AVAILABLE",
            Self::Busy => "BUSY",
            Self::EnRoute => "EN_ROUTE",
        }
    }

    /// A driver on an active job cannot leave the platform.
    pub fn may_go_offline(&self) -> bool {
        !matches!(self, Self::EnRoute | Self::Busy)
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "OFFLINE" => Ok(Self::Offline),
            "AVAILABLE" => Ok(Self::Available),
            "BUSY" => Ok(Self::Busy),
            "EN_ROUTE" => Ok(Self::EnRoute),
            other => Err(UnknownVariant::new("driver status", other)),
        }
    }
}

/// Vehicle class offered to passengers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Economy,
    Premium,
    Xl,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Economy => "ECONOMY",
            Self::Premium => "PREMIUM",
            Self::Xl => "XL",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ECONOMY" => Ok(Self::Economy),
            "PREMIUM" => Ok(Self::Premium),
            "XL" => Ok(Self::Xl),
            other => Err(UnknownVariant::new("vehicle type", other)),
        }
    }
}

/// One-to-one extension of a [`super::user::User`] with role DRIVER.
/// `vehicle_attrs` stays raw JSON at the store boundary and is decoded into
/// [`VehicleDescription`] where the wire needs named fields.
#[derive(Debug, Clone)]
pub struct Driver {
    pub id: Uuid,
    pub license_number: String,
    pub vehicle_type: VehicleType,
    pub vehicle_attrs: serde_json::Value,
    pub rating: f64,
    pub total_rides: i32,
    pub total_earnings: f64,
    pub status: DriverStatus,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Named view over `vehicle_attrs`, used when enriching driver responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleDescription {
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub plate: String,
}

impl Driver {
    pub fn vehicle_description(&self) -> VehicleDescription {
        serde_json::from_value(self.vehicle_attrs.clone()).unwrap_or_default()
    }
}

/// One online period of a driver. At most one session per driver may be open
/// (`ended_at` null) at any time.
#[derive(Debug, Clone)]
pub struct DriverSession {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub rides_completed: i32,
    pub earnings: f64,
}
