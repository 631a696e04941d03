//! The ride aggregate, its lifecycle state machine and the audit event log.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::driver::VehicleType;
use super::user::UnknownVariant;

/// Lifecycle state of a ride.
///
/// Transitions form a line with an early exit to CANCELLED:
/// REQUESTED → MATCHED → EN_ROUTE → ARRIVED → IN_PROGRESS → COMPLETED,
/// where every non-terminal state before IN_PROGRESS may also cancel.
/// COMPLETED and CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Requested,
    Matched,
    EnRoute,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Matched => "MATCHED",
            Self::EnRoute => "EN_ROUTE",
            Self::Arrived => "ARRIVED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether the ride admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The lifecycle graph. Guarded store updates re-check this under a
    /// compare-and-swap; this table is the single in-process source of truth.
    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        use RideStatus::*;
        matches!(
            (self, next),
            (Requested, Matched)
                | (Requested, Cancelled)
                | (Matched, EnRoute)
                | (Matched, Cancelled)
                | (EnRoute, Arrived)
                | (EnRoute, Cancelled)
                | (Arrived, InProgress)
                | (Arrived, Cancelled)
                | (InProgress, Completed)
        )
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "REQUESTED" => Ok(Self::Requested),
            "MATCHED" => Ok(Self::Matched),
            "EN_ROUTE" => Ok(Self::EnRoute),
            "ARRIVED" => Ok(Self::Arrived),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(UnknownVariant::new("ride status", other)),
        }
    }
}

/// Audit event kinds appended to `ride_events`. Every persisted ride state
/// change must write a matching event in the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideEventType {
    RideRequested,
    DriverMatched,
    DriverArrived,
    RideStarted,
    RideCompleted,
    RideCancelled,
    StatusChanged,
    LocationUpdated,
    FareAdjusted,
}

impl RideEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RideRequested => "RIDE_REQUESTED",
            Self::DriverMatched => "DRIVER_MATCHED",
            Self::DriverArrived => "DRIVER_ARRIVED",
            Self::RideStarted => "RIDE_STARTED",
            Self::RideCompleted => "RIDE_COMPLETED",
            Self::RideCancelled => "RIDE_CANCELLED",
            Self::StatusChanged => "STATUS_CHANGED",
            Self::LocationUpdated => "LOCATION_UPDATED",
            Self::FareAdjusted => "FARE_ADJUSTED",
        }
    }
}

impl fmt::Display for RideEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideEventType {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "RIDE_REQUESTED" => Ok(Self::RideRequested),
            "DRIVER_MATCHED" => Ok(Self::DriverMatched),
            "DRIVER_ARRIVED" => Ok(Self::DriverArrived),
            "RIDE_STARTED" => Ok(Self::RideStarted),
            "RIDE_COMPLETED" => Ok(Self::RideCompleted),
            "RIDE_CANCELLED" => Ok(Self::RideCancelled),
            "STATUS_CHANGED" => Ok(Self::StatusChanged),
            "LOCATION_UPDATED" => Ok(Self::LocationUpdated),
            "FARE_ADJUSTED" => Ok(Self::FareAdjusted),
            other => Err(UnknownVariant::new("ride event type", other)),
        }
    }
}

/// The central aggregate: one transport job from pickup to destination.
#[derive(Debug, Clone)]
pub struct Ride {
    pub id: Uuid,
    pub ride_number: String,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub vehicle_type: VehicleType,
    pub status: RideStatus,
    pub priority: i32,
    pub requested_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub estimated_fare: Option<f64>,
    pub final_fare: Option<f64>,
    pub pickup_coordinate_id: Option<Uuid>,
    pub destination_coordinate_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only audit record. `event_data` is free-form JSON.
#[derive(Debug, Clone)]
pub struct RideEvent {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub event_type: RideEventType,
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Build the human-readable ride number for a request timestamp.
pub fn ride_number_for(requested_at: DateTime<Utc>) -> String {
    format!("RIDE_{}", requested_at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(RideStatus::Requested, RideStatus::Matched, true)]
    #[case(RideStatus::Requested, RideStatus::Cancelled, true)]
    #[case(RideStatus::Matched, RideStatus::EnRoute, true)]
    #[case(RideStatus::Matched, RideStatus::Cancelled, true)]
    #[case(RideStatus::EnRoute, RideStatus::Arrived, true)]
    #[case(RideStatus::Arrived, RideStatus::InProgress, true)]
    #[case(RideStatus::InProgress, RideStatus::Completed, true)]
    #[case(RideStatus::Requested, RideStatus::Completed, false)]
    #[case(RideStatus::Requested, RideStatus::InProgress, false)]
    #[case(RideStatus::InProgress, RideStatus::Cancelled, false)]
    #[case(RideStatus::Completed, RideStatus::Cancelled, false)]
    #[case(RideStatus::Cancelled, RideStatus::Matched, false)]
    fn lifecycle_graph_is_enforced(
        #[case] from: RideStatus,
        #[case] to: RideStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[rstest]
    fn terminal_states_admit_nothing() {
        for terminal in [RideStatus::Completed, RideStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                RideStatus::Requested,
                RideStatus::Matched,
                RideStatus::EnRoute,
                RideStatus::Arrived,
                RideStatus::InProgress,
                RideStatus::Completed,
                RideStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[rstest]
    fn ride_number_is_date_stamped() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).single().expect("valid");
        assert_eq!(ride_number_for(at), "RIDE_20250314_092653");
    }
}
