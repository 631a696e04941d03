//! Straight-line route estimation and tariff arithmetic.
//!
//! Routing here is deliberately crude: a haversine great-circle distance and
//! a fixed urban average speed. Anything GIS-accurate belongs to a routing
//! service, not this backend.

use super::driver::VehicleType;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Average speed assumed for the pickup→destination estimate.
const TRIP_SPEED_KMH: f64 = 30.0;

/// Average speed assumed when estimating a driver's arrival at the pickup.
const APPROACH_SPEED_KMH: f64 = 40.0;

/// Base fare component of a driver's completion earning.
const EARNING_BASE: f64 = 400.0;
const EARNING_PER_KM: f64 = 120.0;
const EARNING_PER_MIN: f64 = 20.0;

/// Two endpoints closer than this per axis count as the same location.
pub const COORDINATE_EPSILON: f64 = 1e-6;

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance and duration estimate for a trip. Duration is rounded up and
/// never below one minute.
pub fn estimate_route(
    pickup_lat: f64,
    pickup_lng: f64,
    dest_lat: f64,
    dest_lng: f64,
) -> (f64, i32) {
    let distance_km = haversine_km(pickup_lat, pickup_lng, dest_lat, dest_lng);
    let minutes = (distance_km / TRIP_SPEED_KMH * 60.0).ceil() as i32;
    (distance_km, minutes.max(1))
}

/// Tariff table: base fare, per-kilometre rate, per-minute rate.
fn tariff(vehicle_type: VehicleType) -> (f64, f64, f64) {
    match vehicle_type {
        VehicleType::Economy => (500.0, 100.0, 50.0),
        VehicleType::Premium => (800.0, 120.0, 60.0),
        VehicleType::Xl => (1000.0, 150.0, 75.0),
    }
}

/// Estimated passenger fare for a trip.
pub fn estimate_fare(vehicle_type: VehicleType, distance_km: f64, duration_min: i32) -> f64 {
    let (base, per_km, per_min) = tariff(vehicle_type);
    base + distance_km * per_km + f64::from(duration_min) * per_min
}

/// Driver earning for a completed ride, from actuals reported at completion.
pub fn completion_earning(actual_distance_km: f64, actual_duration_min: f64) -> f64 {
    EARNING_BASE + actual_distance_km * EARNING_PER_KM + actual_duration_min * EARNING_PER_MIN
}

/// Minutes for a driver to reach the pickup, at the fixed approach speed.
/// Truncated like a countdown, not rounded.
pub fn approach_minutes(driver_lat: f64, driver_lng: f64, pickup_lat: f64, pickup_lng: f64) -> i64 {
    let distance_km = haversine_km(driver_lat, driver_lng, pickup_lat, pickup_lng);
    (distance_km / APPROACH_SPEED_KMH * 60.0) as i64
}

/// Whether two endpoints are distinguishable enough to describe a trip.
pub fn endpoints_distinct(
    pickup_lat: f64,
    pickup_lng: f64,
    dest_lat: f64,
    dest_lng: f64,
) -> bool {
    (pickup_lat - dest_lat).abs() >= COORDINATE_EPSILON
        || (pickup_lng - dest_lng).abs() >= COORDINATE_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // Almaty city centre to Mega Park, the canonical smoke-test trip.
    const PICKUP: (f64, f64) = (43.2389, 76.8897);
    const DEST: (f64, f64) = (43.2560, 76.9286);

    #[rstest]
    fn city_trip_distance_duration_and_fare() {
        let (distance_km, duration_min) = estimate_route(PICKUP.0, PICKUP.1, DEST.0, DEST.1);
        assert!(
            (distance_km - 3.68).abs() < 0.01,
            "unexpected distance {distance_km}"
        );
        assert_eq!(duration_min, 8);

        let fare = estimate_fare(VehicleType::Economy, distance_km, duration_min);
        assert!((fare - (500.0 + 100.0 * distance_km + 50.0 * 8.0)).abs() < 1e-9);
    }

    #[rstest]
    fn zero_distance_is_zero_km() {
        assert_eq!(haversine_km(43.0, 76.0, 43.0, 76.0), 0.0);
    }

    #[rstest]
    fn tiny_route_rounds_up_to_one_minute() {
        // ~0.0001 km apart.
        let (distance_km, duration_min) = estimate_route(43.0, 76.0, 43.0000009, 76.0);
        assert!(distance_km < 0.001);
        assert_eq!(duration_min, 1);
    }

    #[rstest]
    #[case(VehicleType::Economy, 500.0, 100.0, 50.0)]
    #[case(VehicleType::Premium, 800.0, 120.0, 60.0)]
    #[case(VehicleType::Xl, 1000.0, 150.0, 75.0)]
    fn fare_follows_the_tariff_table(
        #[case] vehicle_type: VehicleType,
        #[case] base: f64,
        #[case] per_km: f64,
        #[case] per_min: f64,
    ) {
        let fare = estimate_fare(vehicle_type, 10.0, 20);
        assert!((fare - (base + 10.0 * per_km + 20.0 * per_min)).abs() < 1e-9);
    }

    #[rstest]
    fn completion_earning_uses_driver_rates() {
        let earning = completion_earning(5.0, 12.0);
        assert!((earning - (400.0 + 5.0 * 120.0 + 12.0 * 20.0)).abs() < 1e-9);
    }

    #[rstest]
    fn identical_endpoints_are_not_distinct() {
        assert!(!endpoints_distinct(43.0, 76.0, 43.0 + 5e-7, 76.0 - 5e-7));
        assert!(endpoints_distinct(43.0, 76.0, 43.0, 76.00001));
    }

    #[rstest]
    fn approach_minutes_truncates_instead_of_rounding() {
        assert_eq!(approach_minutes(43.0, 76.0, 43.0, 76.0), 0);

        // The canonical trip is ~3.68 km: 5.52 min at 40 km/h, truncated.
        let minutes = approach_minutes(PICKUP.0, PICKUP.1, DEST.0, DEST.1);
        assert_eq!(minutes, 5);
    }
}
