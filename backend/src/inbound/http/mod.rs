//! HTTP adapter: actix handlers, bearer auth and error mapping.

pub mod admin;
pub mod auth;
pub mod drivers;
pub mod error;
pub mod rides;
pub mod state;
pub mod users;
pub mod validation;

pub use auth::AuthedUser;
pub use error::ApiResult;
pub use state::HttpState;

#[cfg(test)]
mod tests {
    //! Route-level auth behaviour over stubbed ports.

    use std::sync::Arc;

    use actix_web::{http::StatusCode, test, web, App};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rstest::rstest;
    use serde_json::json;
    use uuid::Uuid;

    use crate::domain::auth::{AuthService, JwtManager};
    use crate::domain::coordinate::LocationSample;
    use crate::domain::messages::*;
    use crate::domain::ports::*;
    use crate::domain::{DriverCoordinator, DriverStatus, RideCoordinator, RideStatus};

    use super::*;

    const TEST_SECRET: &[u8] = b"http-auth-test-secret";

    struct NoRides;

    #[async_trait]
    impl RideRepository for NoRides {
        async fn create_ride(
            &self,
            draft: RideDraft,
        ) -> Result<CreatedRide, RidePersistenceError> {
            Ok(CreatedRide {
                ride_id: Uuid::new_v4(),
                ride_number: draft.ride_number,
                status: RideStatus::Requested,
                requested_at: Utc::now(),
            })
        }

        async fn transition(
            &self,
            _ride_id: Uuid,
            _expected: RideStatus,
            _change: RideTransition,
        ) -> Result<TransitionOutcome, RidePersistenceError> {
            Ok(TransitionOutcome::Conflict)
        }

        async fn cancel(
            &self,
            ride_id: Uuid,
            _reason: &str,
        ) -> Result<CancelledRide, RidePersistenceError> {
            Ok(CancelledRide {
                ride_id,
                cancelled_at: Utc::now(),
            })
        }

        async fn ride_status(&self, ride_id: Uuid) -> Result<RideStatus, RidePersistenceError> {
            Err(RidePersistenceError::not_found(ride_id))
        }

        async fn passenger_for_ride(
            &self,
            ride_id: Uuid,
        ) -> Result<Uuid, RidePersistenceError> {
            Err(RidePersistenceError::not_found(ride_id))
        }

        async fn record_location_event(
            &self,
            _ride_id: Uuid,
            _sample: LocationSample,
        ) -> Result<(), RidePersistenceError> {
            Ok(())
        }
    }

    struct OfflineDrivers;

    #[async_trait]
    impl DriverRepository for OfflineDrivers {
        async fn status(&self, _driver_id: Uuid) -> Result<DriverStatus, DriverPersistenceError> {
            Ok(DriverStatus::Offline)
        }

        async fn go_online(
            &self,
            _driver_id: Uuid,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<OnlineSession, DriverPersistenceError> {
            Ok(OnlineSession {
                session_id: Uuid::new_v4(),
                status: DriverStatus::Available,
            })
        }

        async fn go_offline(
            &self,
            driver_id: Uuid,
        ) -> Result<SessionSummary, DriverPersistenceError> {
            let _ = driver_id;
            Err(DriverPersistenceError::conflict("driver has no open session"))
        }

        async fn save_location(
            &self,
            _sample: &LocationSample,
        ) -> Result<SavedLocation, DriverPersistenceError> {
            Ok(SavedLocation {
                coordinate_id: Uuid::new_v4(),
                recorded_at: Utc::now(),
            })
        }

        async fn start_ride(
            &self,
            _driver_id: Uuid,
            _ride_id: Uuid,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<DateTime<Utc>, DriverPersistenceError> {
            Ok(Utc::now())
        }

        async fn complete_ride(
            &self,
            _completion: RideCompletionRecord,
        ) -> Result<DateTime<Utc>, DriverPersistenceError> {
            Ok(Utc::now())
        }

        async fn ride_status(
            &self,
            _driver_id: Uuid,
            _ride_id: Uuid,
        ) -> Result<RideStatus, DriverPersistenceError> {
            Ok(RideStatus::Matched)
        }

        async fn profile(
            &self,
            driver_id: Uuid,
        ) -> Result<DriverProfile, DriverPersistenceError> {
            Err(DriverPersistenceError::not_found(driver_id))
        }

        async fn driver_for_ride(&self, _ride_id: Uuid) -> Result<Uuid, DriverPersistenceError> {
            Ok(Uuid::new_v4())
        }

        async fn pickup_location(
            &self,
            _ride_id: Uuid,
        ) -> Result<(f64, f64), DriverPersistenceError> {
            Ok((0.0, 0.0))
        }
    }

    struct NullPublisher;

    #[async_trait]
    impl EventPublisher for NullPublisher {
        async fn publish_ride_requested(
            &self,
            _msg: &RideRequestedMessage,
        ) -> Result<(), BusError> {
            Ok(())
        }

        async fn publish_passenger_info(
            &self,
            _msg: &PassengerInfoMessage,
        ) -> Result<(), BusError> {
            Ok(())
        }

        async fn publish_driver_response(
            &self,
            _msg: &DriverResponseMessage,
        ) -> Result<(), BusError> {
            Ok(())
        }

        async fn publish_ride_status(
            &self,
            _msg: &RideStatusUpdateMessage,
        ) -> Result<(), BusError> {
            Ok(())
        }

        async fn publish_location_update(
            &self,
            _msg: &LocationUpdateMessage,
        ) -> Result<(), BusError> {
            Ok(())
        }
    }

    struct NoSessions;

    impl ClientPush for NoSessions {
        fn send_to_client(&self, _client_id: &str, _payload: &str) -> bool {
            false
        }

        fn broadcast_ride_offer(&self, _payload: &str) -> usize {
            0
        }
    }

    struct EmptyUsers;

    #[async_trait]
    impl UserRepository for EmptyUsers {
        async fn create_account(
            &self,
            account: NewAccount,
            _driver_profile: Option<NewDriverProfile>,
        ) -> Result<crate::domain::User, UserPersistenceError> {
            Err(UserPersistenceError::duplicate_email(account.email))
        }

        async fn find_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<crate::domain::User>, UserPersistenceError> {
            Ok(None)
        }

        async fn find_by_id(
            &self,
            _user_id: Uuid,
        ) -> Result<Option<crate::domain::User>, UserPersistenceError> {
            Ok(None)
        }
    }

    struct EmptyAdmin;

    #[async_trait]
    impl AdminQuery for EmptyAdmin {
        async fn system_overview(&self) -> Result<SystemOverview, AdminQueryError> {
            Ok(SystemOverview::default())
        }

        async fn active_rides(
            &self,
            page: i64,
            page_size: i64,
        ) -> Result<ActiveRidesPage, AdminQueryError> {
            Ok(ActiveRidesPage {
                rides: Vec::new(),
                page,
                page_size,
                total: 0,
            })
        }

        async fn online_drivers(&self) -> Result<Vec<OnlineDriver>, AdminQueryError> {
            Ok(Vec::new())
        }

        async fn system_metrics(&self) -> Result<SystemMetrics, AdminQueryError> {
            Ok(SystemMetrics::default())
        }
    }

    fn jwt() -> JwtManager {
        JwtManager::new(TEST_SECRET, 3600, 86400)
    }

    fn test_state() -> HttpState {
        let publisher = Arc::new(NullPublisher) as Arc<dyn EventPublisher>;
        let sessions = Arc::new(NoSessions) as Arc<dyn ClientPush>;
        HttpState::new(
            Arc::new(RideCoordinator::new(
                Arc::new(NoRides),
                publisher.clone(),
                sessions.clone(),
            )),
            Arc::new(DriverCoordinator::new(
                Arc::new(OfflineDrivers),
                publisher,
                sessions,
            )),
            Arc::new(AuthService::new(Arc::new(EmptyUsers), jwt())),
            Arc::new(EmptyAdmin),
            jwt(),
        )
    }

    fn bearer(user_id: &Uuid, role: &str) -> String {
        let token = jwt()
            .issue_access_token(&user_id.to_string(), role)
            .expect("token");
        format!("Bearer {token}")
    }

    macro_rules! test_app {
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(test_state()))
                    .service(rides::create_ride)
                    .service(drivers::go_online)
                    .service(admin::overview),
            )
            .await
        };
    }

    #[rstest]
    #[actix_rt::test]
    async fn requests_without_a_token_are_unauthorized() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/rides")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[rstest]
    #[actix_rt::test]
    async fn drivers_cannot_book_rides() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/rides")
            .insert_header(("Authorization", bearer(&Uuid::new_v4(), "DRIVER")))
            .set_json(json!({
                "passenger_id": Uuid::new_v4().to_string(),
                "pickup_latitude": 43.2389,
                "pickup_longitude": 76.8897,
                "pickup_address": "A st",
                "destination_latitude": 43.2560,
                "destination_longitude": 76.9286,
                "destination_address": "B st",
                "ride_type": "ECONOMY"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[rstest]
    #[actix_rt::test]
    async fn passengers_can_book_rides() {
        let app = test_app!();
        let passenger_id = Uuid::new_v4();
        let req = test::TestRequest::post()
            .uri("/rides")
            .insert_header(("Authorization", bearer(&passenger_id, "PASSENGER")))
            .set_json(json!({
                "passenger_id": passenger_id.to_string(),
                "pickup_latitude": 43.2389,
                "pickup_longitude": 76.8897,
                "pickup_address": "A st",
                "destination_latitude": 43.2560,
                "destination_longitude": 76.9286,
                "destination_address": "B st",
                "ride_type": "ECONOMY"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "REQUESTED");
        assert_eq!(body["estimated_duration_minutes"], 8);
    }

    #[rstest]
    #[actix_rt::test]
    async fn mismatched_subject_is_forbidden_on_driver_routes() {
        let app = test_app!();
        let token_owner = Uuid::new_v4();
        let path_driver = Uuid::new_v4();
        let req = test::TestRequest::post()
            .uri(&format!("/drivers/{path_driver}/online"))
            .insert_header(("Authorization", bearer(&token_owner, "DRIVER")))
            .set_json(json!({ "latitude": 43.25, "longitude": 76.92 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[rstest]
    #[actix_rt::test]
    async fn matching_subject_may_go_online() {
        let app = test_app!();
        let driver_id = Uuid::new_v4();
        let req = test::TestRequest::post()
            .uri(&format!("/drivers/{driver_id}/online"))
            .insert_header(("Authorization", bearer(&driver_id, "DRIVER")))
            .set_json(json!({ "latitude": 43.25, "longitude": 76.92 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "AVAILABLE");
    }

    #[rstest]
    #[actix_rt::test]
    async fn admin_routes_reject_passengers() {
        let app = test_app!();
        let req = test::TestRequest::get()
            .uri("/admin/overview")
            .insert_header(("Authorization", bearer(&Uuid::new_v4(), "PASSENGER")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
