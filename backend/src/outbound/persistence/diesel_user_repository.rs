//! PostgreSQL-backed `UserRepository` implementation using Diesel.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{NewAccount, NewDriverProfile, UserPersistenceError, UserRepository};
use crate::domain::{DriverStatus, Role, User, UserStatus};

use super::error_mapping::{is_unique_violation, map_diesel_error, map_pool_error};
use super::models::{NewDriverRow, NewUserRow, UserRow};
use super::pool::{DbPool, PoolError};
use super::schema::{drivers, users};

/// Rating a freshly registered driver starts with.
const INITIAL_DRIVER_RATING: f64 = 5.0;

#[derive(Clone)]
pub struct DieselUserRepository {
    pool: DbPool,
}

impl DieselUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn pool_error(error: PoolError) -> UserPersistenceError {
    map_pool_error(error, UserPersistenceError::connection)
}

fn diesel_error(error: diesel::result::Error) -> UserPersistenceError {
    map_diesel_error(
        error,
        UserPersistenceError::query,
        UserPersistenceError::connection,
    )
}

fn row_to_user(row: UserRow) -> Result<User, UserPersistenceError> {
    let role = Role::from_str(&row.role)
        .map_err(|err| UserPersistenceError::query(err.to_string()))?;
    let status = UserStatus::from_str(&row.status)
        .map_err(|err| UserPersistenceError::query(err.to_string()))?;
    Ok(User {
        id: row.id,
        email: row.email,
        role,
        status,
        password_hash: row.password_hash,
        attrs: row.attrs,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[async_trait]
impl UserRepository for DieselUserRepository {
    async fn create_account(
        &self,
        account: NewAccount,
        driver_profile: Option<NewDriverProfile>,
    ) -> Result<User, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let now = Utc::now();
        let user_id = Uuid::new_v4();

        let result = conn
            .transaction::<UserRow, diesel::result::Error, _>(|conn| {
                let account = &account;
                let driver_profile = &driver_profile;
                async move {
                    let user_row = diesel::insert_into(users::table)
                        .values(&NewUserRow {
                            id: user_id,
                            email: &account.email,
                            role: account.role.as_str(),
                            status: UserStatus::Active.as_str(),
                            password_hash: &account.password_hash,
                            attrs: &account.attrs,
                            created_at: now,
                            updated_at: now,
                        })
                        .returning(UserRow::as_returning())
                        .get_result::<UserRow>(conn)
                        .await?;

                    if let Some(profile) = driver_profile {
                        diesel::insert_into(drivers::table)
                            .values(&NewDriverRow {
                                id: user_id,
                                license_number: &profile.license_number,
                                vehicle_type: profile.vehicle_type.as_str(),
                                vehicle_attrs: &profile.vehicle_attrs,
                                rating: INITIAL_DRIVER_RATING,
                                total_rides: 0,
                                total_earnings: 0.0,
                                status: DriverStatus::Offline.as_str(),
                                is_verified: false,
                                created_at: now,
                                updated_at: now,
                            })
                            .execute(conn)
                            .await?;
                    }

                    Ok(user_row)
                }
                .scope_boxed()
            })
            .await;

        match result {
            Ok(row) => row_to_user(row),
            Err(err) if is_unique_violation(&err) => {
                Err(UserPersistenceError::duplicate_email(account.email.clone()))
            }
            Err(err) => Err(diesel_error(err)),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let row = users::table
            .filter(users::email.eq(email))
            .select(UserRow::as_select())
            .first::<UserRow>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?;

        row.map(row_to_user).transpose()
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, UserPersistenceError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        let row = users::table
            .filter(users::id.eq(user_id))
            .select(UserRow::as_select())
            .first::<UserRow>(&mut conn)
            .await
            .optional()
            .map_err(diesel_error)?;

        row.map(row_to_user).transpose()
    }
}

#[cfg(test)]
mod tests {
    //! Row conversion and error mapping edge cases.

    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn valid_row() -> UserRow {
        let now = Utc::now();
        UserRow {
            id: Uuid::new_v4(),
            email: "d@example.com".into(),
            role: "DRIVER".into(),
            status: "ACTIVE".into(),
            password_hash: "ab:cd".into(),
            attrs: json!({ "name": "Bekzat" }),
            created_at: now,
            updated_at: now,
        }
    }

    #[rstest]
    fn valid_row_converts(valid_row: UserRow) {
        let user = row_to_user(valid_row).expect("convert");
        assert_eq!(user.role, Role::Driver);
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(user.registration_name(), Some("Bekzat"));
    }

    #[rstest]
    fn corrupt_role_surfaces_as_query_error(mut valid_row: UserRow) {
        valid_row.role = "DISPATCHER".into();
        let err = row_to_user(valid_row).expect_err("must fail");
        assert!(matches!(err, UserPersistenceError::Query { .. }));
        assert!(err.to_string().contains("DISPATCHER"));
    }

    #[rstest]
    fn pool_error_maps_to_connection_variant() {
        let err = pool_error(PoolError::checkout("connection refused"));
        assert!(matches!(err, UserPersistenceError::Connection { .. }));
    }
}
