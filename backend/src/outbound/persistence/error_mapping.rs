//! Shared translation of pool and Diesel failures into port error variants.

use diesel::result::{DatabaseErrorKind, Error as DieselError};

use super::pool::PoolError;

/// Map a pool failure through the port's connection-error constructor.
pub fn map_pool_error<E>(error: PoolError, connection: impl FnOnce(String) -> E) -> E {
    connection(error.to_string())
}

/// Map a Diesel failure through the port's query/connection constructors.
pub fn map_diesel_error<E>(
    error: DieselError,
    query: impl FnOnce(String) -> E,
    connection: impl FnOnce(String) -> E,
) -> E {
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
            connection(info.message().to_string())
        }
        DieselError::DatabaseError(_, info) => query(info.message().to_string()),
        DieselError::NotFound => query("record not found".to_string()),
        other => query(other.to_string()),
    }
}

/// Whether the failure is a unique-constraint violation (duplicate key).
pub fn is_unique_violation(error: &DieselError) -> bool {
    matches!(
        error,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}
