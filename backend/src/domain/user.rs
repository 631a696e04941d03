//! User account entity and its enumerations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role carried by a user account. Immutable after registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Passenger,
    Driver,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passenger => "PASSENGER",
            Self::Driver => "DRIVER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PASSENGER" => Ok(Self::Passenger),
            "DRIVER" => Ok(Self::Driver),
            "ADMIN" => Ok(Self::Admin),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

/// Account standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
    Banned,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Banned => "BANNED",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            "BANNED" => Ok(Self::Banned),
            other => Err(UnknownVariant::new("user status", other)),
        }
    }
}

/// A registered account. `attrs` holds free-form registration metadata
/// (display name, phone) and is only parsed at the API boundary.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    pub password_hash: String,
    pub attrs: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Display name recorded at registration, if any.
    pub fn registration_name(&self) -> Option<&str> {
        self.attrs.get("name").and_then(serde_json::Value::as_str)
    }

    /// Phone number recorded at registration, if any.
    pub fn registration_phone(&self) -> Option<&str> {
        self.attrs.get("phone").and_then(serde_json::Value::as_str)
    }
}

/// Error raised when decoding an enum column or wire field fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {field}: {value}")]
pub struct UnknownVariant {
    field: &'static str,
    value: String,
}

impl UnknownVariant {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("PASSENGER", Role::Passenger)]
    #[case("DRIVER", Role::Driver)]
    #[case("ADMIN", Role::Admin)]
    fn role_round_trips(#[case] raw: &str, #[case] expected: Role) {
        assert_eq!(raw.parse::<Role>().expect("parse"), expected);
        assert_eq!(expected.to_string(), raw);
    }

    #[rstest]
    fn unknown_role_is_rejected() {
        let err = "DISPATCHER".parse::<Role>().expect_err("must fail");
        assert_eq!(err.to_string(), "unknown role: DISPATCHER");
    }

    #[rstest]
    fn registration_name_reads_attrs() {
        let user = User {
            id: Uuid::new_v4(),
            email: "p@example.com".into(),
            role: Role::Passenger,
            status: UserStatus::Active,
            password_hash: String::new(),
            attrs: json!({ "name": "Aliya", "phone": "+7 700 000 0000" }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(user.registration_name(), Some("Aliya"));
        assert_eq!(user.registration_phone(), Some("+7 700 000 0000"));
    }
}
