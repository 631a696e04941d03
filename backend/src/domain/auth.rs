//! Token issuance, password hashing and the registration/login service.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::ports::{NewAccount, NewDriverProfile, UserPersistenceError, UserRepository};
use super::user::{Role, User, UserStatus};
use super::{driver::VehicleType, Error};

/// Access token lifetime in seconds (15 minutes).
pub const ACCESS_TTL_SECS: i64 = 15 * 60;
/// Refresh token lifetime in seconds (7 days).
pub const REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// JWT claims carried by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_access(&self) -> bool {
        self.token_type == "access"
    }

    pub fn is_refresh(&self) -> bool {
        self.token_type == "refresh"
    }

    /// Subject parsed as a user id.
    pub fn user_id(&self) -> Result<Uuid, Error> {
        Uuid::parse_str(&self.sub).map_err(|_| Error::unauthorized("invalid token subject"))
    }

    /// Role claim parsed into the domain enum.
    pub fn parsed_role(&self) -> Result<Role, Error> {
        Role::from_str(&self.role).map_err(|_| Error::unauthorized("invalid token role"))
    }
}

/// Manages JWT creation and validation. HMAC-SHA256 throughout.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &[u8], access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Construct with the standard access/refresh lifetimes.
    pub fn with_default_ttls(secret: &[u8]) -> Self {
        Self::new(secret, ACCESS_TTL_SECS, REFRESH_TTL_SECS)
    }

    fn issue(&self, user_id: &str, role: &str, token_type: &str, ttl_secs: i64) -> Result<String, Error> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            token_type: token_type.to_string(),
            iat: now,
            exp: now + ttl_secs,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| Error::internal(format!("failed to sign token: {err}")))
    }

    pub fn issue_access_token(&self, user_id: &str, role: &str) -> Result<String, Error> {
        self.issue(user_id, role, "access", self.access_ttl_secs)
    }

    pub fn issue_refresh_token(&self, user_id: &str, role: &str) -> Result<String, Error> {
        self.issue(user_id, role, "refresh", self.refresh_ttl_secs)
    }

    /// Issue a fresh access/refresh pair.
    pub fn issue_pair(&self, user_id: &str, role: &str) -> Result<TokenPair, Error> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id, role)?,
            refresh_token: self.issue_refresh_token(user_id, role)?,
        })
    }

    /// Validate signature and expiry, returning the claims.
    pub fn validate(&self, token: &str) -> Result<Claims, Error> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| Error::unauthorized("invalid or expired token"))
    }
}

/// Access/refresh token pair returned by login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Hash a password with a random 16-byte salt, `"<salt>:<digest>"` hex.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = salted_digest(&salt, password);
    format!("{}:{}", hex::encode(salt), hex::encode(digest))
}

/// Constant-time verification against a stored `"<salt>:<digest>"` value.
pub fn verify_password(stored: &str, password: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once(':') else {
        return false;
    };
    let (Ok(salt), Ok(stored_digest)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };
    let digest = salted_digest(&salt, password);
    digest.ct_eq(stored_digest.as_slice()).into()
}

fn salted_digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

/// A validated registration request.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub license_number: Option<String>,
    pub vehicle_type: Option<VehicleType>,
    pub vehicle_attrs: Option<serde_json::Value>,
}

/// Registration, login and token refresh over the user store.
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    jwt: JwtManager,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, jwt: JwtManager) -> Self {
        Self { users, jwt }
    }

    /// Create an account; DRIVER registrations also create the driver
    /// profile in the same transaction.
    pub async fn register(&self, registration: Registration) -> Result<User, Error> {
        if registration.email.trim().is_empty() || !registration.email.contains('@') {
            return Err(Error::invalid_request("a valid email is required"));
        }
        if registration.password.len() < 8 {
            return Err(Error::invalid_request(
                "password must be at least 8 characters",
            ));
        }
        if registration.name.trim().is_empty() {
            return Err(Error::invalid_request("name is required"));
        }

        let driver_profile = match registration.role {
            Role::Driver => {
                let license_number = registration
                    .license_number
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| {
                        Error::invalid_request("license_number is required for drivers")
                    })?;
                let vehicle_type = registration.vehicle_type.ok_or_else(|| {
                    Error::invalid_request("vehicle_type is required for drivers")
                })?;
                Some(NewDriverProfile {
                    license_number: license_number.to_string(),
                    vehicle_type,
                    vehicle_attrs: registration
                        .vehicle_attrs
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({})),
                })
            }
            _ => None,
        };

        let mut attrs = serde_json::json!({ "name": registration.name });
        if let Some(phone) = &registration.phone {
            attrs["phone"] = serde_json::Value::String(phone.clone());
        }

        let account = NewAccount {
            email: registration.email.trim().to_lowercase(),
            password_hash: hash_password(&registration.password),
            role: registration.role,
            attrs,
        };

        self.users
            .create_account(account, driver_profile)
            .await
            .map_err(map_user_error)
    }

    /// Verify credentials and issue a token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), Error> {
        let user = self
            .users
            .find_by_email(&email.trim().to_lowercase())
            .await
            .map_err(map_user_error)?
            .ok_or_else(|| Error::unauthorized("invalid credentials"))?;

        if !verify_password(&user.password_hash, password) {
            return Err(Error::unauthorized("invalid credentials"));
        }
        if user.status != UserStatus::Active {
            return Err(Error::forbidden("account is not active"));
        }

        let pair = self
            .jwt
            .issue_pair(&user.id.to_string(), user.role.as_str())?;
        Ok((user, pair))
    }

    /// Exchange a refresh token for a rotated access/refresh pair.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let claims = self.jwt.validate(refresh_token)?;
        if !claims.is_refresh() {
            return Err(Error::unauthorized("provided token is not a refresh token"));
        }
        self.jwt.issue_pair(&claims.sub, &claims.role)
    }
}

fn map_user_error(err: UserPersistenceError) -> Error {
    match err {
        UserPersistenceError::DuplicateEmail { email } => {
            Error::conflict(format!("email already registered: {email}"))
        }
        other => Error::internal(other.to_string()),
    }
}
