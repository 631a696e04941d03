//! Bearer-token extraction for HTTP handlers.
//!
//! Handlers receive an [`AuthedUser`] argument; extraction fails the request
//! with 401 before the handler body runs. Role and subject checks stay
//! explicit in each handler, where the route semantics are visible.

use std::future::{ready, Ready};

use actix_web::http::header;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use uuid::Uuid;

use crate::domain::auth::Claims;
use crate::domain::{Error, Role};

use super::state::HttpState;

/// Claims of a validated access token.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    claims: Claims,
}

impl AuthedUser {
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// The authenticated user id.
    pub fn user_id(&self) -> Result<Uuid, Error> {
        self.claims.user_id()
    }

    /// 401 unless the token carries the given role.
    pub fn require_role(&self, role: Role) -> Result<(), Error> {
        if self.claims.parsed_role()? == role {
            Ok(())
        } else {
            Err(Error::unauthorized(format!(
                "endpoint requires role {role}"
            )))
        }
    }

    /// 403 unless the token subject matches the path identifier.
    pub fn require_subject(&self, id: Uuid) -> Result<(), Error> {
        if self.user_id()? == id {
            Ok(())
        } else {
            Err(Error::forbidden("token subject does not match path id"))
        }
    }
}

fn extract(req: &HttpRequest) -> Result<AuthedUser, Error> {
    let state = req
        .app_data::<web::Data<HttpState>>()
        .ok_or_else(|| Error::internal("authentication state is not configured"))?;

    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| Error::unauthorized("missing Authorization header"))?
        .to_str()
        .map_err(|_| Error::unauthorized("invalid Authorization header"))?;

    let mut parts = header_value.split_whitespace();
    let token = match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => token,
        _ => return Err(Error::unauthorized("invalid Authorization header format")),
    };

    let claims = state.jwt.validate(token)?;
    if !claims.is_access() {
        return Err(Error::unauthorized("token is not an access token"));
    }

    Ok(AuthedUser { claims })
}

impl FromRequest for AuthedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn claims(role: &str, sub: &str) -> AuthedUser {
        AuthedUser {
            claims: Claims {
                sub: sub.to_string(),
                role: role.to_string(),
                token_type: "access".to_string(),
                iat: 0,
                exp: i64::MAX,
            },
        }
    }

    #[rstest]
    fn role_check_accepts_matching_roles() {
        let user = claims("DRIVER", &Uuid::new_v4().to_string());
        assert!(user.require_role(Role::Driver).is_ok());
        assert!(user.require_role(Role::Passenger).is_err());
    }

    #[rstest]
    fn subject_check_rejects_other_ids() {
        let id = Uuid::new_v4();
        let user = claims("DRIVER", &id.to_string());
        assert!(user.require_subject(id).is_ok());

        let err = user.require_subject(Uuid::new_v4()).expect_err("must fail");
        assert_eq!(err.code(), crate::domain::ErrorCode::Forbidden);
    }
}
