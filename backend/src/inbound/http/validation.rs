//! Field-level parsing helpers shared by HTTP handlers.

use serde_json::json;
use uuid::Uuid;

use crate::domain::Error;

/// Parse a UUID field, rejecting with a structured 400 on failure.
pub fn parse_uuid(value: &str, field: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(value).map_err(|_| {
        Error::invalid_request(format!("{field} must be a UUID")).with_details(json!({
            "field": field,
            "value": value,
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn accepts_canonical_uuids() {
        let id = parse_uuid("11111111-1111-4111-8111-111111111111", "passenger_id")
            .expect("parse");
        assert_eq!(id.to_string(), "11111111-1111-4111-8111-111111111111");
    }

    #[rstest]
    fn rejects_garbage_with_the_field_name() {
        let err = parse_uuid("not-a-uuid", "ride_id").expect_err("must fail");
        assert!(err.message().contains("ride_id"));
        assert_eq!(
            err.details().and_then(|d| d["field"].as_str()),
            Some("ride_id")
        );
    }
}
