//! Unit tests for the claim set

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::domain::entities::{Claims, SessionData, TRUSTED_SOURCE_LIFETIME_HOURS};

#[test]
fn test_issue_sets_expiry_from_lifetime() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let claims = Claims::issue(SessionData::new(), now, Duration::seconds(3600), None);

    assert_eq!(claims.iat, now.timestamp());
    assert_eq!(claims.exp, now.timestamp() + 3600);
    assert!(claims.persist_id.is_none());
    assert!(!claims.is_trusted_source());
}

#[test]
fn test_issue_trusted_source_uses_sentinel_lifetime() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let data = SessionData::new().with_field("source", "billing-service");
    let claims = Claims::issue(data, now, Duration::seconds(60), None);

    assert!(claims.is_trusted_source());
    assert_eq!(claims.exp, now.timestamp() + TRUSTED_SOURCE_LIFETIME_HOURS * 3600);
}

#[test]
fn test_expiry_instant_is_the_last_valid_millisecond() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let claims = Claims::issue(SessionData::new(), now, Duration::seconds(10), None);

    assert_eq!(claims.expires_at_millis(), (now.timestamp() + 10) * 1000);
    assert!(!claims.is_expired_at(claims.expires_at_millis()));
    assert!(claims.is_expired_at(claims.expires_at_millis() + 1));
    // Later in the expiry second is already past the expiry instant
    assert!(claims.is_expired_at(claims.expires_at_millis() + 300));
}

#[test]
fn test_wire_field_names() {
    let subject = Uuid::new_v4();
    let now = Utc::now();
    let data = SessionData::for_subject(subject).with_field("role", "admin");
    let claims = Claims::issue(data, now, Duration::seconds(60), Some("handle".to_string()));

    let payload = serde_json::to_value(&claims).unwrap();
    assert_eq!(payload["uuid"], json!(subject.to_string()));
    assert_eq!(payload["persistKey"], json!("handle"));
    assert_eq!(payload["role"], json!("admin"));
    assert_eq!(payload["iat"], json!(now.timestamp()));
    assert!(payload.get("extra").is_none());
}

#[test]
fn test_stateless_payload_omits_optional_claims() {
    let claims = Claims::issue(SessionData::new(), Utc::now(), Duration::seconds(60), None);
    let payload = serde_json::to_value(&claims).unwrap();

    assert!(payload.get("uuid").is_none());
    assert!(payload.get("persistKey").is_none());
}

#[test]
fn test_into_session_data_strips_protocol_fields() {
    let subject = Uuid::new_v4();
    let data = SessionData::for_subject(subject).with_field("plan", json!({"tier": "pro"}));
    let claims = Claims::issue(data.clone(), Utc::now(), Duration::seconds(60), Some("p".to_string()));

    let round_trip: Claims = serde_json::from_value(serde_json::to_value(&claims).unwrap()).unwrap();
    assert_eq!(round_trip, claims);
    assert_eq!(round_trip.into_session_data(), data);
}

#[test]
fn test_malformed_subject_fails_to_decode() {
    let payload = json!({ "uuid": "not-a-uuid", "iat": 1, "exp": 2 });
    assert!(serde_json::from_value::<Claims>(payload).is_err());
}
