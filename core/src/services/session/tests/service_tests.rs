//! Unit tests for the session lifecycle orchestrator

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use gk_shared::config::{SessionConfig, SigningAlgorithm};

use super::mocks::UnreachableStorage;
use crate::domain::entities::{Claims, SessionData, Token, TRUSTED_SOURCE_LIFETIME_HOURS};
use crate::errors::{SessionError, StorageError, TokenError};
use crate::repositories::storage::{MemoryStorage, Storage};
use crate::services::session::{SessionService, Sessions};
use crate::services::token::{JwtCodec, TokenCodec};

const SECRET: &str = "session-test-secret";

fn codec() -> JwtCodec {
    JwtCodec::new(SECRET.as_bytes(), SigningAlgorithm::HS256)
}

fn config() -> SessionConfig {
    SessionConfig::new(SECRET).with_ttl_seconds(3600)
}

fn stateless_service() -> SessionService<JwtCodec> {
    SessionService::stateless(codec(), config())
}

fn stateful_service() -> (SessionService<JwtCodec>, MemoryStorage) {
    let storage = MemoryStorage::new();
    let service = SessionService::with_storage(codec(), config(), Arc::new(storage.clone()));
    (service, storage)
}

fn user_data() -> SessionData {
    SessionData::for_subject(Uuid::new_v4())
        .with_field("role", "admin")
        .with_field("tenant", json!({ "id": 7, "name": "acme" }))
}

/// Replaces one character of the token with a different base64url character
fn corrupt_at(token: &Token, position: usize) -> Token {
    let corrupted: String = token
        .as_str()
        .char_indices()
        .map(|(i, c)| {
            if i != position {
                c
            } else if c == 'A' {
                'B'
            } else {
                'A'
            }
        })
        .collect();
    Token::from(corrupted)
}

#[tokio::test]
async fn test_stateless_create_and_get() {
    let service = stateless_service();
    assert!(!service.is_stateful());

    let data = user_data();
    let token = service.create(data.clone()).await.unwrap();
    assert_eq!(service.get(&token).await.unwrap(), data);
}

#[tokio::test]
async fn test_stateless_tokens_need_no_subject() {
    let service = stateless_service();
    let data = SessionData::new().with_field("guest", true);

    let token = service.create(data.clone()).await.unwrap();
    let decoded = codec().verify(&token).unwrap();
    assert!(decoded.persist_id.is_none());
    assert_eq!(service.get(&token).await.unwrap(), data);
}

#[tokio::test]
async fn test_stateful_create_and_get_strips_protocol_fields() {
    let (service, storage) = stateful_service();
    let data = user_data();
    let subject = data.subject.unwrap();

    let token = service.create(data.clone()).await.unwrap();
    let returned = service.get(&token).await.unwrap();

    assert_eq!(returned, data);
    for internal in ["iat", "exp", "persistKey"] {
        assert!(returned.get(internal).is_none(), "{} leaked to caller", internal);
    }

    let persist_id = codec().verify(&token).unwrap().persist_id.unwrap();
    let set = storage.named_set(&format!("user:{}:sessions", subject));
    assert!(set.check(&persist_id).await.unwrap());
}

#[tokio::test]
async fn test_each_token_gets_its_own_persistence_identifier() {
    let (service, _storage) = stateful_service();
    let data = user_data();
    let subject = data.subject.unwrap();

    let first = service.create(data.clone()).await.unwrap();
    let second = service.create(data).await.unwrap();

    let first_id = codec().verify(&first).unwrap().persist_id.unwrap();
    let second_id = codec().verify(&second).unwrap().persist_id.unwrap();
    assert_ne!(first_id, second_id);
    assert!(Uuid::parse_str(&first_id).is_ok());
    assert_eq!(service.active_sessions(subject).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_stateful_create_requires_subject() {
    let (service, _storage) = stateful_service();
    let result = service.create(SessionData::new().with_field("role", "admin")).await;
    assert!(matches!(result, Err(SessionError::DataInvalid { .. })));
}

#[tokio::test]
async fn test_reserved_fields_are_rejected_in_both_modes() {
    let (stateful, _storage) = stateful_service();
    let stateless = stateless_service();

    for reserved in ["iat", "exp", "persistKey", "uuid"] {
        let data = SessionData::for_subject(Uuid::new_v4()).with_field(reserved, 1);
        assert!(matches!(
            stateful.create(data.clone()).await,
            Err(SessionError::DataInvalid { .. })
        ));
        assert!(matches!(
            stateless.create(data).await,
            Err(SessionError::DataInvalid { .. })
        ));
    }
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let service = stateless_service();
    let issued = Utc::now() - Duration::hours(3);
    let claims = Claims::issue(user_data(), issued, Duration::hours(1), None);
    let token = codec().sign(&claims).unwrap();

    assert_eq!(service.get(&token).await, Err(SessionError::Expired));
}

#[tokio::test]
async fn test_lapsed_token_reads_as_expired_not_revoked() {
    let config = SessionConfig::new(SECRET).with_ttl_seconds(1);
    let service = SessionService::with_storage(codec(), config, Arc::new(MemoryStorage::new()));

    // Issue right after a second boundary so the registry and token clocks
    // would disagree for most of the token's last second
    let into_second = u64::from(Utc::now().timestamp_subsec_millis()).min(999);
    tokio::time::sleep(std::time::Duration::from_millis(1000 - into_second + 10)).await;

    let token = service.create(user_data()).await.unwrap();
    assert!(service.get(&token).await.is_ok());

    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;
    assert_eq!(service.get(&token).await, Err(SessionError::Expired));

    tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
    assert_eq!(service.get(&token).await, Err(SessionError::Expired));
}

#[tokio::test]
async fn test_zero_ttl_token_is_expired_immediately() {
    let config = SessionConfig::new(SECRET).with_ttl_seconds(0);
    let service = SessionService::with_storage(codec(), config, Arc::new(MemoryStorage::new()));

    let token = service.create(user_data()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    assert_eq!(service.get(&token).await, Err(SessionError::Expired));
}

#[tokio::test]
async fn test_expiry_wins_over_registry_lookup() {
    let (service, storage) = stateful_service();
    let data = user_data();
    let subject = data.subject.unwrap();
    let persist_id = Uuid::new_v4().to_string();

    // Registered and never revoked, but the signed expiry has passed
    storage
        .named_set(&service.registry_key(&subject))
        .add(&persist_id)
        .await
        .unwrap();
    let claims = Claims::issue(data, Utc::now() - Duration::hours(2), Duration::minutes(30), Some(persist_id));
    let token = codec().sign(&claims).unwrap();

    assert_eq!(service.get(&token).await, Err(SessionError::Expired));
}

#[tokio::test]
async fn test_delete_revokes_token() {
    let (service, _storage) = stateful_service();
    let token = service.create(user_data()).await.unwrap();

    service.delete(&token).await.unwrap();

    // Signature is still valid, registry says otherwise
    assert!(codec().verify(&token).is_ok());
    assert_eq!(service.get(&token).await, Err(SessionError::NotFound));
    assert_eq!(service.delete(&token).await, Err(SessionError::NotFound));
}

#[tokio::test]
async fn test_stateless_delete_is_no_storage() {
    let service = stateless_service();
    let token = service.create(user_data()).await.unwrap();

    assert_eq!(service.delete(&token).await, Err(SessionError::NoStorage));
    assert_eq!(service.delete(&Token::from("garbage")).await, Err(SessionError::NoStorage));
    assert_eq!(service.refresh_token(&token).await, Err(SessionError::NoStorage));
}

#[tokio::test]
async fn test_refresh_token() {
    let (service, _storage) = stateful_service();
    let data = user_data();
    let old_token = service.create(data.clone()).await.unwrap();
    let before = service.get(&old_token).await.unwrap();

    let new_token = service.refresh_token(&old_token).await.unwrap();

    assert_ne!(new_token, old_token);
    assert_eq!(service.get(&new_token).await.unwrap(), before);
    assert_eq!(service.get(&old_token).await, Err(SessionError::NotFound));
    assert_eq!(service.refresh_token(&old_token).await, Err(SessionError::NotFound));
}

#[tokio::test]
async fn test_concurrent_refresh_of_one_token_succeeds_once() {
    let (service, _storage) = stateful_service();
    let token = service.create(user_data()).await.unwrap();

    let (first, second) = tokio::join!(service.refresh_token(&token), service.refresh_token(&token));

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|outcome| *outcome == Err(SessionError::NotFound)));
}

#[tokio::test]
async fn test_single_character_corruption_is_unexpected_token() {
    let (service, _storage) = stateful_service();
    let token = service.create(user_data()).await.unwrap();

    for (position, c) in token.as_str().char_indices() {
        if c == '.' {
            continue;
        }
        let corrupted = corrupt_at(&token, position);
        let result = service.get(&corrupted).await;
        assert!(
            matches!(result, Err(SessionError::UnexpectedToken(_))),
            "corruption at {} gave {:?}",
            position,
            result
        );
    }

    // The untouched token still validates
    assert!(service.get(&token).await.is_ok());
}

#[tokio::test]
async fn test_wrong_algorithm_is_unexpected_token() {
    let (service, _storage) = stateful_service();
    let foreign = JwtCodec::new(SECRET.as_bytes(), SigningAlgorithm::HS384);
    let claims = Claims::issue(user_data(), Utc::now(), Duration::minutes(5), Some("id".to_string()));
    let token = foreign.sign(&claims).unwrap();

    assert!(matches!(
        service.get(&token).await,
        Err(SessionError::UnexpectedToken(TokenError::UnexpectedAlgorithm { .. }))
    ));
    assert!(matches!(
        service.delete(&token).await,
        Err(SessionError::UnexpectedToken(TokenError::UnexpectedAlgorithm { .. }))
    ));
}

#[tokio::test]
async fn test_missing_internal_claims_are_unexpected_token() {
    let (stateful, _storage) = stateful_service();

    // Issued while storage was off: no persistence identifier
    let stateless_token = stateless_service().create(user_data()).await.unwrap();
    assert!(matches!(
        stateful.get(&stateless_token).await,
        Err(SessionError::UnexpectedToken(_))
    ));
    assert!(matches!(
        stateful.delete(&stateless_token).await,
        Err(SessionError::UnexpectedToken(_))
    ));

    // Persistence identifier without a subject
    let claims = Claims::issue(SessionData::new(), Utc::now(), Duration::minutes(5), Some("id".to_string()));
    let token = codec().sign(&claims).unwrap();
    assert!(matches!(stateful.get(&token).await, Err(SessionError::UnexpectedToken(_))));
}

#[tokio::test]
async fn test_trusted_source_token() {
    let (service, storage) = stateful_service();
    let data = user_data().with_field("source", "payments");
    let subject = data.subject.unwrap();

    let token = service.create(data.clone()).await.unwrap();
    let claims = codec().verify(&token).unwrap();

    assert_eq!(claims.exp - claims.iat, TRUSTED_SOURCE_LIFETIME_HOURS * 3600);
    assert_eq!(service.get(&token).await.unwrap(), data);

    let set = storage.named_set(&service.registry_key(&subject));
    assert_eq!(set.list().await.unwrap(), vec![claims.persist_id.unwrap()]);
}

#[tokio::test]
async fn test_registry_key_uses_prefix() {
    let subject = Uuid::new_v4();
    let service = SessionService::stateless(codec(), config());
    assert_eq!(service.registry_key(&subject), format!("user:{}:sessions", subject));

    let custom = SessionService::stateless(codec(), config().with_key_prefix("account"));
    assert_eq!(custom.registry_key(&subject), format!("account:{}:sessions", subject));
}

#[tokio::test]
async fn test_active_sessions_and_revoke_all() {
    let (service, storage) = stateful_service();
    let data = user_data();
    let subject = data.subject.unwrap();
    let other = user_data();

    let tokens = [
        service.create(data.clone()).await.unwrap(),
        service.create(data.clone()).await.unwrap(),
        service.create(data).await.unwrap(),
    ];
    let bystander = service.create(other).await.unwrap();

    assert_eq!(service.active_sessions(subject).await.unwrap().len(), 3);
    assert!(service.revoke_all(subject).await.unwrap());

    for token in &tokens {
        assert_eq!(service.get(token).await, Err(SessionError::NotFound));
    }
    assert!(service.get(&bystander).await.is_ok());
    assert!(service.active_sessions(subject).await.unwrap().is_empty());
    assert!(!service.revoke_all(subject).await.unwrap());
    assert_eq!(storage.count_keys("user:*:sessions").await.unwrap(), 1);
}

#[tokio::test]
async fn test_bulk_operations_need_storage() {
    let service = stateless_service();
    let subject = Uuid::new_v4();
    assert_eq!(service.active_sessions(subject).await, Err(SessionError::NoStorage));
    assert_eq!(service.revoke_all(subject).await, Err(SessionError::NoStorage));
}

#[tokio::test]
async fn test_backend_failure_is_not_reported_as_not_found() {
    let service = SessionService::with_storage(codec(), config(), Arc::new(UnreachableStorage));
    let backend_down = SessionError::Storage(StorageError::Backend {
        message: "connection refused".to_string(),
    });

    assert_eq!(service.create(user_data()).await, Err(backend_down.clone()));

    let claims = Claims::issue(user_data(), Utc::now(), Duration::minutes(5), Some("id".to_string()));
    let token = codec().sign(&claims).unwrap();
    assert_eq!(service.get(&token).await, Err(backend_down.clone()));
    assert_eq!(service.delete(&token).await, Err(backend_down.clone()));
    assert_eq!(service.revoke_all(Uuid::new_v4()).await, Err(backend_down));
}

#[tokio::test]
async fn test_closed_storage_surfaces_as_storage_error() {
    let (service, storage) = stateful_service();
    let token = service.create(user_data()).await.unwrap();

    storage.close().await.unwrap();

    assert_eq!(
        service.get(&token).await,
        Err(SessionError::Storage(StorageError::Closed))
    );
}
