//! Session lifecycle orchestrator

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gk_shared::config::SessionConfig;

use crate::domain::entities::{
    Claims, SessionData, Token, PERSIST_ID_CLAIM, SUBJECT_CLAIM, TRUSTED_SOURCE_LIFETIME_HOURS,
};
use crate::errors::{SessionError, SessionResult, StorageError};
use crate::repositories::storage::{now_millis, ExpiringSet, Storage, Ttl};
use crate::services::token::TokenCodec;

use super::sweeper::RegistrySweeper;

/// Session API consumed by application code
#[async_trait]
pub trait Sessions: Send + Sync {
    /// Issues a token carrying `data`
    async fn create(&self, data: SessionData) -> SessionResult<Token>;

    /// Validates a token and returns its application data
    async fn get(&self, token: &Token) -> SessionResult<SessionData>;

    /// Replaces a token with a fresh one carrying the same data
    async fn refresh_token(&self, token: &Token) -> SessionResult<Token>;

    /// Revokes a token server-side
    async fn delete(&self, token: &Token) -> SessionResult<()>;
}

/// Stateless orchestrator over a token codec and an optional storage
///
/// Without storage every token is self-describing and cannot be revoked.
/// With storage each token also gets a persistence identifier registered
/// under its subject, and is only valid while that registration is live.
pub struct SessionService<C> {
    codec: C,
    config: SessionConfig,
    storage: Option<Arc<dyn Storage>>,
}

impl<C: TokenCodec> SessionService<C> {
    /// Creates a new session service
    ///
    /// # Arguments
    ///
    /// * `codec` - Signs and verifies wire tokens
    /// * `config` - Token lifetime and registry key settings
    /// * `storage` - Backend for revocation; `None` for stateless tokens
    pub fn new(codec: C, config: SessionConfig, storage: Option<Arc<dyn Storage>>) -> Self {
        info!(
            "Session service initialized (ttl: {}s, storage: {})",
            config.token_ttl_seconds,
            if storage.is_some() { "enabled" } else { "disabled" }
        );
        Self { codec, config, storage }
    }

    /// Creates a service whose tokens cannot be revoked
    pub fn stateless(codec: C, config: SessionConfig) -> Self {
        Self::new(codec, config, None)
    }

    /// Creates a service tracking live tokens in `storage`
    pub fn with_storage(codec: C, config: SessionConfig, storage: Arc<dyn Storage>) -> Self {
        Self::new(codec, config, Some(storage))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }

    /// Whether tokens are tracked server-side
    pub fn is_stateful(&self) -> bool {
        self.storage.is_some()
    }

    /// Registry key holding the live tokens of a subject
    pub fn registry_key(&self, subject: &Uuid) -> String {
        format!("{}:{}:sessions", self.config.key_prefix, subject)
    }

    /// Builds the registry sweeper when both storage and a sweep interval are configured
    pub fn sweeper(&self) -> Option<RegistrySweeper> {
        let storage = self.storage.as_ref()?;
        RegistrySweeper::from_config(Arc::clone(storage), &self.config)
    }

    /// Live persistence identifiers of a subject (first batch only)
    ///
    /// # Returns
    /// * `Ok(Vec<String>)` - Identifiers, soonest expiry first
    /// * `Err(SessionError::NoStorage)` - No backend configured
    pub async fn active_sessions(&self, subject: Uuid) -> SessionResult<Vec<String>> {
        let storage = self.require_storage()?;
        let sessions = storage.named_set(&self.registry_key(&subject)).list().await?;
        Ok(sessions)
    }

    /// Revokes every token of a subject at once
    ///
    /// # Returns
    /// * `Ok(true)` - At least one live token was revoked
    /// * `Ok(false)` - The subject had no live token
    /// * `Err(SessionError::NoStorage)` - No backend configured
    pub async fn revoke_all(&self, subject: Uuid) -> SessionResult<bool> {
        let storage = self.require_storage()?;
        let key = self.registry_key(&subject);

        // Drop elapsed members first so a set holding only dead tokens counts as empty
        storage.named_set(&key).purge_expired().await?;
        match storage.delete(&key).await {
            Ok(()) => {
                info!("Revoked all sessions of subject {}", subject);
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn require_storage(&self) -> SessionResult<&Arc<dyn Storage>> {
        self.storage.as_ref().ok_or(SessionError::NoStorage)
    }

    fn token_lifetime(&self) -> chrono::Duration {
        let ceiling = TRUSTED_SOURCE_LIFETIME_HOURS * 3600;
        let seconds = i64::try_from(self.config.token_ttl_seconds).unwrap_or(ceiling);
        chrono::Duration::seconds(seconds.min(ceiling))
    }

    fn registry_ttl(&self, claims: &Claims) -> Ttl {
        if claims.is_trusted_source() {
            return Ttl::Infinite;
        }

        // The member lapses one millisecond after the token, so a lapsed
        // token always reads as expired rather than revoked
        let remaining = claims
            .expires_at_millis()
            .saturating_add(1)
            .saturating_sub(now_millis());
        Ttl::Finite(Duration::from_millis(u64::try_from(remaining).unwrap_or(0)))
    }

    fn decode(&self, token: &Token) -> SessionResult<Claims> {
        self.codec.verify(token).map_err(|e| {
            warn!("Rejected session token: {}", e);
            SessionError::UnexpectedToken(e)
        })
    }

    /// Registry set and member a decoded token is tracked under
    fn registry_entry(&self, storage: &Arc<dyn Storage>, claims: &Claims) -> SessionResult<(Box<dyn ExpiringSet>, String)> {
        let subject = claims
            .subject
            .ok_or_else(|| SessionError::malformed_claim(SUBJECT_CLAIM))?;
        let persist_id = claims
            .persist_id
            .clone()
            .ok_or_else(|| SessionError::malformed_claim(PERSIST_ID_CLAIM))?;

        Ok((storage.named_set(&self.registry_key(&subject)), persist_id))
    }
}

#[async_trait]
impl<C: TokenCodec> Sessions for SessionService<C> {
    async fn create(&self, data: SessionData) -> SessionResult<Token> {
        data.validate()?;

        let persist_id = match &self.storage {
            Some(_) => {
                if data.subject.is_none() {
                    return Err(SessionError::data_invalid("no subject identifier"));
                }
                Some(Uuid::new_v4().to_string())
            }
            None => None,
        };

        let claims = Claims::issue(data, Utc::now(), self.token_lifetime(), persist_id);
        let token = self.codec.sign(&claims).map_err(SessionError::TokenGeneration)?;

        if let Some(storage) = &self.storage {
            let (set, persist_id) = self.registry_entry(storage, &claims)?;
            set.add_expire(&persist_id, self.registry_ttl(&claims)).await?;
            debug!("Registered session in {}", set.name());
        }

        Ok(token)
    }

    async fn get(&self, token: &Token) -> SessionResult<SessionData> {
        let claims = self.decode(token)?;

        if claims.is_expired_at(now_millis()) {
            debug!("Session token expired at {}", claims.exp);
            return Err(SessionError::Expired);
        }

        if let Some(storage) = &self.storage {
            let (set, persist_id) = self.registry_entry(storage, &claims)?;
            let live = match set.check(&persist_id).await {
                Ok(live) => live,
                Err(StorageError::NoSuchKey { .. }) => false,
                Err(e) => return Err(e.into()),
            };
            if !live {
                debug!("Session not registered in {}", set.name());
                return Err(SessionError::NotFound);
            }
        }

        Ok(claims.into_session_data())
    }

    /// Replaces a token: get, then delete, then create
    ///
    /// Not atomic. Between the delete and the create a concurrent caller
    /// sees the old token revoked while the new one does not exist yet, and
    /// two concurrent refreshes of the same token race on the delete (the
    /// loser gets `NotFound`). Without storage the delete step fails, so
    /// refresh fails with `NoStorage`.
    async fn refresh_token(&self, token: &Token) -> SessionResult<Token> {
        let data = self.get(token).await?;
        self.delete(token).await?;
        self.create(data).await
    }

    async fn delete(&self, token: &Token) -> SessionResult<()> {
        let storage = self.require_storage()?;
        let claims = self.decode(token)?;
        let (set, persist_id) = self.registry_entry(storage, &claims)?;

        match set.remove(&persist_id).await {
            Ok(()) => {
                debug!("Revoked session in {}", set.name());
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(SessionError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}
