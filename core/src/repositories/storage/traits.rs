//! Storage and expiring registry traits defining the backend contract.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::errors::StorageResult;

/// Maximum number of members a single `ExpiringSet::list` call returns
pub const LIST_BATCH_SIZE: usize = 100;

/// Lifetime of a registry member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Lives until explicitly removed
    Infinite,
    /// Lives for the given duration from insertion
    Finite(Duration),
}

impl Ttl {
    /// Absolute expiry in unix milliseconds, `None` for infinite
    pub fn expires_at_millis(&self, now_ms: i64) -> Option<i64> {
        match self {
            Ttl::Infinite => None,
            Ttl::Finite(ttl) => {
                let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                Some(now_ms.saturating_add(ttl_ms))
            }
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Ttl::Infinite)
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Ttl::Finite(ttl)
    }
}

/// Whether a member with the given expiry is live at `now_ms`
pub(crate) fn is_live(expires_at: Option<i64>, now_ms: i64) -> bool {
    expires_at.map_or(true, |expiry| expiry > now_ms)
}

/// A named collection of members, each with its own expiry
///
/// Every operation first discards the members whose expiry has elapsed, so
/// an elapsed member is never observed as live whether or not a purge ran.
/// Implementations rely on the backend to serialize operations on one set.
#[async_trait]
pub trait ExpiringSet: Send + Sync {
    /// Name (storage key) of the set
    fn name(&self) -> &str;

    /// Inserts a member that never expires
    ///
    /// Re-adding an existing member is a no-op apart from clearing its expiry.
    async fn add(&self, member: &str) -> StorageResult<()> {
        self.add_expire(member, Ttl::Infinite).await
    }

    /// Inserts a member expiring `ttl` from now, overwriting any previous expiry
    async fn add_expire(&self, member: &str, ttl: Ttl) -> StorageResult<()>;

    /// Removes a member
    ///
    /// # Returns
    /// * `Ok(())` - The member was live and has been removed
    /// * `Err(StorageError::NoSuchKey)` - The member is absent or already elapsed
    async fn remove(&self, member: &str) -> StorageResult<()>;

    /// Whether a member is currently live; a missing set holds no members
    async fn check(&self, member: &str) -> StorageResult<bool>;

    /// Live members, at most `LIST_BATCH_SIZE`, soonest expiry first and
    /// never-expiring members last
    async fn list(&self) -> StorageResult<Vec<String>>;

    /// Discards elapsed members
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of members discarded
    async fn purge_expired(&self) -> StorageResult<usize>;
}

/// Key-value storage with named expiring sets
///
/// Values are JSON documents so any serializable payload can be stored.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Round-trips to the backend
    ///
    /// # Returns
    /// * `Ok(String)` - `"PONG"` when the backend is reachable
    async fn ping(&self) -> StorageResult<String>;

    /// Reads a value
    ///
    /// # Returns
    /// * `Ok(Value)` - The stored value
    /// * `Err(StorageError::NoSuchKey)` - The key is absent or expired
    /// * `Err(StorageError::NotStrSet)` - The key holds a named set
    async fn get(&self, key: &str) -> StorageResult<Value>;

    /// Stores a value without expiry, replacing whatever the key held
    async fn set(&self, key: &str, value: &Value) -> StorageResult<()>;

    /// Stores a value that disappears after `ttl`
    async fn set_with_expire(&self, key: &str, value: &Value, ttl: Duration) -> StorageResult<()>;

    /// Deletes a key of any kind
    ///
    /// # Returns
    /// * `Ok(())` - A key was deleted
    /// * `Err(StorageError::NoSuchKey)` - Nothing was deleted
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Counts live keys matching a glob pattern (`*`, `?`, `[...]`)
    async fn count_keys(&self, pattern: &str) -> StorageResult<usize>;

    /// Lists live keys matching a glob pattern
    async fn keys(&self, pattern: &str) -> StorageResult<Vec<String>>;

    /// Returns a handle on the expiring set stored under `key`
    ///
    /// Neither presence nor type is checked until the handle is used.
    fn named_set(&self, key: &str) -> Box<dyn ExpiringSet>;

    /// Releases the backend; every later call fails with `StorageError::Closed`
    async fn close(&self) -> StorageResult<()>;
}
