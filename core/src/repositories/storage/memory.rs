//! Volatile in-process storage backend
//!
//! Holds plain values and expiring sets in one map behind a tokio `RwLock`.
//! Expiry is lazy: elapsed values read as absent and are dropped on the next
//! write touching them, elapsed set members are purged by every set operation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::now_millis;
use super::pattern::KeyPattern;
use super::traits::{is_live, ExpiringSet, Storage, Ttl, LIST_BATCH_SIZE};
use crate::errors::{StorageError, StorageResult};

type Members = HashMap<String, Option<i64>>;

#[derive(Debug, Clone)]
enum Entry {
    Value { value: Value, expires_at: Option<i64> },
    Set(Members),
}

impl Entry {
    fn is_live(&self, now_ms: i64) -> bool {
        match self {
            Entry::Value { expires_at, .. } => is_live(*expires_at, now_ms),
            Entry::Set(members) => !members.is_empty(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: RwLock<HashMap<String, Entry>>,
    closed: AtomicBool,
}

impl Inner {
    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

/// In-memory storage, shared by all clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

impl MemoryStorage {
    /// Create a new, empty storage
    pub fn new() -> Self {
        Self::default()
    }

    async fn matching_keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        self.inner.ensure_open()?;
        let pattern = KeyPattern::new(pattern)?;
        let now = now_millis();
        let entries = self.inner.entries.read().await;

        Ok(entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ping(&self) -> StorageResult<String> {
        self.inner.ensure_open()?;
        Ok("PONG".to_string())
    }

    async fn get(&self, key: &str) -> StorageResult<Value> {
        self.inner.ensure_open()?;
        let entries = self.inner.entries.read().await;

        match entries.get(key) {
            Some(Entry::Value { value, expires_at }) if is_live(*expires_at, now_millis()) => Ok(value.clone()),
            Some(Entry::Set(_)) => Err(StorageError::NotStrSet { key: key.to_string() }),
            _ => Err(StorageError::NoSuchKey { key: key.to_string() }),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        self.inner.ensure_open()?;
        let mut entries = self.inner.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry::Value {
                value: value.clone(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_expire(&self, key: &str, value: &Value, ttl: Duration) -> StorageResult<()> {
        self.inner.ensure_open()?;
        // Sub-millisecond ttls round up, as with PX on a networked store
        let ttl = ttl.max(Duration::from_millis(1));
        let expires_at = Ttl::Finite(ttl).expires_at_millis(now_millis());

        let mut entries = self.inner.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry::Value {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.ensure_open()?;
        let mut entries = self.inner.entries.write().await;

        match entries.remove(key) {
            Some(entry) if entry.is_live(now_millis()) => Ok(()),
            _ => Err(StorageError::NoSuchKey { key: key.to_string() }),
        }
    }

    async fn count_keys(&self, pattern: &str) -> StorageResult<usize> {
        Ok(self.matching_keys(pattern).await?.len())
    }

    async fn keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        self.matching_keys(pattern).await
    }

    fn named_set(&self, key: &str) -> Box<dyn ExpiringSet> {
        Box::new(MemorySet {
            name: key.to_string(),
            inner: Arc::clone(&self.inner),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.ensure_open()?;
        let mut entries = self.inner.entries.write().await;
        self.inner.closed.store(true, Ordering::Release);
        entries.clear();
        info!("Memory storage closed");
        Ok(())
    }
}

/// Expiring set view over a `MemoryStorage` key
struct MemorySet {
    name: String,
    inner: Arc<Inner>,
}

impl MemorySet {
    fn not_found(&self) -> StorageError {
        StorageError::NoSuchKey { key: self.name.clone() }
    }
}

/// Makes `key` usable as a set: `Ok(true)` if a set is stored there,
/// `Ok(false)` if nothing live is (an elapsed value is dropped)
fn prepare_set(entries: &mut HashMap<String, Entry>, key: &str, now_ms: i64) -> StorageResult<bool> {
    let live_value = match entries.get(key) {
        None => return Ok(false),
        Some(Entry::Set(_)) => return Ok(true),
        Some(Entry::Value { expires_at, .. }) => is_live(*expires_at, now_ms),
    };
    if live_value {
        return Err(StorageError::NotStrSet { key: key.to_string() });
    }
    entries.remove(key);
    Ok(false)
}

/// Discards elapsed members of the set at `key`, dropping the key once empty
fn purge_set(entries: &mut HashMap<String, Entry>, key: &str, now_ms: i64) -> StorageResult<usize> {
    if !prepare_set(entries, key, now_ms)? {
        return Ok(0);
    }
    let Some(Entry::Set(members)) = entries.get_mut(key) else {
        return Ok(0);
    };

    let before = members.len();
    members.retain(|_, expires_at| is_live(*expires_at, now_ms));
    let purged = before - members.len();
    if members.is_empty() {
        entries.remove(key);
    }
    Ok(purged)
}

#[async_trait]
impl ExpiringSet for MemorySet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add_expire(&self, member: &str, ttl: Ttl) -> StorageResult<()> {
        self.inner.ensure_open()?;
        let now = now_millis();
        let mut entries = self.inner.entries.write().await;
        purge_set(&mut entries, &self.name, now)?;

        let entry = entries
            .entry(self.name.clone())
            .or_insert_with(|| Entry::Set(Members::new()));
        if let Entry::Set(members) = entry {
            members.insert(member.to_string(), ttl.expires_at_millis(now));
        }
        debug!("Added member to set {} (infinite: {})", self.name, ttl.is_infinite());
        Ok(())
    }

    async fn remove(&self, member: &str) -> StorageResult<()> {
        self.inner.ensure_open()?;
        let now = now_millis();
        let mut entries = self.inner.entries.write().await;
        purge_set(&mut entries, &self.name, now)?;

        let Some(Entry::Set(members)) = entries.get_mut(&self.name) else {
            return Err(self.not_found());
        };
        if members.remove(member).is_none() {
            return Err(self.not_found());
        }
        if members.is_empty() {
            entries.remove(&self.name);
        }
        Ok(())
    }

    async fn check(&self, member: &str) -> StorageResult<bool> {
        self.inner.ensure_open()?;
        let now = now_millis();
        let mut entries = self.inner.entries.write().await;
        purge_set(&mut entries, &self.name, now)?;

        Ok(matches!(entries.get(&self.name), Some(Entry::Set(members)) if members.contains_key(member)))
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        self.inner.ensure_open()?;
        let now = now_millis();
        let mut entries = self.inner.entries.write().await;
        purge_set(&mut entries, &self.name, now)?;

        let Some(Entry::Set(members)) = entries.get(&self.name) else {
            return Ok(Vec::new());
        };
        let mut live: Vec<(&String, Option<i64>)> = members.iter().map(|(m, e)| (m, *e)).collect();
        live.sort_by(|(a_member, a_exp), (b_member, b_exp)| {
            let a_key = a_exp.unwrap_or(i64::MAX);
            let b_key = b_exp.unwrap_or(i64::MAX);
            a_key
                .cmp(&b_key)
                .then_with(|| a_exp.is_none().cmp(&b_exp.is_none()))
                .then_with(|| a_member.cmp(b_member))
        });

        Ok(live
            .into_iter()
            .take(LIST_BATCH_SIZE)
            .map(|(member, _)| member.clone())
            .collect())
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        self.inner.ensure_open()?;
        let now = now_millis();
        let mut entries = self.inner.entries.write().await;
        let purged = purge_set(&mut entries, &self.name, now)?;
        if purged > 0 {
            debug!("Purged {} elapsed members from set {}", purged, self.name);
        }
        Ok(purged)
    }
}
