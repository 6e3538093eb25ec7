//! Redis storage backend
//!
//! Plain values are stored as JSON strings. Each expiring set is a sorted
//! set whose score is the member's expiry in unix milliseconds, `+inf` for
//! members that never expire. Every set operation is sent as one MULTI
//! transaction that first drops the members scored at or below now.

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, RedisError, RedisResult};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use gk_core::errors::{StorageError, StorageResult};
use gk_core::repositories::storage::{now_millis, ExpiringSet, Storage, Ttl, LIST_BATCH_SIZE};

use crate::cache::CacheConfig;
use crate::InfrastructureError;

/// COUNT hint for SCAN iterations
const SCAN_BATCH_SIZE: usize = 10;

/// Upper bound of the connection retry backoff
const MAX_RETRY_DELAY_MS: u64 = 5000;

struct Shared {
    /// `None` once closed; dropping the last handle stops the connection driver
    connection: RwLock<Option<MultiplexedConnection>>,
    response_timeout: Duration,
}

/// Redis-backed storage sharing one multiplexed connection across clones
#[derive(Clone)]
pub struct RedisStorage {
    shared: Arc<Shared>,
}

impl RedisStorage {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `config` - URL, timeouts and connection retry policy
    ///
    /// # Returns
    /// * `Ok(RedisStorage)` - Connected storage
    /// * `Err(InfrastructureError::Config)` - The URL cannot be parsed
    /// * `Err(InfrastructureError::Cache)` - No connection after all attempts
    pub async fn connect(config: &CacheConfig) -> Result<Self, InfrastructureError> {
        info!("Connecting Redis storage at {}", mask_url(&config.url));

        let client = Client::open(config.url.as_str()).map_err(|e| {
            error!("Failed to parse Redis URL: {}", e);
            InfrastructureError::Config(format!("Invalid Redis URL: {}", e))
        })?;

        let connection = Self::create_connection_with_retry(
            client,
            Duration::from_secs(config.connection_timeout.max(1)),
            config.max_retries.max(1),
            config.retry_delay_ms,
        )
        .await?;

        info!("Redis storage connected");

        Ok(Self {
            shared: Arc::new(Shared {
                connection: RwLock::new(Some(connection)),
                response_timeout: Duration::from_secs(config.response_timeout.max(1)),
            }),
        })
    }

    /// Create multiplexed connection with retry logic
    async fn create_connection_with_retry(
        client: Client,
        connection_timeout: Duration,
        max_attempts: u32,
        retry_delay_ms: u64,
    ) -> Result<MultiplexedConnection, InfrastructureError> {
        let mut attempts = 0;
        let mut delay = retry_delay_ms;

        loop {
            attempts += 1;
            debug!("Attempting to connect to Redis (attempt {})", attempts);

            let outcome = match timeout(connection_timeout, client.get_multiplexed_async_connection()).await {
                Ok(result) => result,
                Err(_) => Err(RedisError::from((redis::ErrorKind::IoError, "connection timed out"))),
            };

            match outcome {
                Ok(connection) => return Ok(connection),
                Err(e) if attempts < max_attempts && is_retriable_error(&e) => {
                    warn!(
                        "Failed to connect to Redis (attempt {}/{}): {}. Retrying in {}ms...",
                        attempts, max_attempts, e, delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                    // Exponential backoff with cap at 5 seconds
                    delay = (delay * 2).min(MAX_RETRY_DELAY_MS);
                }
                Err(e) => {
                    error!("Failed to connect to Redis after {} attempts: {}", attempts, e);
                    return Err(InfrastructureError::Cache(e));
                }
            }
        }
    }

    /// Run one command (or transaction) under the response timeout
    ///
    /// No retry: a failure is reported to the caller as a backend error.
    async fn execute<T, F, Fut>(&self, key: &str, operation: F) -> StorageResult<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let connection = match self.shared.connection.read().await.as_ref() {
            Some(connection) => connection.clone(),
            None => return Err(StorageError::Closed),
        };

        match timeout(self.shared.response_timeout, operation(connection)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_redis_error(key, e)),
            Err(_) => {
                error!("Redis command on '{}' timed out", key);
                Err(StorageError::Backend {
                    message: format!("command timed out after {:?}", self.shared.response_timeout),
                })
            }
        }
    }

    /// Walk the keyspace with SCAN; each round trip gets its own timeout
    async fn scan(&self, pattern: &str) -> StorageResult<HashSet<String>> {
        let mut found = HashSet::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = self
                .execute(pattern, |mut conn| async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH_SIZE)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            found.extend(batch);
            if next == 0 {
                return Ok(found);
            }
            cursor = next;
        }
    }

    /// Whether `close` has released the connection
    pub async fn is_closed(&self) -> bool {
        self.shared.connection.read().await.is_none()
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn ping(&self) -> StorageResult<String> {
        self.execute("PING", |mut conn| async move {
            redis::cmd("PING").query_async::<_, String>(&mut conn).await
        })
        .await
    }

    async fn get(&self, key: &str) -> StorageResult<Value> {
        let raw = self
            .execute(key, |mut conn| async move { conn.get::<_, Option<String>>(key).await })
            .await?;

        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(StorageError::NoSuchKey { key: key.to_string() }),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        let payload = serde_json::to_string(value)?;
        self.execute(key, |mut conn| async move { conn.set::<_, _, ()>(key, payload).await })
            .await
    }

    async fn set_with_expire(&self, key: &str, value: &Value, ttl: Duration) -> StorageResult<()> {
        let payload = serde_json::to_string(value)?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        self.execute(key, |mut conn| async move {
            redis::cmd("SET")
                .arg(key)
                .arg(payload)
                .arg("PX")
                .arg(ttl_ms)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let deleted = self
            .execute(key, |mut conn| async move { conn.del::<_, u32>(key).await })
            .await?;

        if deleted == 0 {
            return Err(StorageError::NoSuchKey { key: key.to_string() });
        }
        debug!("Deleted key '{}'", key);
        Ok(())
    }

    async fn count_keys(&self, pattern: &str) -> StorageResult<usize> {
        Ok(self.scan(pattern).await?.len())
    }

    async fn keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        Ok(self.scan(pattern).await?.into_iter().collect())
    }

    fn named_set(&self, key: &str) -> Box<dyn ExpiringSet> {
        Box::new(RedisSet {
            name: key.to_string(),
            storage: self.clone(),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        let connection = self.shared.connection.write().await.take();
        match connection {
            Some(connection) => {
                drop(connection);
                info!("Redis storage closed");
                Ok(())
            }
            None => Err(StorageError::Closed),
        }
    }
}

/// Expiring set stored as a Redis sorted set
struct RedisSet {
    name: String,
    storage: RedisStorage,
}

impl RedisSet {
    /// Pipeline opening a transaction that purges elapsed members
    fn purging_pipeline(&self, now_ms: i64) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&self.name)
            .arg("-inf")
            .arg(now_ms)
            .ignore();
        pipe
    }
}

#[async_trait]
impl ExpiringSet for RedisSet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add_expire(&self, member: &str, ttl: Ttl) -> StorageResult<()> {
        let now = now_millis();
        let score = match ttl.expires_at_millis(now) {
            Some(expires_at) => expires_at.to_string(),
            None => "+inf".to_string(),
        };
        let mut pipe = self.purging_pipeline(now);
        pipe.cmd("ZADD").arg(&self.name).arg(score).arg(member).ignore();

        self.storage
            .execute(&self.name, |mut conn| async move { pipe.query_async::<_, ()>(&mut conn).await })
            .await
    }

    async fn remove(&self, member: &str) -> StorageResult<()> {
        let mut pipe = self.purging_pipeline(now_millis());
        pipe.cmd("ZREM").arg(&self.name).arg(member);

        let (removed,): (u32,) = self
            .storage
            .execute(&self.name, |mut conn| async move { pipe.query_async(&mut conn).await })
            .await?;

        if removed == 0 {
            return Err(StorageError::NoSuchKey { key: self.name.clone() });
        }
        Ok(())
    }

    async fn check(&self, member: &str) -> StorageResult<bool> {
        let mut pipe = self.purging_pipeline(now_millis());
        pipe.cmd("ZSCORE").arg(&self.name).arg(member);

        // Anything left after the purge is live
        let (score,): (Option<String>,) = self
            .storage
            .execute(&self.name, |mut conn| async move { pipe.query_async(&mut conn).await })
            .await?;

        Ok(score.is_some())
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let now = now_millis();
        let mut pipe = self.purging_pipeline(now);
        pipe.cmd("ZRANGEBYSCORE")
            .arg(&self.name)
            .arg(format!("({}", now))
            .arg("+inf")
            .arg("LIMIT")
            .arg(0)
            .arg(LIST_BATCH_SIZE);

        let (members,): (Vec<String>,) = self
            .storage
            .execute(&self.name, |mut conn| async move { pipe.query_async(&mut conn).await })
            .await?;

        Ok(members)
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        let now = now_millis();
        let name = self.name.as_str();

        self.storage
            .execute(name, |mut conn| async move {
                redis::cmd("ZREMRANGEBYSCORE")
                    .arg(name)
                    .arg("-inf")
                    .arg(now)
                    .query_async::<_, usize>(&mut conn)
                    .await
            })
            .await
    }
}

/// Translate a Redis error into the storage error kinds
///
/// Only a type mismatch has a dedicated kind; every connectivity, timeout
/// or protocol failure is a backend error, never a missing key.
pub(crate) fn map_redis_error(key: &str, error: RedisError) -> StorageError {
    if error.code() == Some("WRONGTYPE") || error.to_string().contains("WRONGTYPE") {
        return StorageError::NotStrSet { key: key.to_string() };
    }

    error!("Redis command on '{}' failed: {}", key, error);
    StorageError::Backend {
        message: error.to_string(),
    }
}

/// Check if a Redis error is retriable
///
/// Determines if an error is transient and the connection attempt should be retried.
pub(crate) fn is_retriable_error(error: &RedisError) -> bool {
    matches!(
        error.kind(),
        redis::ErrorKind::IoError
            | redis::ErrorKind::ClientError
            | redis::ErrorKind::BusyLoadingError
            | redis::ErrorKind::TryAgain
    )
}

/// Mask credentials in a Redis URL for logging
pub(crate) fn mask_url(url: &str) -> String {
    if let (Some(at_pos), Some(proto_end)) = (url.rfind('@'), url.find("://")) {
        if at_pos > proto_end {
            return format!("{}****{}", &url[..proto_end + 3], &url[at_pos..]);
        }
    }
    url.to_string()
}
