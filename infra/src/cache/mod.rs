//! Cache module for Redis-backed session storage
//!
//! Provides the networked implementation of the storage capability:
//! connection setup with retry, per-command timeouts and expiring sets
//! kept as sorted sets scored by expiry.

pub mod redis_storage;


pub use redis_storage::RedisStorage;

// Re-export commonly used types
pub use gk_shared::config::CacheConfig;
