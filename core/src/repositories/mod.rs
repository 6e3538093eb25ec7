//! Storage capability consumed by the session layer, and its volatile backend.

pub mod storage;

pub use storage::{ExpiringSet, MemoryStorage, Storage, Ttl, LIST_BATCH_SIZE};
