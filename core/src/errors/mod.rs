//! Error types for the codec, storage and session layers.

mod types;


pub use types::{SessionError, StorageError, TokenError};

/// Result type for session lifecycle operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for storage backend operations
pub type StorageResult<T> = Result<T, StorageError>;
