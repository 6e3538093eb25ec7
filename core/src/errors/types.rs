//! Error kinds for each layer of the session system
//!
//! Every layer returns its own kind. The session layer wraps codec and
//! storage failures without flattening them, so callers can tell a forged
//! token apart from a revoked one, and both apart from a stateless
//! deployment that cannot revoke at all.

use thiserror::Error;

/// Failures of the token codec (signing and verification)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Token signature verification failed")]
    InvalidSignature,

    #[error("Unexpected signing algorithm: {found}")]
    UnexpectedAlgorithm { found: String },

    #[error("Token generation failed: {reason}")]
    GenerationFailed { reason: String },
}

/// Failures of a storage backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("No such key found: {key}")]
    NoSuchKey { key: String },

    #[error("Key does not hold the expected kind of value: {key}")]
    NotStrSet { key: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Storage backend error: {message}")]
    Backend { message: String },

    #[error("Storage is closed")]
    Closed,
}

impl StorageError {
    /// Whether this error means the key or member does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NoSuchKey { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Session lifecycle errors, as seen by callers of the session API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Unexpected token: {0}")]
    UnexpectedToken(TokenError),

    #[error("Session not found")]
    NotFound,

    #[error("Session expired")]
    Expired,

    #[error("No session storage configured")]
    NoStorage,

    #[error("Session data not valid: {reason}")]
    DataInvalid { reason: String },

    #[error("Token generation failed: {0}")]
    TokenGeneration(TokenError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Stable error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::UnexpectedToken(_) => "UNEXPECTED_TOKEN",
            SessionError::NotFound => "NOT_FOUND",
            SessionError::Expired => "EXPIRED",
            SessionError::NoStorage => "NO_STORAGE",
            SessionError::DataInvalid { .. } => "DATA_INVALID",
            SessionError::TokenGeneration(_) => "TOKEN_GENERATION_FAILED",
            SessionError::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub(crate) fn malformed_claim(claim: &str) -> Self {
        SessionError::UnexpectedToken(TokenError::InvalidFormat {
            reason: format!("missing or malformed claim: {}", claim),
        })
    }

    pub(crate) fn data_invalid(reason: impl Into<String>) -> Self {
        SessionError::DataInvalid {
            reason: reason.into(),
        }
    }
}
