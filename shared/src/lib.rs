//! Shared configuration types for the Gatekeeper workspace
//!
//! This crate provides the configuration used across the server modules:
//! - Session token settings (secret, lifetime, signing algorithm)
//! - Storage backend selection and Redis connection settings
//! - Environment detection and logging configuration

pub mod config;

// Re-export commonly used items at crate root
pub use config::{
    AppConfig, CacheConfig, Environment, LogFormat, LoggingConfig, SessionConfig,
    SigningAlgorithm, StorageBackend,
};
