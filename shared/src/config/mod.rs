//! Configuration module with business-specific sub-modules
//!
//! This module organizes configuration into logical areas:
//! - `session` - Token lifetime, signing and registry key settings
//! - `cache` - Storage backend selection and Redis configuration
//! - `environment` - Environment detection and logging configuration

pub mod cache;
pub mod environment;
pub mod session;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use cache::{CacheConfig, StorageBackend};
pub use environment::{Environment, LogFormat, LoggingConfig};
pub use session::{SessionConfig, SigningAlgorithm};

/// Complete application configuration combining all sub-configurations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Environment configuration
    pub environment: Environment,

    /// Session token configuration
    pub session: SessionConfig,

    /// Which storage backend tracks live tokens
    #[serde(default)]
    pub storage: StorageBackend,

    /// Redis configuration, used when `storage` is `redis`
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let env = Environment::default();
        Self {
            environment: env,
            session: SessionConfig::default(),
            storage: StorageBackend::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::for_environment(env),
        }
    }
}

impl AppConfig {
    /// Create configuration for development environment
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            logging: LoggingConfig::for_environment(Environment::Development),
            ..Default::default()
        }
    }

    /// Load configuration from environment
    pub fn from_env() -> Self {
        let environment = Environment::from_env();
        Self {
            environment,
            session: SessionConfig::from_env(),
            storage: StorageBackend::from_env(),
            cache: CacheConfig::from_env(),
            logging: LoggingConfig::for_environment(environment),
        }
    }
}

/// Read an environment variable and parse it, falling back to `default`
/// when the variable is missing or malformed.
pub(crate) fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}
