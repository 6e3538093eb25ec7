//! # Gatekeeper Infrastructure
//!
//! Concrete backends and process wiring for the session core:
//! - **Cache**: Redis storage with expiring sets kept as sorted sets
//! - **Telemetry**: tracing subscriber setup from the logging configuration
//! - **Bootstrap**: `initialize` builds the session service for the configured backend

// Re-export core types for convenience
pub use gk_core::errors::*;

/// Cache module - Redis storage backend
pub mod cache;

/// Telemetry module - tracing subscriber setup
pub mod telemetry;

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use gk_core::repositories::storage::{MemoryStorage, Storage};
use gk_core::services::{JwtCodec, RegistrySweeper, SessionService};
use gk_shared::config::{AppConfig, StorageBackend};

use crate::cache::RedisStorage;

/// Infrastructure service container
pub struct InfrastructureServices {
    /// Session orchestrator for the configured backend
    pub sessions: Arc<SessionService<JwtCodec>>,
    /// Storage shared with the session service, `None` when stateless
    pub storage: Option<Arc<dyn Storage>>,
    sweeper: Option<JoinHandle<()>>,
}

impl InfrastructureServices {
    /// Whether a background registry sweep is running
    pub fn has_sweeper(&self) -> bool {
        self.sweeper.is_some()
    }

    /// Stop the sweeper and release the storage backend
    pub async fn shutdown(mut self) -> Result<(), InfrastructureError> {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
        if let Some(storage) = self.storage.take() {
            storage.close().await?;
        }
        info!("Infrastructure services shut down");
        Ok(())
    }
}

impl Drop for InfrastructureServices {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

/// Initialize infrastructure services
///
/// Connects the configured storage backend, checks it answers, builds the
/// session service and starts the registry sweeper when an interval is set.
///
/// # Returns
/// * `Ok(InfrastructureServices)` - Ready to serve sessions
/// * `Err(InfrastructureError::Config)` - Unusable configuration
/// * `Err(InfrastructureError::Cache)` - Redis could not be reached
pub async fn initialize(config: &AppConfig) -> Result<InfrastructureServices, InfrastructureError> {
    info!("Initializing infrastructure services ({})", config.environment);

    if config.session.is_using_default_secret() {
        if config.environment.is_production() {
            return Err(InfrastructureError::Config(
                "SESSION_SECRET must be set in production".to_string(),
            ));
        }
        warn!("Using the default session secret; set SESSION_SECRET");
    }

    let storage: Option<Arc<dyn Storage>> = match config.storage {
        StorageBackend::None => None,
        StorageBackend::Memory => Some(Arc::new(MemoryStorage::new())),
        StorageBackend::Redis => Some(Arc::new(RedisStorage::connect(&config.cache).await?)),
    };

    if let Some(storage) = &storage {
        storage.ping().await?;
    }

    let codec = JwtCodec::from_config(&config.session);
    let sessions = Arc::new(SessionService::new(
        codec,
        config.session.clone(),
        storage.clone(),
    ));

    let sweeper = storage
        .as_ref()
        .and_then(|storage| RegistrySweeper::from_config(Arc::clone(storage), &config.session))
        .map(|sweeper| Arc::new(sweeper).start_background_task());

    info!("Infrastructure services initialized successfully (storage: {})", config.storage);

    Ok(InfrastructureServices {
        sessions,
        storage,
        sweeper,
    })
}

/// Initialize infrastructure services from the environment
///
/// Loads a `.env` file if present before reading the configuration.
pub async fn initialize_from_env() -> Result<InfrastructureServices, InfrastructureError> {
    dotenvy::dotenv().ok();
    initialize(&AppConfig::from_env()).await
}

/// Infrastructure-specific error types
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Redis connection error
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use gk_core::services::Sessions;
    use gk_core::SessionData;
    use gk_shared::config::{Environment, SessionConfig};

    fn config_with(storage: StorageBackend) -> AppConfig {
        AppConfig {
            storage,
            session: SessionConfig::new("infra-test-secret"),
            ..AppConfig::development()
        }
    }

    #[tokio::test]
    async fn test_initialize_memory_backend() {
        let services = initialize(&config_with(StorageBackend::Memory)).await.unwrap();
        assert!(services.storage.is_some());
        assert!(services.sessions.is_stateful());
        assert!(!services.has_sweeper());
        services.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_stateless() {
        let services = initialize(&config_with(StorageBackend::None)).await.unwrap();
        assert!(services.storage.is_none());

        let token = services.sessions.create(SessionData::new()).await.unwrap();
        assert!(services.sessions.get(&token).await.is_ok());
        services.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_starts_sweeper() {
        let mut config = config_with(StorageBackend::Memory);
        config.session = config.session.with_sweep_interval(60);

        let services = initialize(&config).await.unwrap();
        assert!(services.has_sweeper());
        services.shutdown().await.unwrap();
    }

    #[test]
    fn test_backend_failures_convert_to_storage_errors() {
        let error = InfrastructureError::from(StorageError::Closed);
        assert!(matches!(error, InfrastructureError::Storage(StorageError::Closed)));
        assert_eq!(error.to_string(), format!("Storage error: {}", StorageError::Closed));
    }

    #[tokio::test]
    async fn test_production_requires_secret() {
        let config = AppConfig {
            environment: Environment::Production,
            ..AppConfig::default()
        };

        let result = initialize(&config).await;
        assert!(matches!(result, Err(InfrastructureError::Config(_))));
    }
}
