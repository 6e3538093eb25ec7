//! Periodic purge of elapsed registry members
//!
//! Every registry operation already purges its own set, so sweeping only
//! bounds the memory held by subjects who stop calling in. Running it or
//! not changes no observable result.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use gk_shared::config::SessionConfig;

use crate::errors::SessionResult;
use crate::repositories::storage::{KeyPattern, Storage};

/// Walks every session registry set and purges elapsed members
pub struct RegistrySweeper {
    storage: Arc<dyn Storage>,
    key_pattern: String,
    interval: Duration,
}

impl RegistrySweeper {
    /// Create a sweeper for the registry sets under `key_prefix`
    pub fn new(storage: Arc<dyn Storage>, key_prefix: &str, interval: Duration) -> Self {
        Self {
            storage,
            key_pattern: format!("{}:*:sessions", KeyPattern::escape(key_prefix)),
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Create a sweeper from session configuration
    ///
    /// Returns `None` when no sweep interval is configured.
    pub fn from_config(storage: Arc<dyn Storage>, config: &SessionConfig) -> Option<Self> {
        let seconds = config.sweep_interval_seconds.filter(|seconds| *seconds > 0)?;
        Some(Self::new(storage, &config.key_prefix, Duration::from_secs(seconds)))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single sweep cycle
    ///
    /// A failure on one set is recorded in the result and does not stop
    /// the cycle.
    ///
    /// # Returns
    /// * `Ok(SweepResult)` - Summary of the cycle
    /// * `Err(SessionError)` - The registry keys could not be enumerated
    pub async fn run_sweep(&self) -> SessionResult<SweepResult> {
        let keys = self.storage.keys(&self.key_pattern).await?;
        let mut result = SweepResult::default();

        for key in keys {
            result.sets_scanned += 1;
            match self.storage.named_set(&key).purge_expired().await {
                Ok(purged) => result.members_purged += purged,
                Err(e) => {
                    error!("Failed to sweep registry set {}: {}", key, e);
                    result.errors.push(format!("{}: {}", key, e));
                }
            }
        }

        info!(
            "Registry sweep completed - Sets: {}, Purged: {}, Errors: {}",
            result.sets_scanned,
            result.members_purged,
            result.errors.len()
        );

        Ok(result)
    }

    /// Start the sweeper as a background task
    ///
    /// The first cycle runs immediately, then once per interval.
    pub fn start_background_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Registry sweeper started - will run every {} seconds",
                self.interval.as_secs()
            );

            let mut interval_timer = tokio::time::interval(self.interval);

            loop {
                interval_timer.tick().await;

                match self.run_sweep().await {
                    Ok(result) => {
                        if !result.is_success() {
                            warn!("Sweep completed with errors: {:?}", result.errors);
                        }
                    }
                    Err(e) => {
                        error!("Registry sweep cycle failed: {}", e);
                    }
                }
            }
        })
    }
}

/// Result of a sweep cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepResult {
    /// Number of registry sets visited
    pub sets_scanned: usize,
    /// Number of elapsed members removed
    pub members_purged: usize,
    /// Errors encountered on individual sets
    pub errors: Vec<String>,
}

impl SweepResult {
    /// Check if the sweep was successful (no errors)
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
