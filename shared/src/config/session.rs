//! Session token configuration

use serde::{Deserialize, Serialize};

use super::env_or;

const DEFAULT_SECRET: &str = "development-secret-please-change-in-production";

/// HMAC algorithm used to sign session tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum SigningAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

impl std::str::FromStr for SigningAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(SigningAlgorithm::HS256),
            "HS384" => Ok(SigningAlgorithm::HS384),
            "HS512" => Ok(SigningAlgorithm::HS512),
            _ => Err(format!("Unsupported signing algorithm: {}", s)),
        }
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningAlgorithm::HS256 => write!(f, "HS256"),
            SigningAlgorithm::HS384 => write!(f, "HS384"),
            SigningAlgorithm::HS512 => write!(f, "HS512"),
        }
    }
}

/// Session token configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Secret key for signing tokens
    pub secret: String,

    /// Token lifetime in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,

    /// Algorithm for token signing (default: HS256)
    #[serde(default)]
    pub algorithm: SigningAlgorithm,

    /// Prefix of the per-subject registry keys (`{prefix}:{uuid}:sessions`)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Interval of the background registry sweep; `None` disables it
    #[serde(default)]
    pub sweep_interval_seconds: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::from(DEFAULT_SECRET),
            token_ttl_seconds: default_token_ttl(),
            algorithm: SigningAlgorithm::default(),
            key_prefix: default_key_prefix(),
            sweep_interval_seconds: None,
        }
    }
}

impl SessionConfig {
    /// Create a new session configuration with secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        let secret = std::env::var("SESSION_SECRET").unwrap_or_else(|_| DEFAULT_SECRET.to_string());
        let sweep_interval_seconds = std::env::var("SESSION_SWEEP_INTERVAL")
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .filter(|seconds: &u64| *seconds > 0);

        Self {
            secret,
            token_ttl_seconds: env_or("SESSION_TOKEN_TTL", default_token_ttl()),
            algorithm: env_or("SESSION_JWT_ALGORITHM", SigningAlgorithm::default()),
            key_prefix: std::env::var("SESSION_KEY_PREFIX").unwrap_or_else(|_| default_key_prefix()),
            sweep_interval_seconds,
        }
    }

    /// Set token lifetime in seconds
    pub fn with_ttl_seconds(mut self, seconds: u64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    /// Set the signing algorithm
    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the registry key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Enable the background registry sweep
    pub fn with_sweep_interval(mut self, seconds: u64) -> Self {
        self.sweep_interval_seconds = Some(seconds);
        self
    }

    /// Check if using default secret (security warning)
    pub fn is_using_default_secret(&self) -> bool {
        self.secret == DEFAULT_SECRET
    }
}

fn default_token_ttl() -> u64 {
    86400 // 1 day
}

fn default_key_prefix() -> String {
    String::from("user")
}
