//! # Gatekeeper Core
//!
//! Session token lifecycle for the Gatekeeper backend: the claim set and
//! wire token entities, the token codec, the storage capability with its
//! expiring registry, a volatile in-memory backend and the orchestrator
//! that ties them together.

pub mod domain;
pub mod errors;
pub mod repositories;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::*;
pub use errors::*;
pub use repositories::*;
pub use services::*;
