//! Domain layer: claim sets, session data and wire tokens.

pub mod entities;

// Re-export commonly used domain types
pub use entities::{Claims, SessionData, Token};
