//! Services: token codec and session lifecycle.

pub mod session;
pub mod token;

// Re-export commonly used types
pub use session::{RegistrySweeper, SessionService, Sessions, SweepResult};
pub use token::{JwtCodec, TokenCodec};
