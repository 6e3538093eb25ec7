//! Domain entities carried through the session lifecycle.

pub mod claims;
pub mod session;
pub mod token;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use claims::{
    Claims, EXPIRES_AT_CLAIM, ISSUED_AT_CLAIM, PERSIST_ID_CLAIM, RESERVED_CLAIMS, SUBJECT_CLAIM,
    TRUSTED_SOURCE_LIFETIME_HOURS,
};
pub use session::{SessionData, TRUSTED_SOURCE_FIELD};
pub use token::Token;
