//! Session lifecycle: create, get, refresh and delete session tokens,
//! with optional server-side revocation through an expiring registry.

mod service;
mod sweeper;

#[cfg(test)]
mod tests;

pub use service::{SessionService, Sessions};
pub use sweeper::{RegistrySweeper, SweepResult};
