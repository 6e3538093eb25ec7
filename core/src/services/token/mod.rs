//! Token codec: turns claim sets into signed wire tokens and back.

mod codec;


pub use codec::{JwtCodec, TokenCodec};
