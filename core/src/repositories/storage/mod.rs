pub mod memory;
pub mod pattern;
pub mod traits;

pub use memory::MemoryStorage;
pub use pattern::KeyPattern;
pub use traits::{ExpiringSet, Storage, Ttl, LIST_BATCH_SIZE};


/// Current unix time in milliseconds, the resolution registry expiry uses
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
