pub mod cache;
pub mod lock;

pub use cache::{CacheEntry, CacheManifest, hash_of};
pub use lock::StoreLock;
