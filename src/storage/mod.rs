pub mod cache;

// Re-export common types
pub use cache::{CacheEntry, CacheStore};
