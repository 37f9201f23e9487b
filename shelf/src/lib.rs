// shelf/src/lib.rs
pub mod cache;
pub mod domain;
pub mod ports;

pub use cache::ProductCache;
pub use domain::response::SaveResponse;
pub use domain::{CacheEntry, CacheKey, CacheSettings};
pub use ports::EntryStore;
