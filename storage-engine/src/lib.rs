// storage-engine/src/lib.rs
pub mod memory_store;
pub mod sled_store;

pub use memory_store::MemoryStore;
pub use sled_store::SledStore;
