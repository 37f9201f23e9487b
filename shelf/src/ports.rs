use shared::Result;

// Ports are the pluggable extension points for the durable medium backing a
// cache instance.

/// Port for the key-value medium a cache stores its entries in.
///
/// Implementations must apply `put` as a whole-value swap at single-key
/// granularity: a concurrent reader observes either the previous value or the
/// new one, never a torn mix of the two.
pub trait EntryStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value. May refuse with `Error::CapacityExceeded` when a
    /// configured byte quota would be exceeded; nothing is written in that
    /// case.
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove a key, reporting whether it existed.
    fn remove(&self, key: &str) -> Result<bool>;

    /// Every stored entry whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
}
