use dashmap::DashMap;
use shared::{Error, Result};
use shelf::ports::EntryStore;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-memory store over a concurrent map, with the same optional byte quota
/// as the durable backend.
///
/// Serves as an injectable double for tests and as a fallback when no durable
/// medium is available in the environment; contents do not survive restarts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
    max_bytes: Option<u64>,
    // Guards the check-then-write sequence in `put` as well as the counter
    // itself; mutations take this lock before touching the map.
    used_bytes: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(max_bytes: u64) -> Self {
        Self {
            max_bytes: Some(max_bytes),
            ..Self::default()
        }
    }

    fn used_bytes(&self) -> MutexGuard<'_, u64> {
        self.used_bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EntryStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut used = self.used_bytes();

        let previous_len = self.entries.get(key).map_or(0, |v| v.len() as u64);
        let new_len = value.len() as u64;

        if let Some(max) = self.max_bytes {
            let projected = used.saturating_sub(previous_len) + new_len;
            if projected > max {
                return Err(Error::CapacityExceeded(format!(
                    "{projected} bytes would exceed the {max} byte quota"
                )));
            }
        }

        self.entries.insert(key.to_string(), value);
        *used = used.saturating_sub(previous_len) + new_len;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut used = self.used_bytes();

        match self.entries.remove(key) {
            Some((_, value)) => {
                *used = used.saturating_sub(value.len() as u64);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries
            .iter()
            .filter(|item| item.key().starts_with(prefix))
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect())
    }
}
