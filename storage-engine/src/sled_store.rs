use shared::{Error, Result};
use shelf::ports::EntryStore;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Sled-backed durable store with an optional byte quota.
///
/// Survives process restarts: every mutation is flushed before returning, so a
/// successful `put` is immediately readable and durable. The quota counts
/// stored value bytes; a `put` that would exceed it is refused without
/// writing.
pub struct SledStore {
    db: sled::Db,
    max_bytes: Option<u64>,
    // Guards the check-then-write sequence in `put` as well as the counter
    // itself; mutations take this lock before touching the db.
    used_bytes: Mutex<u64>,
}

impl SledStore {
    /// Open (or create) an unbounded store at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_quota(path, None)
    }

    /// Open (or create) the store, creating parent directories as needed.
    /// Quota accounting is rebuilt from the existing contents on open.
    pub fn with_quota(path: impl AsRef<Path>, max_bytes: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Unavailable(format!("failed to create directory: {e}")))?;
        }

        let db = sled::open(path)
            .map_err(|e| Error::Unavailable(format!("failed to open sled database: {e}")))?;

        let mut used = 0u64;
        for item in db.iter() {
            let (_, value) =
                item.map_err(|e| Error::Internal(format!("failed to iterate database: {e}")))?;
            used += value.len() as u64;
        }

        Ok(Self {
            db,
            max_bytes,
            used_bytes: Mutex::new(used),
        })
    }

    fn used_bytes(&self) -> MutexGuard<'_, u64> {
        self.used_bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::Internal(format!("failed to flush database: {e}")))?;
        Ok(())
    }
}

impl EntryStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key)
            .map_err(|e| Error::Internal(format!("failed to read key: {e}")))?;
        Ok(value.map(|ivec| ivec.to_vec()))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut used = self.used_bytes();

        let previous_len = self
            .db
            .get(key)
            .map_err(|e| Error::Internal(format!("failed to read key: {e}")))?
            .map_or(0, |v| v.len() as u64);
        let new_len = value.len() as u64;

        if let Some(max) = self.max_bytes {
            let projected = used.saturating_sub(previous_len) + new_len;
            if projected > max {
                return Err(Error::CapacityExceeded(format!(
                    "{projected} bytes would exceed the {max} byte quota"
                )));
            }
        }

        self.db
            .insert(key, value)
            .map_err(|e| Error::Internal(format!("failed to write key: {e}")))?;
        self.flush()?;

        *used = used.saturating_sub(previous_len) + new_len;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut used = self.used_bytes();

        let removed = self
            .db
            .remove(key)
            .map_err(|e| Error::Internal(format!("failed to remove key: {e}")))?;

        match removed {
            Some(value) => {
                self.flush()?;
                *used = used.saturating_sub(value.len() as u64);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (key, value) =
                item.map_err(|e| Error::Internal(format!("failed to iterate database: {e}")))?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| Error::Internal(format!("stored key is not utf-8: {e}")))?;
            entries.push((key, value.to_vec()));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use serde::{Deserialize, Serialize};
    use shelf::{CacheEntry, CacheKey, CacheSettings, ProductCache};
    use std::sync::Arc;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Product {
        sku: String,
        price_cents: u64,
    }

    fn product(sku: &str) -> Product {
        Product {
            sku: sku.to_string(),
            price_cents: 499,
        }
    }

    #[test]
    fn test_put_get_remove_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledStore::new(temp_dir.path().join("test.sled")).unwrap();

        store.put("listings.US.books.all", b"payload".to_vec()).unwrap();
        assert_eq!(
            store.get("listings.US.books.all").unwrap(),
            Some(b"payload".to_vec())
        );

        assert!(store.remove("listings.US.books.all").unwrap());
        assert!(!store.remove("listings.US.books.all").unwrap());
        assert_eq!(store.get("listings.US.books.all").unwrap(), None);
    }

    #[test]
    fn test_contents_survive_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.sled");

        {
            let store = SledStore::new(&db_path).unwrap();
            store.put("listings.US.books.all", b"payload".to_vec()).unwrap();
        }

        let reopened = SledStore::new(&db_path).unwrap();
        assert_eq!(
            reopened.get("listings.US.books.all").unwrap(),
            Some(b"payload".to_vec())
        );
    }

    #[test]
    fn test_scan_prefix_respects_namespace() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledStore::new(temp_dir.path().join("test.sled")).unwrap();

        store.put("listings.US.books.all", b"a".to_vec()).unwrap();
        store.put("listings.CA.books.all", b"b".to_vec()).unwrap();
        store.put("sessions.US.books.all", b"c".to_vec()).unwrap();

        let scanned = store.scan_prefix("listings.").unwrap();
        assert_eq!(scanned.len(), 2);
        assert!(scanned.iter().all(|(k, _)| k.starts_with("listings.")));
    }

    #[test]
    fn test_quota_refuses_oversized_put_without_writing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store =
            SledStore::with_quota(temp_dir.path().join("test.sled"), Some(16)).unwrap();

        store.put("listings.a", vec![0u8; 10]).unwrap();

        let result = store.put("listings.b", vec![0u8; 10]);
        assert!(matches!(result, Err(Error::CapacityExceeded(_))));
        assert_eq!(store.get("listings.b").unwrap(), None);
    }

    #[test]
    fn test_quota_accounts_for_overwrites_and_removals() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store =
            SledStore::with_quota(temp_dir.path().join("test.sled"), Some(16)).unwrap();

        store.put("listings.a", vec![0u8; 12]).unwrap();
        // Replacing releases the old value's bytes first.
        store.put("listings.a", vec![0u8; 14]).unwrap();

        store.remove("listings.a").unwrap();
        store.put("listings.b", vec![0u8; 16]).unwrap();
    }

    #[test]
    fn test_quota_accounting_rebuilt_on_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.sled");

        {
            let store = SledStore::with_quota(&db_path, Some(16)).unwrap();
            store.put("listings.a", vec![0u8; 12]).unwrap();
        }

        let reopened = SledStore::with_quota(&db_path, Some(16)).unwrap();
        let result = reopened.put("listings.b", vec![0u8; 10]);
        assert!(matches!(result, Err(Error::CapacityExceeded(_))));
    }

    #[test]
    fn test_quota_accounting_stays_exact_under_concurrent_put_and_remove() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SledStore::with_quota(temp_dir.path().join("test.sled"), Some(64)).unwrap(),
        );

        // A full-quota value on one key: every put fits exactly, so a refusal
        // or a panic can only come from the counter drifting mid-race.
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    store.put("listings.k", vec![0u8; 64]).unwrap();
                }
            })
        };
        let remover = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    store.remove("listings.k").unwrap();
                }
            })
        };
        writer.join().unwrap();
        remover.join().unwrap();

        store.remove("listings.k").unwrap();
        store.put("listings.k", vec![0u8; 64]).unwrap();
    }

    #[test]
    fn test_product_cache_read_your_write_across_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("listings.sled");
        let products = vec![product("a"), product("b")];

        {
            let store = Arc::new(SledStore::new(&db_path).unwrap());
            let cache: ProductCache<Product> =
                ProductCache::new(store, CacheSettings::default());
            cache
                .save("US", "electronics", Some("phones"), products.clone())
                .unwrap();
            assert_eq!(
                cache.get_instant("US", "electronics", Some("phones")).unwrap(),
                Some(products.clone())
            );
        }

        let store = Arc::new(SledStore::new(&db_path).unwrap());
        let cache: ProductCache<Product> = ProductCache::new(store, CacheSettings::default());
        assert_eq!(
            cache.get_instant("US", "electronics", Some("phones")).unwrap(),
            Some(products)
        );
    }

    #[test]
    fn test_capacity_refusal_triggers_sweep_and_frees_space() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SledStore::with_quota(temp_dir.path().join("listings.sled"), Some(256)).unwrap(),
        );
        let cache: ProductCache<Product> =
            ProductCache::new(store.clone(), CacheSettings::default());

        // Seed a hard-expired entry directly, then fill the quota.
        let mut expired = CacheEntry::new("US", "books", None, vec![product("old")]);
        expired.stored_at = chrono::Utc::now() - TimeDelta::hours(30);
        store
            .put(
                CacheKey::derive("listings", "US", "books", None)
                    .unwrap()
                    .as_str(),
                serde_json::to_vec(&expired).unwrap(),
            )
            .unwrap();

        let response = cache
            .save(
                "US",
                "electronics",
                None,
                (0..20).map(|i| product(&format!("sku-{i}"))).collect(),
            )
            .unwrap();
        assert!(!response.persisted);
        assert_eq!(response.evicted, 1);

        // The sweep freed the expired entry, so a retried save now lands.
        let retried = cache
            .save("US", "electronics", None, vec![product("a")])
            .unwrap();
        assert!(retried.persisted);
    }
}
