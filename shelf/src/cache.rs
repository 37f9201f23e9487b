use crate::domain::response::SaveResponse;
use crate::domain::{CacheEntry, CacheKey, CacheSettings, KEY_SEPARATOR};
use crate::ports::EntryStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::{Error, Result};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Timestamp-only view of a stored entry. The expiry sweep only needs the
/// timestamp, so it stays payload-agnostic.
#[derive(Deserialize)]
struct EntryStamp {
    stored_at: DateTime<Utc>,
}

/// Stale-tolerant read-through cache for product listings, keyed by
/// (marketplace, category, subcategory).
///
/// Three policies compose over one injected store: instant reads return any
/// stored payload regardless of age, `is_fresh` classifies entries against the
/// short window, and the expiry sweep removes entries past the hard limit.
/// The cache never fetches data itself; a product source writes through
/// `save` and a maintenance scheduler drives `cleanup`.
pub struct ProductCache<P> {
    store: Arc<dyn EntryStore>,
    settings: CacheSettings,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Clone for ProductCache<P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            settings: self.settings.clone(),
            _payload: PhantomData,
        }
    }
}

impl<P> std::fmt::Debug for ProductCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductCache")
            .field("namespace", &self.settings.namespace)
            .finish()
    }
}

impl<P> ProductCache<P>
where
    P: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn EntryStore>, settings: CacheSettings) -> Self {
        Self {
            store,
            settings,
            _payload: PhantomData,
        }
    }

    fn key(&self, marketplace: &str, category: &str, subcategory: Option<&str>) -> Result<CacheKey> {
        CacheKey::derive(&self.settings.namespace, marketplace, category, subcategory)
    }

    fn namespace_prefix(&self) -> String {
        format!("{}{}", self.settings.namespace, KEY_SEPARATOR)
    }

    /// Return the stored payload for this dimension, regardless of its age.
    ///
    /// Never blocks and never fails on the read path: a storage error or an
    /// entry that does not parse is logged and reported as a miss. Only key
    /// derivation on bad input returns `Err`.
    pub fn get_instant(
        &self,
        marketplace: &str,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<Option<Vec<P>>> {
        let key = self.key(marketplace, category, subcategory)?;

        let bytes = match self.store.get(key.as_str()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(key = %key, error = %e, "instant read failed, treating as miss");
                return Ok(None);
            }
        };

        match serde_json::from_slice::<CacheEntry<P>>(&bytes) {
            Ok(entry) => Ok(Some(entry.products)),
            Err(e) => {
                warn!(key = %key, error = %e, "stored entry does not parse, treating as miss");
                Ok(None)
            }
        }
    }

    /// Whether the entry for this dimension is younger than the fresh window.
    /// Absent or unreadable entries count as stale.
    ///
    /// Parses the full entry shape, not just the timestamp: an entry the
    /// instant read cannot serve must classify as stale so the refresh
    /// orchestrator re-fetches it.
    pub fn is_fresh(
        &self,
        marketplace: &str,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<bool> {
        let key = self.key(marketplace, category, subcategory)?;

        let bytes = match self.store.get(key.as_str()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!(key = %key, error = %e, "freshness read failed, treating as stale");
                return Ok(false);
            }
        };

        match serde_json::from_slice::<CacheEntry<P>>(&bytes) {
            Ok(entry) => {
                let age = Utc::now().signed_duration_since(entry.stored_at);
                Ok(age < self.settings.fresh_window)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "stored entry does not parse, treating as stale");
                Ok(false)
            }
        }
    }

    /// Store a payload for this dimension with `stored_at = now`, fully
    /// replacing any previous entry.
    ///
    /// A capacity refusal from the store is not fatal: the expiry sweep runs
    /// once as corrective action and the response reports the write as not
    /// persisted. The write is not retried.
    pub fn save(
        &self,
        marketplace: &str,
        category: &str,
        subcategory: Option<&str>,
        products: Vec<P>,
    ) -> Result<SaveResponse> {
        let key = self.key(marketplace, category, subcategory)?;

        let entry = CacheEntry::new(
            marketplace,
            category,
            subcategory.filter(|s| !s.is_empty()).map(str::to_owned),
            products,
        );
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| Error::Internal(format!("failed to serialize entry: {e}")))?;

        match self.store.put(key.as_str(), bytes) {
            Ok(()) => {
                debug!(key = %key, "entry saved");
                Ok(SaveResponse::persisted())
            }
            Err(Error::CapacityExceeded(reason)) => {
                warn!(key = %key, reason = %reason, "store refused write, running expiry sweep");
                let evicted = self.cleanup()?;
                Ok(SaveResponse::rejected(evicted))
            }
            Err(e) => Err(e),
        }
    }

    /// Remove every entry in this namespace older than the hard expiry limit.
    /// Entries whose timestamp cannot be read are removed as well. Returns the
    /// number of entries removed; running it again with no intervening writes
    /// removes nothing.
    ///
    /// Cost scales with the namespace size, so this belongs on a maintenance
    /// cadence rather than a per-request path.
    pub fn cleanup(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;

        for (key, bytes) in self.store.scan_prefix(&self.namespace_prefix())? {
            let expired = match serde_json::from_slice::<EntryStamp>(&bytes) {
                Ok(stamp) => now.signed_duration_since(stamp.stored_at) > self.settings.hard_expiry,
                Err(e) => {
                    warn!(key = %key, error = %e, "unreadable entry, removing during sweep");
                    true
                }
            };

            if expired && self.store.remove(&key)? {
                removed += 1;
            }
        }

        debug!(removed, "expiry sweep complete");
        Ok(removed)
    }

    /// Remove every entry in this namespace, regardless of age. A last-resort
    /// reset; no other operation invokes it.
    pub fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;

        for (key, _) in self.store.scan_prefix(&self.namespace_prefix())? {
            if self.store.remove(&key)? {
                removed += 1;
            }
        }

        debug!(removed, "cache cleared");
        Ok(removed)
    }
}
