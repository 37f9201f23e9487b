use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use shared::{Error, Result};

/// Separator between the fields of a derived key.
pub const KEY_SEPARATOR: char = '.';

/// Sentinel stored in place of an absent subcategory.
pub const SUBCATEGORY_ALL: &str = "all";

pub mod response {
    #[derive(Clone, Debug)]
    pub struct SaveResponse {
        pub persisted: bool,
        pub evicted: usize,
    }

    impl SaveResponse {
        pub fn persisted() -> Self {
            Self {
                persisted: true,
                evicted: 0,
            }
        }

        pub fn rejected(evicted: usize) -> Self {
            Self {
                persisted: false,
                evicted,
            }
        }
    }
}

/// Key identifying one cached listing: namespace-prefixed concatenation of
/// (marketplace, category, subcategory). Identity is purely structural — the
/// same three fields always derive the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a composite dimension. An absent (or empty)
    /// subcategory normalizes to the `all` sentinel. Fields embedding the
    /// separator are rejected, since they would alias distinct keys.
    pub fn derive(
        namespace: &str,
        marketplace: &str,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<Self> {
        if marketplace.is_empty() {
            return Err(Error::InvalidKey("marketplace must not be empty".into()));
        }
        if category.is_empty() {
            return Err(Error::InvalidKey("category must not be empty".into()));
        }
        for (field, value) in [
            ("marketplace", Some(marketplace)),
            ("category", Some(category)),
            ("subcategory", subcategory),
        ] {
            if let Some(value) = value {
                if value.contains(KEY_SEPARATOR) {
                    return Err(Error::InvalidKey(format!(
                        "{field} must not contain '{KEY_SEPARATOR}': {value}"
                    )));
                }
            }
        }

        let subcategory = subcategory
            .filter(|s| !s.is_empty())
            .unwrap_or(SUBCATEGORY_ALL);

        Ok(Self(format!(
            "{namespace}{KEY_SEPARATOR}{marketplace}{KEY_SEPARATOR}{category}{KEY_SEPARATOR}{subcategory}"
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One stored listing. Written whole by a single `save`, never merged or
/// mutated in place; a later `save` for the same key fully replaces it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry<P> {
    pub products: Vec<P>,
    pub stored_at: DateTime<Utc>,
    pub marketplace: String,
    pub category: String,
    pub subcategory: Option<String>,
}

impl<P> CacheEntry<P> {
    pub fn new(
        marketplace: impl Into<String>,
        category: impl Into<String>,
        subcategory: Option<String>,
        products: Vec<P>,
    ) -> Self {
        Self {
            products,
            stored_at: Utc::now(),
            marketplace: marketplace.into(),
            category: category.into(),
            subcategory,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now.signed_duration_since(self.stored_at)
    }
}

/// Freshness and expiry windows for one cache instance.
#[derive(Clone, Debug)]
pub struct CacheSettings {
    pub namespace: String,
    /// Entries younger than this are fresh; older ones should trigger a
    /// background refresh but are still served.
    pub fresh_window: TimeDelta,
    /// Entries older than this are removed by the expiry sweep.
    pub hard_expiry: TimeDelta,
}

impl CacheSettings {
    pub fn new(namespace: impl Into<String>, fresh_window: TimeDelta, hard_expiry: TimeDelta) -> Self {
        Self {
            namespace: namespace.into(),
            fresh_window,
            hard_expiry,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: "listings".to_string(),
            fresh_window: TimeDelta::hours(1),
            hard_expiry: TimeDelta::hours(24),
        }
    }
}
