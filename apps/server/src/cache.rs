//! Read-through cache for derived projections (stats, availability).
//!
//! Entries are advisory: a miss or a stale hit always falls back to the loader, and
//! nothing that guards slot occupancy ever reads from here.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFamily {
    Stats,
    Availability,
}

impl CacheFamily {
    fn prefix(self) -> &'static str {
        match self {
            CacheFamily::Stats => "stats",
            CacheFamily::Availability => "availability",
        }
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct TtlCache {
    entries: Arc<DashMap<String, Entry>>,
    config: CacheConfig,
}

impl TtlCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
        }
    }

    fn ttl(&self, family: CacheFamily) -> Duration {
        match family {
            CacheFamily::Stats => self.config.stats_ttl,
            CacheFamily::Availability => self.config.availability_ttl,
        }
    }

    fn full_key(family: CacheFamily, key: &str) -> String {
        format!("{}:{}", family.prefix(), key)
    }

    /// Serves a fresh entry or runs `load` and stores its result for the family's TTL.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        family: CacheFamily,
        key: &str,
        load: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let full_key = Self::full_key(family, key);

        if let Some(hit) = self.lookup(&full_key) {
            match serde_json::from_str(&hit) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!("Dropping undecodable cache entry {}: {}", full_key, e);
                    self.entries.remove(&full_key);
                }
            }
        }

        let value = load().await?;
        match serde_json::to_string(&value) {
            Ok(encoded) => {
                self.entries.insert(
                    full_key,
                    Entry {
                        value: encoded,
                        expires_at: Instant::now() + self.ttl(family),
                    },
                );
            }
            Err(e) => tracing::warn!("Not caching {}: {}", full_key, e),
        }
        Ok(value)
    }

    fn lookup(&self, full_key: &str) -> Option<String> {
        let entry = self.entries.get(full_key)?;
        if Instant::now() < entry.expires_at {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn remove(&self, family: CacheFamily, key: &str) {
        self.entries.remove(&Self::full_key(family, key));
    }

    /// Drops every entry of `family` whose key starts with `prefix`.
    pub fn invalidate(&self, family: CacheFamily, prefix: &str) {
        let full_prefix = Self::full_key(family, prefix);
        self.entries.retain(|k, _| !k.starts_with(&full_prefix));
    }

    pub fn invalidate_family(&self, family: CacheFamily) {
        self.invalidate(family, "");
    }

    /// Removes expired entries; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
