//! In-memory domain cache with TTL
//!
//! Caches host-to-slug lookups to reduce database queries for routing.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default cache TTL (5 minutes)
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Cache entry with expiration
#[derive(Clone)]
struct CacheEntry {
    slug: Option<String>,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(slug: Option<String>, ttl: Duration) -> Self {
        Self {
            slug,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Thread-safe in-memory domain cache.
///
/// Maps normalized host -> tenant slug; `None` means the host is known not
/// to resolve, so repeated lookups for a bad domain skip the database too.
pub struct DomainCache {
    cache: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for DomainCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainCache {
    /// Create a new cache with default TTL
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    /// Create a new cache with custom TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Get the cached slug for a host.
    /// `Some(Some(slug))`: resolved; `Some(None)`: cached as not resolving;
    /// `None`: not in cache or expired.
    pub fn get(&self, host: &str) -> Option<Option<String>> {
        let cache = self.cache.read().ok()?;
        let entry = cache.get(host)?;

        if entry.is_expired() {
            None
        } else {
            Some(entry.slug.clone())
        }
    }

    /// Cache a host -> slug mapping
    pub fn set(&self, host: &str, slug: Option<String>) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(host.to_string(), CacheEntry::new(slug, self.ttl));
        }
    }

    /// Invalidate a specific host
    pub fn invalidate(&self, host: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(host);
        }
    }

    /// Number of live entries (expired entries are counted until evicted)
    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
