//! # Read-Through Cache
//!
//! A generic key→value memoizer with per-category TTLs and invalidation by
//! exact key or key prefix.
//!
//! ## Position in the System
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cache Is An Optimization                             │
//! │                                                                         │
//! │  read ──► ReadCache ──hit──► cached value                              │
//! │              │                                                          │
//! │             miss                                                        │
//! │              ▼                                                          │
//! │          producer() ──► SQLite (authoritative) ──► cached + returned   │
//! │                                                                         │
//! │  EVERY mutating service path must invalidate every key it can affect.  │
//! │  A missed invalidation is a correctness bug, not a staleness nuisance: │
//! │  stock summaries and balances are derived from cached reads.           │
//! │                                                                         │
//! │  Each service documents its invalidation contract next to the write    │
//! │  path that owns it.                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Notes
//! - An injected instance, NOT module-global state: tests and deployments
//!   compose their own.
//! - Values are stored type-erased (`Arc<dyn Any>`); a downcast mismatch is
//!   treated as a miss and overwritten by the fresh produce.
//! - Producer failures propagate to the caller; nothing is cached on failure.
//! - Expiry is lazy: an expired entry is skipped on read and dropped on the
//!   next write that touches the map. No background task.
//! - Two concurrent misses on one key may both produce; last insert wins.
//!   The authoritative store makes both results equally valid at that point.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::config::CacheConfig;

// =============================================================================
// TTL Categories
// =============================================================================

/// Named TTL categories; durations come from [`CacheConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Short,
    Medium,
    Long,
}

// =============================================================================
// Cache
// =============================================================================

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

/// The read-through memoizer shared by all engine services.
pub struct ReadCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ReadCache {
    /// Creates a cache with the given TTL configuration.
    pub fn new(config: CacheConfig) -> Self {
        ReadCache {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn ttl_duration(&self, ttl: Ttl) -> Duration {
        match ttl {
            Ttl::Short => self.config.short,
            Ttl::Medium => self.config.medium,
            Ttl::Long => self.config.long,
        }
    }

    /// Returns the memoized value if present and unexpired, else invokes
    /// `producer`, stores the result with `ttl`, and returns it.
    ///
    /// A failing producer caches nothing and its error propagates.
    pub async fn get_or_insert_with<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Ttl,
        producer: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.peek::<T>(key).await {
            trace!(key, "Cache hit");
            return Ok(hit);
        }

        trace!(key, "Cache miss");
        let value = producer().await?;

        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: Arc::new(value.clone()),
                expires_at: now + self.ttl_duration(ttl),
            },
        );

        Ok(value)
    }

    /// Reads a memoized value without producing.
    pub async fn peek<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    /// Removes one entry. Returns whether it existed.
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        debug!(key, removed, "Cache invalidate");
        removed
    }

    /// Removes all entries whose key starts with `prefix`. Returns how many
    /// were dropped.
    ///
    /// Key layout keeps segments ':'-delimited so a numeric id can never be
    /// a prefix of a different id (see [`crate::keys`]).
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let dropped = before - entries.len();
        debug!(prefix, dropped, "Cache invalidate by prefix");
        dropped
    }

    /// Drops everything.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of unexpired entries (for diagnostics).
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        ReadCache::new(CacheConfig::default())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn millis_config() -> CacheConfig {
        CacheConfig::default()
            .short_ttl(Duration::from_millis(20))
            .medium_ttl(Duration::from_secs(60))
            .long_ttl(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_second_read_is_memoized() {
        let cache = ReadCache::new(millis_config());

        let a: Result<i64, ()> = cache
            .get_or_insert_with("k", Ttl::Medium, || async { Ok(1) })
            .await;
        // Producer returning a different value proves the first one is served.
        let b: Result<i64, ()> = cache
            .get_or_insert_with("k", Ttl::Medium, || async { Ok(2) })
            .await;

        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_reproduced() {
        let cache = ReadCache::new(millis_config());

        let _: Result<i64, ()> = cache
            .get_or_insert_with("k", Ttl::Short, || async { Ok(1) })
            .await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let fresh: Result<i64, ()> = cache
            .get_or_insert_with("k", Ttl::Short, || async { Ok(2) })
            .await;
        assert_eq!(fresh.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_producer_failure_is_not_cached() {
        let cache = ReadCache::new(millis_config());

        let failed: Result<i64, &str> = cache
            .get_or_insert_with("k", Ttl::Medium, || async { Err("boom") })
            .await;
        assert_eq!(failed.unwrap_err(), "boom");
        assert!(cache.peek::<i64>("k").await.is_none());

        let ok: Result<i64, &str> = cache
            .get_or_insert_with("k", Ttl::Medium, || async { Ok(7) })
            .await;
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_invalidate_exact_key() {
        let cache = ReadCache::new(millis_config());
        let _: Result<i64, ()> = cache
            .get_or_insert_with("a", Ttl::Medium, || async { Ok(1) })
            .await;

        assert!(cache.invalidate("a").await);
        assert!(!cache.invalidate("a").await);
        assert!(cache.peek::<i64>("a").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_prefix_spares_other_keys() {
        let cache = ReadCache::new(millis_config());
        for key in ["ledger:7:balance", "ledger:7:movements", "ledger:71:balance"] {
            let _: Result<i64, ()> = cache
                .get_or_insert_with(key, Ttl::Medium, || async { Ok(1) })
                .await;
        }

        // "ledger:7:" must not touch provider 71.
        assert_eq!(cache.invalidate_prefix("ledger:7:").await, 2);
        assert!(cache.peek::<i64>("ledger:71:balance").await.is_some());
    }

    #[tokio::test]
    async fn test_type_mismatch_reads_as_miss() {
        let cache = ReadCache::new(millis_config());
        let _: Result<i64, ()> = cache
            .get_or_insert_with("k", Ttl::Medium, || async { Ok(1) })
            .await;

        assert!(cache.peek::<String>("k").await.is_none());
    }
}
