//! # Engine Configuration
//!
//! TTL categories for the read-through cache. Which category a read uses is
//! configuration, not call-site logic; services name a category and the
//! cache resolves it here.

use std::time::Duration;

/// Cache TTL configuration.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use bodega_engine::config::CacheConfig;
///
/// let config = CacheConfig::default().short_ttl(Duration::from_secs(10));
/// assert_eq!(config.short, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Volatile reads: branch stock lists, pending deliveries, balances.
    pub short: Duration,

    /// Slower-moving reads: ledger movement listings.
    pub medium: Duration,

    /// Near-static reads: the family-group forest.
    pub long: Duration,
}

impl CacheConfig {
    /// Sets the short TTL.
    pub fn short_ttl(mut self, ttl: Duration) -> Self {
        self.short = ttl;
        self
    }

    /// Sets the medium TTL.
    pub fn medium_ttl(mut self, ttl: Duration) -> Self {
        self.medium = ttl;
        self
    }

    /// Sets the long TTL.
    pub fn long_ttl(mut self, ttl: Duration) -> Self {
        self.long = ttl;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            short: Duration::from_secs(30),
            medium: Duration::from_secs(300),
            long: Duration::from_secs(3600),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = CacheConfig::default()
            .short_ttl(Duration::from_millis(5))
            .long_ttl(Duration::from_secs(60));

        assert_eq!(config.short, Duration::from_millis(5));
        assert_eq!(config.medium, Duration::from_secs(300));
        assert_eq!(config.long, Duration::from_secs(60));
    }
}
