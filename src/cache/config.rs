//! Cache sizing and invalidation policy.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_PER_STORE_LIMIT: usize = 10_000;
const DEFAULT_EVENT_QUEUE_LIMIT: usize = 1024;
const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 5000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Store resolved values; when off every lookup goes to the loaders.
    pub enabled: bool,
    /// Maximum entries of one per-store partition.
    pub per_store_limit: usize,
    /// Entry lifetime in seconds; `0` keeps entries until evicted.
    pub ttl_seconds: u64,
    /// Pending invalidation events kept before the oldest is dropped.
    pub event_queue_limit: usize,
    /// Auto-consume interval (ms) for eventual consistency.
    pub auto_consume_interval_ms: u64,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn per_store_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.per_store_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_seconds > 0).then(|| Duration::from_secs(self.ttl_seconds))
    }

    pub fn auto_consume_interval(&self) -> Duration {
        Duration::from_millis(self.auto_consume_interval_ms.max(1))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_store_limit: DEFAULT_PER_STORE_LIMIT,
            ttl_seconds: 0,
            event_queue_limit: DEFAULT_EVENT_QUEUE_LIMIT,
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_means_no_expiry() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl(), None);

        let config = CacheConfig {
            ttl_seconds: 30,
            ..Default::default()
        };
        assert_eq!(config.ttl(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_limit_is_clamped_to_one() {
        let config = CacheConfig {
            per_store_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.per_store_limit_non_zero().get(), 1);
    }
}
