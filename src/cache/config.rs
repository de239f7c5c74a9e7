//! Cache configuration.
//!
//! Controls the response cache via the `[cache]` section of `bookshelf.toml`.

use std::time::Duration;

const DEFAULT_PRODUCER_TIMEOUT_MS: u64 = 5000;

/// Runtime configuration for [`TagCache`](super::TagCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Store computed payloads. When false every read runs its producer.
    pub enabled: bool,
    /// Upper bound on a single producer run.
    pub producer_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            producer_timeout: Duration::from_millis(DEFAULT_PRODUCER_TIMEOUT_MS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            producer_timeout: Duration::from_millis(settings.producer_timeout_ms.get()),
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}
