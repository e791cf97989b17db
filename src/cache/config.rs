//! Cache configuration.
//!
//! Controls store capacity, age-based staleness and refetch behaviour via `atelier.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_MAX_ENTRIES: usize = 512;
const DEFAULT_PENDING_TOGGLE_TIMEOUT_SECS: u64 = 30;

/// Cache configuration from `atelier.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries kept in the store before idle ones are evicted.
    pub max_entries: usize,
    /// Age after which a fresh entry is served as stale. `None` keeps entries
    /// fresh until they are invalidated.
    pub stale_after: Option<Duration>,
    /// Refetch invalidated keys that are currently watched.
    pub refetch_on_invalidate: bool,
    /// Age after which a pending toggle may be treated as failed.
    pub pending_toggle_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            stale_after: None,
            refetch_on_invalidate: true,
            pending_toggle_timeout: Duration::from_secs(DEFAULT_PENDING_TOGGLE_TIMEOUT_SECS),
        }
    }
}

impl From<&crate::config::Settings> for CacheConfig {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            max_entries: settings.cache.max_entries.get(),
            stale_after: settings.cache.stale_after,
            refetch_on_invalidate: settings.cache.refetch_on_invalidate,
            pending_toggle_timeout: settings.toggle.pending_timeout,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 512);
        assert!(config.stale_after.is_none());
        assert!(config.refetch_on_invalidate);
        assert_eq!(config.pending_toggle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
    }
}
