//! Cache configuration.
//!
//! Controls entry lifetime and freshness. Values come from the `[cache]`
//! section of `lexquery.toml` (see `crate::config`).

use std::time::Duration;

const DEFAULT_GRACE_PERIOD_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long an entry with no subscribers is kept before eviction.
    pub grace_period: Duration,
    /// Cached values older than this trigger a background refresh when
    /// served. `None` serves them as long as they are not stale.
    pub refresh_after: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(DEFAULT_GRACE_PERIOD_MS),
            refresh_after: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            grace_period: settings.grace_period,
            refresh_after: settings.refresh_after,
        }
    }
}

impl CacheConfig {
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_refresh_after(mut self, refresh_after: Duration) -> Self {
        self.refresh_after = Some(refresh_after);
        self
    }

    /// Whether a value fetched `age` ago should be refreshed in the background.
    pub fn needs_refresh(&self, age: Duration) -> bool {
        self.refresh_after.is_some_and(|limit| age >= limit)
    }
}
