//! Block statistics
//!
//! A monthly blocked-request counter plus per-website counts. The month key
//! is `"<year>-<zero based month>"`, the format the extension has always
//! stored, so existing state keeps working.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::storage::{keys, load_value, save_value, KeyValueStore, StorageError};
use crate::url::extract_host;

/// Persisted statistics object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStats {
    #[serde(default)]
    pub monthly: u64,
    #[serde(default)]
    pub last_reset: Option<String>,
    #[serde(default)]
    pub websites: BTreeMap<String, u64>,
}

impl BlockStats {
    pub fn new_for<D: Datelike>(now: &D) -> Self {
        Self {
            monthly: 0,
            last_reset: Some(month_key(now)),
            websites: BTreeMap::new(),
        }
    }

    /// Blocked count for one website, zero when unknown.
    pub fn site_count(&self, domain: &str) -> u64 {
        self.websites.get(domain).copied().unwrap_or(0)
    }

    /// Websites by descending count, ties by name.
    pub fn top_sites(&self, n: usize) -> Vec<(&str, u64)> {
        let mut sites: Vec<(&str, u64)> = self
            .websites
            .iter()
            .map(|(domain, count)| (domain.as_str(), *count))
            .collect();
        sites.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        sites.truncate(n);
        sites
    }

    fn is_current<D: Datelike>(&self, now: &D) -> bool {
        self.last_reset.as_deref() == Some(month_key(now).as_str())
    }

    /// Start a new month: counters and websites are cleared.
    fn roll_over<D: Datelike>(&mut self, now: &D) {
        self.monthly = 0;
        self.websites.clear();
        self.last_reset = Some(month_key(now));
    }
}

/// Month key for a date, `"2026-9"` for October 2026.
pub fn month_key<D: Datelike>(now: &D) -> String {
    format!("{}-{}", now.year(), now.month0())
}

/// Domain to attribute a block to: the tab's host, falling back to the
/// request's host.
pub fn blocked_domain(tab_url: Option<&str>, request_url: Option<&str>) -> Option<String> {
    tab_url
        .and_then(extract_host)
        .filter(|host| !host.is_empty())
        .or_else(|| request_url.and_then(extract_host).filter(|host| !host.is_empty()))
        .map(|host| host.to_ascii_lowercase())
}

// =============================================================================
// StatsTracker
// =============================================================================

/// Statistics bound to their persistence.
pub struct StatsTracker<S: KeyValueStore + ?Sized> {
    storage: Arc<S>,
}

impl<S: KeyValueStore + ?Sized> StatsTracker<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    async fn load(&self) -> Result<Option<BlockStats>, StorageError> {
        load_value(&*self.storage, keys::STATS).await
    }

    async fn save(&self, stats: &BlockStats) -> Result<(), StorageError> {
        save_value(&*self.storage, keys::STATS, stats).await
    }

    /// Whether blocking (and therefore counting) is switched on.
    pub async fn blocking_enabled(&self) -> Result<bool, StorageError> {
        Ok(load_value(&*self.storage, keys::AD_BLOCKER_ENABLED)
            .await?
            .unwrap_or(true))
    }

    pub async fn set_blocking_enabled(&self, enabled: bool) -> Result<(), StorageError> {
        save_value(&*self.storage, keys::AD_BLOCKER_ENABLED, &enabled).await
    }

    /// Create the statistics object on first run.
    pub async fn ensure_initialized<D: Datelike>(&self, now: &D) -> Result<BlockStats, StorageError> {
        match self.load().await? {
            Some(stats) => Ok(stats),
            None => {
                let stats = BlockStats::new_for(now);
                self.save(&stats).await?;
                Ok(stats)
            }
        }
    }

    /// Count `count` blocked requests (at least one), attributed to `domain`
    /// when known. Returns `None` without touching anything while blocking
    /// is disabled.
    pub async fn record_blocked<D: Datelike>(
        &self,
        domain: Option<&str>,
        count: u64,
        now: &D,
    ) -> Result<Option<BlockStats>, StorageError> {
        if !self.blocking_enabled().await? {
            return Ok(None);
        }

        let count = count.max(1);
        let mut stats = self.load().await?.unwrap_or_default();
        if !stats.is_current(now) {
            stats.roll_over(now);
        }

        stats.monthly = stats.monthly.saturating_add(count);
        match domain.filter(|d| !d.is_empty()) {
            Some(domain) => {
                let site = stats.websites.entry(domain.to_string()).or_insert(0);
                *site = site.saturating_add(count);
            }
            None => log::debug!("Blocked request counted without domain"),
        }

        self.save(&stats).await?;
        Ok(Some(stats))
    }

    /// Make a website show up with a zero count once it has been visited.
    /// A stale month is rolled over first, as when recording a block.
    pub async fn register_site<D: Datelike>(
        &self,
        domain: &str,
        now: &D,
    ) -> Result<(), StorageError> {
        let mut stats = self.load().await?.unwrap_or_default();
        if !stats.is_current(now) {
            stats.roll_over(now);
        } else if stats.websites.contains_key(domain) {
            return Ok(());
        }
        stats.websites.insert(domain.to_string(), 0);
        self.save(&stats).await
    }

    /// Current statistics. A stale month resets the monthly counter (and is
    /// persisted); per-website counts are left for the next recorded block.
    pub async fn current<D: Datelike>(&self, now: &D) -> Result<BlockStats, StorageError> {
        let mut stats = self.load().await?.unwrap_or_default();
        if !stats.is_current(now) {
            stats.monthly = 0;
            stats.last_reset = Some(month_key(now));
            self.save(&stats).await?;
        }
        Ok(stats)
    }
}
