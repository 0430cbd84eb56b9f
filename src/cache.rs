//! Result cache for validated adaptations.
//!
//! Maps a request [`Fingerprint`] to a shared [`AdaptedContent`]. Only
//! successful, validated results are ever stored; failures are never cached,
//! so a later identical request always retries from scratch.
//!
//! The cache itself is not synchronized. The pipeline owns it together with
//! the pending-call table behind one mutex, so a lookup followed by an insert
//! happens in a single critical section.
//!
//! Timestamps use [`tokio::time::Instant`] so expiry follows tokio's clock,
//! which tests can pause and advance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::content::AdaptedContent;
use crate::fingerprint::Fingerprint;

/// Default time-to-live of an entry (10 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Default capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 512;

/// Configuration for the result cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_entries: usize,
    /// Time-to-live for entries stored without an explicit TTL.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
        }
    }
}

impl CacheConfig {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A cached adaptation.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub content: Arc<AdaptedContent>,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Total cache hits.
    pub hits: u64,
    /// Total cache misses (including expired entries).
    pub misses: u64,
    /// Total entries added.
    pub insertions: u64,
    /// Entries removed by expiry or capacity pressure.
    pub evictions: u64,
    /// Entries removed by explicit invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total number of lookups.
    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Capacity-bounded TTL cache keyed by fingerprint.
#[derive(Debug)]
pub struct ResultCache {
    entries: HashMap<Fingerprint, CacheEntry>,
    config: CacheConfig,
    stats: CacheStats,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Look up a live entry.
    ///
    /// An expired entry counts as a miss and is removed.
    pub fn get(&mut self, fingerprint: &Fingerprint) -> Option<Arc<AdaptedContent>> {
        let now = Instant::now();
        match self.entries.get(fingerprint) {
            Some(entry) if !entry.is_expired(now) => {
                self.stats.hits += 1;
                Some(Arc::clone(&entry.content))
            }
            Some(_) => {
                self.entries.remove(fingerprint);
                self.stats.evictions += 1;
                self.stats.misses += 1;
                None
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Look up a live entry without touching statistics.
    pub fn peek(&self, fingerprint: &Fingerprint) -> Option<&CacheEntry> {
        self.entries
            .get(fingerprint)
            .filter(|e| !e.is_expired(Instant::now()))
    }

    /// Store content under a fingerprint.
    ///
    /// # Arguments
    ///
    /// * `fingerprint` - Request fingerprint
    /// * `content` - Validated content
    /// * `ttl` - Lifetime of the entry; `None` uses the configured TTL
    pub fn put(
        &mut self,
        fingerprint: Fingerprint,
        content: Arc<AdaptedContent>,
        ttl: Option<Duration>,
    ) {
        if self.config.max_entries == 0 {
            return;
        }

        let now = Instant::now();
        if !self.entries.contains_key(&fingerprint) {
            self.purge_expired();
            while self.entries.len() >= self.config.max_entries {
                self.evict_oldest();
            }
        }

        let ttl = ttl.unwrap_or(self.config.ttl);
        tracing::debug!(
            fingerprint = %fingerprint.short(),
            ttl_secs = ttl.as_secs(),
            "Caching adapted content"
        );
        self.entries.insert(
            fingerprint.clone(),
            CacheEntry {
                fingerprint,
                content,
                created_at: now,
                expires_at: now + ttl,
            },
        );
        self.stats.insertions += 1;
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&mut self, fingerprint: &Fingerprint) -> bool {
        let removed = self.entries.remove(fingerprint).is_some();
        if removed {
            self.stats.invalidations += 1;
        }
        removed
    }

    /// Remove every entry matching the predicate. Returns the number removed.
    pub fn invalidate_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !predicate(entry));
        let removed = before - self.entries.len();
        self.stats.invalidations += removed as u64;
        removed
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - self.entries.len();
        self.stats.evictions += removed as u64;
        removed
    }

    /// Clear all entries. Statistics are preserved.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a live entry exists.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.peek(fingerprint).is_some()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.created_at)
            .map(|(fp, _)| fp.clone());

        if let Some(fp) = oldest {
            self.entries.remove(&fp);
            self.stats.evictions += 1;
            tracing::debug!(fingerprint = %fp.short(), "Evicted oldest cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ComplexityLevel, ContentSection, SectionKind, VisualHints};

    fn content(body: &str) -> Arc<AdaptedContent> {
        Arc::new(AdaptedContent::new(
            vec![ContentSection {
                kind: SectionKind::Overview,
                title: None,
                body: body.to_string(),
            }],
            VisualHints::default(),
            ComplexityLevel::Low,
            Vec::new(),
        ))
    }

    fn fp(seed: u8) -> Fingerprint {
        Fingerprint::from_bytes(&[seed; 32])
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_put_and_stats() {
        let mut cache = ResultCache::default();
        assert!(cache.get(&fp(1)).is_none());

        let stored = content("a");
        cache.put(fp(1), Arc::clone(&stored), None);
        let hit = cache.get(&fp(1)).expect("hit");
        assert!(Arc::ptr_eq(&hit, &stored));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.insertions, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let mut cache = ResultCache::new(CacheConfig::new(8).with_ttl(Duration::from_secs(60)));
        cache.put(fp(1), content("a"), None);
        cache.put(fp(2), content("b"), Some(Duration::from_secs(600)));

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(cache.get(&fp(1)).is_none());
        assert!(cache.get(&fp(2)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let mut cache = ResultCache::new(CacheConfig::new(2));
        cache.put(fp(1), content("a"), None);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.put(fp(2), content("b"), None);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.put(fp(3), content("c"), None);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&fp(1)));
        assert!(cache.contains(&fp(2)));
        assert!(cache.contains(&fp(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_existing_entry_does_not_evict() {
        let mut cache = ResultCache::new(CacheConfig::new(1));
        cache.put(fp(1), content("a"), None);
        cache.put(fp(1), content("b"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation() {
        let mut cache = ResultCache::default();
        cache.put(fp(1), content("keep"), None);
        cache.put(fp(2), content("drop"), None);
        cache.put(fp(3), content("drop"), None);

        assert!(cache.invalidate(&fp(1)));
        assert!(!cache.invalidate(&fp(1)));

        let removed = cache.invalidate_where(|e| e.content.sections()[0].body == "drop");
        assert_eq!(removed, 2);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let mut cache = ResultCache::default();
        cache.put(fp(1), content("a"), Some(Duration::from_secs(1)));
        cache.put(fp(2), content("b"), None);
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_capacity_disables_cache() {
        let mut cache = ResultCache::new(CacheConfig::new(0));
        cache.put(fp(1), content("a"), None);
        assert!(cache.is_empty());
    }
}
