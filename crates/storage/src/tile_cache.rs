//! In-memory LRU tiers with single-flight rendering and disk write-through.
//!
//! A tier keeps finished entries in an LRU and unfinished ones in a separate
//! in-flight map, so the LRU bound never drops a render that callers are
//! still waiting on. The first caller for a missing key starts one attempt
//! (disk load or render); concurrent callers for the same key wait on that
//! attempt and all receive its outcome, success or error. A failed attempt is
//! dropped from the in-flight map, so the next caller retries.
//!
//! ## Statistics
//!
//! Per tier, all atomic:
//! - `hits`: served from memory (including waiters on an in-flight render)
//! - `misses`: had to load from disk or render
//! - `renders` / `render_failures`
//! - `disk_loads`: restored from the on-disk copy
//! - `persist_failures`: background writes that failed
//! - `evictions`: finished entries dropped by the LRU bound

use bytes::Bytes;
use lru::LruCache;
use map_common::{Bitmap, MapError, MapResult, Neighbor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::cache_key::{CacheKey, Tier};
use crate::disk_cache::DiskCache;

/// Metadata stored next to a cached image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub width: u32,
    pub height: u32,
    /// HTML `<map>` fragment aligned with the image
    pub image_map: Option<String>,
    /// Nearest-neighbour listing of a section view
    pub neighbors: Option<Vec<Neighbor>>,
}

impl EntryMetadata {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            image_map: None,
            neighbors: None,
        }
    }

    pub fn with_image_map(mut self, html: String) -> Self {
        self.image_map = Some(html);
        self
    }

    pub fn with_neighbors(mut self, neighbors: Vec<Neighbor>) -> Self {
        self.neighbors = Some(neighbors);
        self
    }
}

/// A cached image. Immutable once created.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub bitmap: Arc<Bitmap>,
    pub png: Bytes,
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    pub fn new(
        key: impl Into<String>,
        bitmap: Bitmap,
        png: impl Into<Bytes>,
        metadata: EntryMetadata,
    ) -> Self {
        Self {
            key: key.into(),
            bitmap: Arc::new(bitmap),
            png: png.into(),
            metadata,
        }
    }
}

/// Counters for one tier.
#[derive(Debug, Default)]
pub struct TierStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub renders: AtomicU64,
    pub render_failures: AtomicU64,
    pub disk_loads: AtomicU64,
    pub persist_failures: AtomicU64,
    pub evictions: AtomicU64,
}

/// Point-in-time view of a tier's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStatsSnapshot {
    pub tier: Tier,
    pub hits: u64,
    pub misses: u64,
    pub renders: u64,
    pub render_failures: u64,
    pub disk_loads: u64,
    pub persist_failures: u64,
    pub evictions: u64,
    pub entry_count: usize,
    pub capacity: usize,
}

/// One load-or-render attempt, shared by every caller waiting on it.
type Attempt = Arc<OnceCell<MapResult<Arc<CacheEntry>>>>;

struct Slots {
    ready: LruCache<String, Arc<CacheEntry>>,
    in_flight: HashMap<String, Attempt>,
}

enum Lookup {
    Ready(Arc<CacheEntry>),
    Pending(Attempt),
}

/// One bounded cache tier.
pub struct TierCache {
    tier: Tier,
    capacity: NonZeroUsize,
    slots: Mutex<Slots>,
    disk: Option<DiskCache>,
    stats: Arc<TierStats>,
}

impl TierCache {
    /// Create a tier holding at most `capacity` finished entries in memory.
    pub fn new(tier: Tier, capacity: usize, disk: Option<DiskCache>) -> MapResult<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            MapError::configuration(format!("{} cache capacity must be at least 1", tier))
        })?;

        Ok(Self {
            tier,
            capacity,
            slots: Mutex::new(Slots {
                ready: LruCache::new(capacity),
                in_flight: HashMap::new(),
            }),
            disk,
            stats: Arc::new(TierStats::default()),
        })
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn stats(&self) -> &TierStats {
        &self.stats
    }

    pub fn disk(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }

    /// Return the entry for `key`, loading or rendering it at most once.
    ///
    /// `render` only runs when the entry is neither in memory nor on disk
    /// and no attempt for `key` is in flight. A render error is returned to
    /// every caller waiting on that attempt and nothing is cached.
    pub async fn get_or_render<F, Fut>(&self, key: &CacheKey, render: F) -> MapResult<Arc<CacheEntry>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MapResult<CacheEntry>>,
    {
        let attempt = match self.lookup(key).await {
            Lookup::Ready(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry);
            }
            Lookup::Pending(attempt) => attempt,
        };

        let initialized_here = AtomicBool::new(false);
        let flag = &initialized_here;
        let outcome = attempt
            .get_or_init(|| async move {
                flag.store(true, Ordering::Relaxed);
                let outcome = self.load_or_render(key, render).await;
                self.settle(key, &outcome).await;
                outcome
            })
            .await;

        if outcome.is_ok() && !initialized_here.load(Ordering::Relaxed) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        }
        outcome.clone()
    }

    /// Finished entry currently held in memory, without touching LRU order or stats.
    pub async fn peek(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let slots = self.slots.lock().await;
        slots.ready.peek(key.as_str()).cloned()
    }

    /// Number of finished entries in memory.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.ready.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of keys with a load or render in progress.
    pub async fn in_flight(&self) -> usize {
        self.slots.lock().await.in_flight.len()
    }

    pub async fn snapshot(&self) -> TierStatsSnapshot {
        let entry_count = self.len().await;
        let s = &self.stats;
        TierStatsSnapshot {
            tier: self.tier,
            hits: s.hits.load(Ordering::Relaxed),
            misses: s.misses.load(Ordering::Relaxed),
            renders: s.renders.load(Ordering::Relaxed),
            render_failures: s.render_failures.load(Ordering::Relaxed),
            disk_loads: s.disk_loads.load(Ordering::Relaxed),
            persist_failures: s.persist_failures.load(Ordering::Relaxed),
            evictions: s.evictions.load(Ordering::Relaxed),
            entry_count,
            capacity: self.capacity.get(),
        }
    }

    /// The finished entry for `key`, or the attempt to wait on (created if needed).
    async fn lookup(&self, key: &CacheKey) -> Lookup {
        let mut slots = self.slots.lock().await;
        if let Some(entry) = slots.ready.get(key.as_str()) {
            return Lookup::Ready(entry.clone());
        }

        let attempt = slots
            .in_flight
            .entry(key.as_str().to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        Lookup::Pending(attempt)
    }

    /// Retire the in-flight attempt for `key`; keep its entry if it succeeded.
    async fn settle(&self, key: &CacheKey, outcome: &MapResult<Arc<CacheEntry>>) {
        let mut slots = self.slots.lock().await;
        slots.in_flight.remove(key.as_str());

        if let Ok(entry) = outcome {
            if let Some((evicted, _)) = slots.ready.push(key.as_str().to_string(), entry.clone()) {
                if evicted != key.as_str() {
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(tier = %self.tier, key = %evicted, "Evicted cache entry");
                }
            }
        }
    }

    async fn load_or_render<F, Fut>(&self, key: &CacheKey, render: F) -> MapResult<Arc<CacheEntry>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MapResult<CacheEntry>>,
    {
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.load_from_disk(key).await {
            self.stats.disk_loads.fetch_add(1, Ordering::Relaxed);
            return Ok(entry);
        }

        let entry = match render().await {
            Ok(entry) => Arc::new(entry),
            Err(err) => {
                self.stats.render_failures.fetch_add(1, Ordering::Relaxed);
                warn!(tier = %self.tier, key = %key.as_str(), error = %err, "Render failed");
                return Err(err);
            }
        };
        self.stats.renders.fetch_add(1, Ordering::Relaxed);

        if let Some(disk) = &self.disk {
            self.persist(disk.clone(), key.clone(), entry.clone());
        }
        Ok(entry)
    }

    async fn load_from_disk(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let disk = self.disk.clone()?;
        let k = key.clone();

        match tokio::task::spawn_blocking(move || disk.load(&k)).await {
            Ok(Ok(Some(entry))) => {
                debug!(tier = %self.tier, key = %key.as_str(), "Restored entry from disk");
                Some(Arc::new(entry))
            }
            Ok(Ok(None)) => None,
            Ok(Err(err)) => {
                warn!(tier = %self.tier, key = %key.as_str(), error = %err, "Ignoring unreadable persisted image");
                None
            }
            Err(err) => {
                warn!(tier = %self.tier, error = %err, "Disk load task failed");
                None
            }
        }
    }

    /// Write the entry to disk in the background.
    fn persist(&self, disk: DiskCache, key: CacheKey, entry: Arc<CacheEntry>) {
        let stats = self.stats.clone();
        let tier = self.tier;
        tokio::task::spawn_blocking(move || {
            if let Err(err) = disk.store(&key, &entry) {
                stats.persist_failures.fetch_add(1, Ordering::Relaxed);
                warn!(tier = %tier, key = %key.as_str(), error = %err, "Failed to persist image");
            }
        });
    }
}

/// Capacities and persistence location for the three tiers.
#[derive(Debug, Clone)]
pub struct TileCacheConfig {
    /// Root of the on-disk copy; `None` keeps everything in memory
    pub image_dir: Option<PathBuf>,
    pub base_capacity: usize,
    pub interactive_capacity: usize,
    pub section_capacity: usize,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            image_dir: None,
            base_capacity: 32,
            interactive_capacity: 512,
            section_capacity: 256,
        }
    }
}

/// The base, interactive and section tiers.
pub struct TileCacheService {
    base: TierCache,
    interactive: TierCache,
    section: TierCache,
}

impl TileCacheService {
    pub fn new(config: &TileCacheConfig) -> MapResult<Self> {
        let disk = |tier| -> MapResult<Option<DiskCache>> {
            config
                .image_dir
                .as_deref()
                .map(|root| DiskCache::new(root, tier))
                .transpose()
        };

        Ok(Self {
            base: TierCache::new(Tier::Base, config.base_capacity, disk(Tier::Base)?)?,
            interactive: TierCache::new(
                Tier::Interactive,
                config.interactive_capacity,
                disk(Tier::Interactive)?,
            )?,
            section: TierCache::new(Tier::Section, config.section_capacity, disk(Tier::Section)?)?,
        })
    }

    pub fn tier(&self, tier: Tier) -> &TierCache {
        match tier {
            Tier::Base => &self.base,
            Tier::Interactive => &self.interactive,
            Tier::Section => &self.section,
        }
    }

    /// Get or render in the tier named by the key.
    pub async fn get_or_render<F, Fut>(&self, key: &CacheKey, render: F) -> MapResult<Arc<CacheEntry>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MapResult<CacheEntry>>,
    {
        self.tier(key.tier()).get_or_render(key, render).await
    }

    pub async fn stats(&self) -> Vec<TierStatsSnapshot> {
        let mut stats = Vec::with_capacity(Tier::ALL.len());
        for tier in Tier::ALL {
            stats.push(self.tier(tier).snapshot().await);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use map_common::{DrawFlags, RenderParams, ZoomLevel};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn key(vis: &str) -> CacheKey {
        CacheKey::base(&RenderParams::new(vis, "grey", ZoomLevel::default(), DrawFlags::default()))
    }

    fn entry(key: &CacheKey) -> CacheEntry {
        let bitmap = Bitmap::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        CacheEntry::new(key.as_str(), bitmap, Vec::new(), EntryMetadata::new(2, 2))
    }

    #[tokio::test]
    async fn test_hit_after_render() {
        let cache = TierCache::new(Tier::Base, 4, None).unwrap();
        let k = key("hits");
        let renders = AtomicUsize::new(0);

        for _ in 0..3 {
            let got = cache
                .get_or_render(&k, || async {
                    renders.fetch_add(1, Ordering::SeqCst);
                    Ok(entry(&k))
                })
                .await
                .unwrap();
            assert_eq!(got.key, k.as_str());
        }

        assert_eq!(renders.load(Ordering::SeqCst), 1);
        let stats = cache.snapshot().await;
        assert_eq!((stats.hits, stats.misses, stats.renders), (2, 1, 1));
    }

    #[tokio::test]
    async fn test_concurrent_requests_render_once() {
        let cache = Arc::new(TierCache::new(Tier::Base, 4, None).unwrap());
        let renders = Arc::new(AtomicUsize::new(0));
        let k = key("hits");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let renders = renders.clone();
                let k = k.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_render(&k, || async {
                            renders.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(entry(&k))
                        })
                        .await
                })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap().unwrap());
        }

        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|e| Arc::ptr_eq(e, &results[0])));
    }

    #[tokio::test]
    async fn test_failed_render_is_not_cached() {
        let cache = TierCache::new(Tier::Base, 4, None).unwrap();
        let k = key("hits");

        let err = cache
            .get_or_render(&k, || async { Err(MapError::render_failure("boom")) })
            .await
            .unwrap_err();
        assert!(matches!(err, MapError::RenderFailure(_)));
        assert!(cache.peek(&k).await.is_none());

        let ok = cache.get_or_render(&k, || async { Ok(entry(&k)) }).await;
        assert!(ok.is_ok());
        assert_eq!(cache.snapshot().await.render_failures, 1);
        assert_eq!(cache.snapshot().await.renders, 1);
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_attempt() {
        let cache = Arc::new(TierCache::new(Tier::Base, 4, None).unwrap());
        let attempts = Arc::new(AtomicUsize::new(0));
        let k = key("hits");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let attempts = attempts.clone();
                let k = k.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_render(&k, || async {
                            attempts.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(30)).await;
                            Err(MapError::render_failure("boom"))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(matches!(err, MapError::RenderFailure(_)));
        }

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty().await);
        assert_eq!(cache.in_flight().await, 0);
        assert_eq!(cache.snapshot().await.render_failures, 1);

        // The failed attempt is gone, so the next caller tries again
        let retried = cache.get_or_render(&k, || async { Ok(entry(&k)) }).await;
        assert!(retried.is_ok());
    }

    #[tokio::test]
    async fn test_in_flight_render_survives_lru_pressure() {
        let cache = Arc::new(TierCache::new(Tier::Base, 1, None).unwrap());
        let renders_of_a = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for vis in ["a", "b", "a"] {
            let cache = cache.clone();
            let renders_of_a = renders_of_a.clone();
            tasks.push(tokio::spawn(async move {
                let k = key(vis);
                cache
                    .get_or_render(&k, || async {
                        if vis == "a" {
                            renders_of_a.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(entry(&k))
                    })
                    .await
            }));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let results = join_entries(tasks).await;
        assert_eq!(renders_of_a.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&results[0], &results[2]));
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.in_flight().await, 0);
    }

    async fn join_entries(
        tasks: Vec<tokio::task::JoinHandle<MapResult<Arc<CacheEntry>>>>,
    ) -> Vec<Arc<CacheEntry>> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(task.await.unwrap().unwrap());
        }
        results
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = TierCache::new(Tier::Base, 2, None).unwrap();
        for vis in ["a", "b", "c"] {
            let k = key(vis);
            cache.get_or_render(&k, || async { Ok(entry(&k)) }).await.unwrap();
        }

        assert_eq!(cache.len().await, 2);
        assert!(cache.peek(&key("a")).await.is_none());
        assert!(cache.peek(&key("c")).await.is_some());
        assert_eq!(cache.snapshot().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_service_routes_by_tier() {
        let service = TileCacheService::new(&TileCacheConfig::default()).unwrap();
        let k = key("hits");
        service.get_or_render(&k, || async { Ok(entry(&k)) }).await.unwrap();

        let stats = service.stats().await;
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].tier, Tier::Base);
        assert_eq!(stats[0].entry_count, 1);
        assert_eq!(stats[1].entry_count, 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            TierCache::new(Tier::Section, 0, None),
            Err(MapError::ConfigurationError(_))
        ));
    }
}
