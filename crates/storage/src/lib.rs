//! Image caches for the map viewer.
//!
//! Provides:
//! - Deterministic cache keys per tier (base, interactive, section)
//! - Bounded in-memory LRU tiers with single-flight rendering
//! - Write-through PNG + JSON sidecar persistence

pub mod cache_key;
pub mod disk_cache;
pub mod tile_cache;

pub use cache_key::{CacheKey, Tier};
pub use disk_cache::DiskCache;
pub use tile_cache::{
    CacheEntry, EntryMetadata, TierCache, TierStats, TierStatsSnapshot, TileCacheConfig,
    TileCacheService,
};
