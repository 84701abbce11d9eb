//! Application metrics collection and reporting.

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use storage::{Tier, TierStatsSnapshot};

/// Request kinds served by the map endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Image,
    ImageMap,
    Base,
    Section,
    Neighbors,
}

impl RequestKind {
    fn as_str(self) -> &'static str {
        match self {
            RequestKind::Image => "image",
            RequestKind::ImageMap => "imagemap",
            RequestKind::Base => "base",
            RequestKind::Section => "section",
            RequestKind::Neighbors => "neighbors",
        }
    }
}

/// Metrics collector for the map API.
#[derive(Debug)]
pub struct MetricsCollector {
    pub requests: AtomicU64,
    pub request_errors: AtomicU64,
    start_time: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub request_errors: u64,
    pub uptime_secs: u64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            request_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a map request
    pub fn record_request(&self, kind: RequestKind) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter!("map_requests_total", "kind" => kind.as_str()).increment(1);
    }

    /// Record a request answered with an error status
    pub fn record_request_error(&self, kind: RequestKind, status: u16) {
        self.request_errors.fetch_add(1, Ordering::Relaxed);
        counter!(
            "map_request_errors_total",
            "kind" => kind.as_str(),
            "status" => status.to_string()
        )
        .increment(1);
    }

    /// Publish per-tier cache counters as gauges.
    pub fn record_cache_stats(&self, stats: &[TierStatsSnapshot]) {
        for s in stats {
            let tier = s.tier.as_str();
            gauge!("map_cache_hits_total", "tier" => tier).set(s.hits as f64);
            gauge!("map_cache_misses_total", "tier" => tier).set(s.misses as f64);
            gauge!("map_cache_disk_loads_total", "tier" => tier).set(s.disk_loads as f64);
            gauge!("map_cache_evictions_total", "tier" => tier).set(s.evictions as f64);
            gauge!("map_persist_failures_total", "tier" => tier).set(s.persist_failures as f64);
            gauge!("map_cache_entries", "tier" => tier).set(s.entry_count as f64);
            gauge!("map_cache_capacity", "tier" => tier).set(s.capacity as f64);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            request_errors: self.request_errors.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

/// Record one render of a tier.
pub fn record_render(tier: Tier, duration_ms: f64, success: bool) {
    let tier = tier.as_str();
    histogram!("map_render_duration_ms", "tier" => tier).record(duration_ms);
    if success {
        counter!("map_renders_total", "tier" => tier).increment(1);
    } else {
        counter!("map_render_failures_total", "tier" => tier).increment(1);
    }
}

/// Simple timer for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_without_recorder() {
        let metrics = MetricsCollector::new();
        metrics.record_request(RequestKind::Image);
        metrics.record_request(RequestKind::Section);
        metrics.record_request_error(RequestKind::Section, 400);
        record_render(Tier::Base, 1.5, true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.request_errors, 1);
    }
}
