//! HTTP request handlers.

pub mod api;
pub mod common;
pub mod map;
pub mod metrics;

pub use api::{api_metrics_handler, cache_stats_handler, visualizations_handler};
pub use map::{base_handler, image_handler, imagemap_handler, neighbors_handler, section_handler};
pub use metrics::{health_handler, metrics_handler};
