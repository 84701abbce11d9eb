//! Application state and shared resources.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::ViewerConfig;
use crate::metrics::MetricsCollector;
use crate::rendering::MapRenderer;

/// Shared application state.
pub struct AppState {
    pub config: ViewerConfig,
    pub renderer: MapRenderer,
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    /// Load the grid, palettes and caches described by `config`.
    pub fn new(config: ViewerConfig) -> Result<Self> {
        let renderer = MapRenderer::from_config(&config)?;
        info!(
            image_dir = ?config.image_dir,
            base_capacity = config.base_capacity,
            view_capacity = config.view_capacity,
            section_capacity = config.section_capacity,
            "Map renderer ready"
        );
        Ok(Self::with_renderer(config, renderer))
    }

    pub fn with_renderer(config: ViewerConfig, renderer: MapRenderer) -> Self {
        Self {
            config,
            renderer,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }
}
