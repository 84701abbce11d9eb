//! JSON API endpoints.

use axum::{extract::Extension, response::IntoResponse, Json};
use map_common::ZoomLevel;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct NamedEntry {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct VisualizationsResponse {
    pub visualizations: Vec<NamedEntry>,
    pub palettes: Vec<NamedEntry>,
    pub zoom_levels: Vec<u32>,
    pub default_visualization: String,
    pub default_palette: String,
}

/// GET /api/visualizations - what can be requested
pub async fn visualizations_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let registry = state.renderer.registry();

    let visualizations = registry
        .visualization_names()
        .into_iter()
        .map(|name| {
            let description = registry
                .visualization(&name)
                .map(|v| v.description().to_string())
                .unwrap_or_default();
            NamedEntry { name, description }
        })
        .collect();

    let palettes = registry
        .palette_names()
        .into_iter()
        .map(|name| {
            let description = registry
                .palette(&name)
                .ok()
                .and_then(|p| p.description.clone())
                .unwrap_or_default();
            NamedEntry { name, description }
        })
        .collect();

    Json(VisualizationsResponse {
        visualizations,
        palettes,
        zoom_levels: (ZoomLevel::MIN..=ZoomLevel::MAX).collect(),
        default_visualization: state.config.default_visualization.clone(),
        default_palette: state.config.default_palette.clone(),
    })
}

/// GET /api/cache/stats - per-tier cache counters
pub async fn cache_stats_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.renderer.cache().stats().await)
}

/// GET /api/metrics - request counters and uptime
pub async fn api_metrics_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
