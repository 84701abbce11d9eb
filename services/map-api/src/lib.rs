//! SOM map viewer API service library.
//!
//! This module exposes the internal modules for testing purposes.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod rendering;
pub mod state;

use axum::{extract::Extension, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// Build the HTTP router.
pub fn router(state: Arc<AppState>, prometheus_handle: PrometheusHandle) -> Router {
    Router::new()
        // Map images
        .route("/map/image", get(handlers::image_handler))
        .route("/map/imagemap", get(handlers::imagemap_handler))
        .route("/map/base", get(handlers::base_handler))
        .route("/map/section", get(handlers::section_handler))
        .route("/map/section/neighbors", get(handlers::neighbors_handler))
        // API endpoints
        .route("/api/visualizations", get(handlers::visualizations_handler))
        .route("/api/cache/stats", get(handlers::cache_stats_handler))
        .route("/api/metrics", get(handlers::api_metrics_handler))
        // Health check and metrics
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        // Layer extensions
        .layer(Extension(state))
        .layer(Extension(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
