//! End-to-end tests of the rendering pipeline and the HTTP surface.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use futures::future::join_all;
use map_api::config::ViewerConfig;
use map_api::rendering::{MapRenderer, RenderSettings};
use map_api::state::AppState;
use map_common::{DrawFlags, MapError, RenderParams, SectionRequest, ViewRequest, Viewport, ZoomLevel};
use metrics_exporter_prometheus::PrometheusBuilder;
use renderer::{Decorator, PaletteConfig, VisualizationRegistry};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use storage::{CacheKey, Tier, TileCacheConfig};
use test_utils::{sample_grid, write_sample_grid, CountingVisualization, CELL_SIZE};
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;
use viewport::CellGeometry;

fn renderer_with(vis: Arc<CountingVisualization>) -> MapRenderer {
    let mut registry = VisualizationRegistry::with_builtins(PaletteConfig::builtin());
    registry.register(vis).unwrap();

    MapRenderer::new(
        sample_grid(),
        CellGeometry::new(CELL_SIZE, CELL_SIZE).unwrap(),
        registry,
        Decorator::new(None),
        &TileCacheConfig::default(),
        RenderSettings::default(),
    )
    .unwrap()
}

fn params(vis: &str, zoom: u32) -> RenderParams {
    RenderParams::new(vis, "grey", ZoomLevel::new(zoom).unwrap(), DrawFlags::default())
}

fn view(vis: &str, zoom: u32) -> ViewRequest {
    let params = params(vis, zoom);
    let zoom = params.zoom;
    ViewRequest::new(params, Viewport::new(zoom, 0, 0))
}

async fn tier_stats(renderer: &MapRenderer, tier: Tier) -> storage::TierStatsSnapshot {
    renderer.cache().tier(tier).snapshot().await
}

#[tokio::test]
async fn test_full_view_at_zoom_one() {
    let vis = CountingVisualization::new("count").shared();
    let renderer = renderer_with(vis.clone());

    let entry = renderer.view(&view("count", 1)).await.unwrap();
    assert_eq!(entry.bitmap.dimensions(), (160, 161));
    assert_eq!((entry.metadata.width, entry.metadata.height), (160, 161));

    let html = entry.metadata.image_map.as_deref().unwrap();
    assert_eq!(html.matches("<area ").count(), 100);
    assert!(html.contains("coords=\"0,0,16,16\""));
    assert!(html.contains("coords=\"144,144,160,160\""));

    let png = image::load_from_memory(&entry.png).unwrap();
    assert_eq!((png.width(), png.height()), (160, 161));
}

#[tokio::test]
async fn test_different_ids_share_base_tile() {
    let vis = CountingVisualization::new("count").shared();
    let renderer = renderer_with(vis.clone());

    let mut first = view("count", 2);
    first.marked_items = vec!["doc-1".into()];
    let mut second = view("count", 2);
    second.marked_items = vec!["doc-3".into(), "doc-4".into()];

    let a = renderer.view(&first).await.unwrap();
    let b = renderer.view(&second).await.unwrap();

    assert_ne!(a.key, b.key);
    assert_ne!(
        CacheKey::interactive(&first, 160, 161),
        CacheKey::interactive(&second, 160, 161)
    );
    assert_eq!(vis.render_count(), 1);

    let base = tier_stats(&renderer, Tier::Base).await;
    assert_eq!(base.renders, 1);
    assert_eq!(base.hits, 1);
    assert_eq!(tier_stats(&renderer, Tier::Interactive).await.renders, 2);
}

#[tokio::test]
async fn test_concurrent_requests_render_once() {
    let vis = CountingVisualization::new("count")
        .with_delay(Duration::from_millis(50))
        .shared();
    let renderer = renderer_with(vis.clone());
    let request = view("count", 3);

    let results = join_all((0..8).map(|_| renderer.view(&request))).await;
    let keys: Vec<String> = results
        .into_iter()
        .map(|r| r.unwrap().key.clone())
        .collect();

    assert!(keys.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(vis.render_count(), 1);
    assert_eq!(tier_stats(&renderer, Tier::Interactive).await.renders, 1);
}

#[tokio::test]
async fn test_failed_render_is_retried() {
    let vis = CountingVisualization::new("count").shared();
    let renderer = renderer_with(vis.clone());
    let request = view("count", 1);

    vis.set_failing(true);
    let err = assert_err!(renderer.view(&request).await);
    assert!(matches!(err, MapError::RenderFailure(_)));
    assert_eq!(err.http_status_code(), 500);
    let base_key = CacheKey::base(&request.render);
    assert!(renderer.cache().tier(Tier::Base).peek(&base_key).await.is_none());

    vis.set_failing(false);
    assert_ok!(renderer.view(&request).await);
    assert_eq!(vis.render_count(), 2);
}

#[tokio::test]
async fn test_unknown_names_do_not_touch_the_cache() {
    let vis = CountingVisualization::new("count").shared();
    let renderer = renderer_with(vis);

    let err = renderer.view(&view("nope", 1)).await.unwrap_err();
    assert!(matches!(err, MapError::UnknownVisualization(_)));
    assert_eq!(err.http_status_code(), 404);

    let mut request = view("count", 1);
    request.render.palette = "ultraviolet".into();
    let err = renderer.view(&request).await.unwrap_err();
    assert!(matches!(err, MapError::UnknownPalette(_)));

    let base = tier_stats(&renderer, Tier::Base).await;
    assert_eq!(base.hits + base.misses, 0);
}

#[tokio::test]
async fn test_section_and_neighbors() {
    let vis = CountingVisualization::new("count").shared();
    let renderer = renderer_with(vis.clone());
    let request = SectionRequest {
        render: params("count", 1),
        center: (5, 5),
    };

    let entry = renderer.section(&request).await.unwrap();
    assert_eq!(entry.bitmap.dimensions(), (80, 80));
    let html = entry.metadata.image_map.as_deref().unwrap();
    assert_eq!(html.matches("<area ").count(), 25);

    let neighbors = renderer.neighbors(&request).await.unwrap();
    let cells: Vec<(usize, usize)> = neighbors.iter().map(|n| (n.x, n.y)).collect();
    assert_eq!(cells, vec![(5, 5), (4, 5)]);
    assert_eq!(neighbors[1].items, vec!["doc-3"]);

    // Second call is served from the section tier
    assert_eq!(tier_stats(&renderer, Tier::Section).await.renders, 1);
    assert_eq!(vis.render_count(), 1);
}

#[tokio::test]
async fn test_section_corner_is_clamped() {
    let vis = CountingVisualization::new("count").shared();
    let renderer = renderer_with(vis);
    let request = SectionRequest {
        render: params("count", 1),
        center: (0, 0),
    };

    let entry = renderer.section(&request).await.unwrap();
    assert_eq!(entry.bitmap.dimensions(), (48, 48));
    let neighbors = renderer.neighbors(&request).await.unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].items, vec!["doc-1", "doc-2"]);
}

#[tokio::test]
async fn test_section_outside_grid_is_rejected() {
    let vis = CountingVisualization::new("count").shared();
    let renderer = renderer_with(vis.clone());
    let request = SectionRequest {
        render: params("count", 1),
        center: (10, 3),
    };

    let err = renderer.section(&request).await.unwrap_err();
    assert_eq!(err.http_status_code(), 400);
    assert_eq!(vis.render_count(), 0);
}

#[tokio::test]
async fn test_renderer_from_config_restores_images() {
    let dir = tempfile::tempdir().unwrap();
    let config = ViewerConfig {
        grid_path: write_sample_grid(dir.path()),
        image_dir: Some(dir.path().join("images")),
        ..Default::default()
    };
    let params = params("hits", 2);
    let key = CacheKey::base(&params);

    let first = MapRenderer::from_config(&config).unwrap();
    let rendered = first.base_tile(&params).await.unwrap();
    wait_for(&dir.path().join("images/base").join(format!("{}.png", key.file_stem()))).await;

    let second = MapRenderer::from_config(&config).unwrap();
    let restored = second.base_tile(&params).await.unwrap();

    assert_eq!(restored.bitmap.dimensions(), rendered.bitmap.dimensions());
    assert_eq!(restored.metadata, rendered.metadata);
    let stats = tier_stats(&second, Tier::Base).await;
    assert_eq!((stats.renders, stats.disk_loads), (0, 1));
}

async fn wait_for(path: &Path) {
    for _ in 0..200 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} was never written", path.display());
}

// ============================================================================
// HTTP
// ============================================================================

fn app(vis: Arc<CountingVisualization>) -> axum::Router {
    let config = ViewerConfig {
        default_visualization: "count".into(),
        ..Default::default()
    };
    let state = Arc::new(AppState::with_renderer(config, renderer_with(vis)));
    let handle = PrometheusBuilder::new().build_recorder().handle();
    map_api::router(state, handle)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body.to_vec())
}

#[tokio::test]
async fn test_http_image_and_imagemap() {
    let vis = CountingVisualization::new("count").shared();
    let app = app(vis.clone());

    let (status, content_type, body) = get(app.clone(), "/map/image?zoom=2&ids=doc-4").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
    assert!(image::load_from_memory(&body).is_ok());

    let (status, content_type, body) = get(app, "/map/imagemap?zoom=2&ids=doc-4").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/html"));
    let html = String::from_utf8(body).unwrap();
    assert!(html.starts_with("<map name=\"som-map\">"));
    assert!(html.contains("vis=count"));

    // Same view, so the image map came from the cached entry
    assert_eq!(vis.render_count(), 1);
}

#[tokio::test]
async fn test_http_errors() {
    let vis = CountingVisualization::new("count").shared();
    let app = app(vis.clone());

    let (status, _, _) = get(app.clone(), "/map/image?vis=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(app.clone(), "/map/image?zoom=9").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(app.clone(), "/map/section?x=10&y=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    vis.set_failing(true);
    let (status, _, body) = get(app, "/map/base").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, b"missing image");
}

#[tokio::test]
async fn test_http_neighbors_and_health() {
    let vis = CountingVisualization::new("count").shared();
    let app = app(vis);

    let (status, _, body) = get(app.clone(), "/map/section/neighbors?x=5&y=5").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json[0]["x"], 5);
    assert_eq!(json[0]["distance"], 0.0);

    let (status, _, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let (status, _, body) = get(app, "/api/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 3);
}
