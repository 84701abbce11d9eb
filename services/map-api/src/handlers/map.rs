//! Map image, image-map and section endpoints.

use axum::{
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    Json,
};
use map_common::MapError;
use std::sync::Arc;
use tracing::{error, instrument, warn};

use super::common::{error_response, html_response, png_response, MapQuery};
use crate::metrics::RequestKind;
use crate::state::AppState;

/// GET /map/image - interactive view PNG
#[instrument(skip(state))]
pub async fn image_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<MapQuery>,
) -> Response {
    state.metrics.record_request(RequestKind::Image);

    let result = async {
        let request = query.view_request(&state.config)?;
        state.renderer.view(&request).await
    }
    .await;

    match result {
        Ok(entry) => png_response(&entry),
        Err(e) => failure(&state, RequestKind::Image, e),
    }
}

/// GET /map/imagemap - `<map>` fragment matching /map/image
#[instrument(skip(state))]
pub async fn imagemap_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<MapQuery>,
) -> Response {
    state.metrics.record_request(RequestKind::ImageMap);

    let result = async {
        let request = query.view_request(&state.config)?;
        state.renderer.image_map(&request).await
    }
    .await;

    match result {
        Ok(html) => html_response(html),
        Err(e) => failure(&state, RequestKind::ImageMap, e),
    }
}

/// GET /map/base - full zoomed image without markers
#[instrument(skip(state))]
pub async fn base_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<MapQuery>,
) -> Response {
    state.metrics.record_request(RequestKind::Base);

    let result = async {
        let params = query.render_params(&state.config)?;
        state.renderer.base_tile(&params).await
    }
    .await;

    match result {
        Ok(entry) => png_response(&entry),
        Err(e) => failure(&state, RequestKind::Base, e),
    }
}

/// GET /map/section - neighbourhood of one cell
#[instrument(skip(state))]
pub async fn section_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<MapQuery>,
) -> Response {
    state.metrics.record_request(RequestKind::Section);

    let result = async {
        let request = query.section_request(&state.config)?;
        state.renderer.section(&request).await
    }
    .await;

    match result {
        Ok(entry) => png_response(&entry),
        Err(e) => failure(&state, RequestKind::Section, e),
    }
}

/// GET /map/section/neighbors - nearest non-empty cells of a section, as JSON
#[instrument(skip(state))]
pub async fn neighbors_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<MapQuery>,
) -> Response {
    state.metrics.record_request(RequestKind::Neighbors);

    let result = async {
        let request = query.section_request(&state.config)?;
        state.renderer.neighbors(&request).await
    }
    .await;

    match result {
        Ok(neighbors) => Json(neighbors).into_response(),
        Err(e) => failure(&state, RequestKind::Neighbors, e),
    }
}

fn failure(state: &AppState, kind: RequestKind, err: MapError) -> Response {
    let status = err.http_status_code();
    if status >= 500 {
        error!(error = %err, status, "Map request failed");
    } else {
        warn!(error = %err, status, "Rejected map request");
    }
    state.metrics.record_request_error(kind, status);
    error_response(&err)
}
