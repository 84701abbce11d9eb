//! Query parsing and response helpers shared by the map handlers.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use map_common::{
    CellRect, DrawFlags, MapError, MapResult, RenderParams, SectionRequest, ViewRequest, Viewport,
    ZoomLevel,
};
use serde::Deserialize;
use std::str::FromStr;
use storage::CacheEntry;

use crate::config::ViewerConfig;

// ============================================================================
// Query Parameters
// ============================================================================

/// Query string of every map endpoint.
///
/// Values are kept as strings so that malformed input is reported per
/// parameter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapQuery {
    pub vis: Option<String>,
    pub palette: Option<String>,
    pub zoom: Option<String>,
    #[serde(rename = "moveX")]
    pub move_x: Option<String>,
    #[serde(rename = "moveY")]
    pub move_y: Option<String>,
    pub grid: Option<String>,
    pub nodes: Option<String>,
    pub labels: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    #[serde(rename = "selX")]
    pub sel_x: Option<String>,
    #[serde(rename = "selY")]
    pub sel_y: Option<String>,
    pub ids: Option<String>,
    pub area: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

impl MapQuery {
    /// Visualization, palette, zoom and decorations.
    pub fn render_params(&self, config: &ViewerConfig) -> MapResult<RenderParams> {
        let zoom = match parse_opt::<u32>("zoom", &self.zoom)? {
            Some(level) => ZoomLevel::new(level)?,
            None => ZoomLevel::default(),
        };
        let flags = DrawFlags {
            grid_lines: parse_flag("grid", &self.grid)?,
            nodes: parse_flag("nodes", &self.nodes)?,
            labels: parse_flag("labels", &self.labels)?,
        };

        Ok(RenderParams::new(
            non_blank(&self.vis).unwrap_or(&config.default_visualization),
            non_blank(&self.palette).unwrap_or(&config.default_palette),
            zoom,
            flags,
        ))
    }

    pub fn view_request(&self, config: &ViewerConfig) -> MapResult<ViewRequest> {
        let render = self.render_params(config)?;
        let viewport = Viewport::new(
            render.zoom,
            parse_opt("moveX", &self.move_x)?.unwrap_or(0),
            parse_opt("moveY", &self.move_y)?.unwrap_or(0),
        )
        .with_size(parse_opt("width", &self.width)?, parse_opt("height", &self.height)?);

        let mut request = ViewRequest::new(render, viewport);

        request.selected_cell = match (
            parse_opt::<i64>("selX", &self.sel_x)?,
            parse_opt::<i64>("selY", &self.sel_y)?,
        ) {
            (Some(x), Some(y)) => Some((x, y)),
            (None, None) => None,
            _ => {
                return Err(MapError::invalid_parameter(
                    "selX/selY",
                    "both coordinates are required",
                ))
            }
        };

        if let Some(ids) = non_blank(&self.ids) {
            request.marked_items = ViewRequest::parse_item_ids(ids);
        }
        if let Some(area) = non_blank(&self.area) {
            request.area = Some(CellRect::parse(area)?);
        }

        Ok(request)
    }

    pub fn section_request(&self, config: &ViewerConfig) -> MapResult<SectionRequest> {
        let x = parse_opt::<i64>("x", &self.x)?
            .ok_or_else(|| MapError::invalid_parameter("x", "missing"))?;
        let y = parse_opt::<i64>("y", &self.y)?
            .ok_or_else(|| MapError::invalid_parameter("y", "missing"))?;

        Ok(SectionRequest {
            render: self.render_params(config)?,
            center: (x, y),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Parse an optional numeric parameter; blank counts as absent.
pub fn parse_opt<T>(name: &str, value: &Option<String>) -> MapResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    non_blank(value)
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| MapError::invalid_parameter(name, format!("'{}': {}", v, e)))
        })
        .transpose()
}

/// Parse an on/off parameter (`1`/`0`, `true`/`false`, `on`/`off`, `yes`/`no`).
pub fn parse_flag(name: &str, value: &Option<String>) -> MapResult<bool> {
    match non_blank(value).map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "on" | "yes") => Ok(true),
        Some("0" | "false" | "off" | "no") => Ok(false),
        Some(other) => Err(MapError::invalid_parameter(
            name,
            format!("'{}' is not a boolean", other),
        )),
    }
}

// ============================================================================
// Responses
// ============================================================================

/// PNG body of a cache entry.
pub fn png_response(entry: &CacheEntry) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "max-age=300"),
        ],
        entry.png.clone(),
    )
        .into_response()
}

/// HTML fragment response.
pub fn html_response(html: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response()
}

/// Plain-text error response with the status the error maps to.
pub fn error_response(err: &MapError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match err {
        MapError::RenderFailure(_) => "missing image".to_string(),
        _ => err.to_string(),
    };
    (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}
