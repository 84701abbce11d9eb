//! Grid lines, node dots and cell labels drawn over a base tile.

use image::Rgba;
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut};
use map_common::{Bitmap, DrawFlags, Grid, MapError, MapResult, ZoomLevel};
use rusttype::{Font, Scale};
use std::path::Path;
use tracing::warn;
use viewport::CellGeometry;

const GRID_LINE_COLOR: Rgba<u8> = Rgba([96, 96, 96, 255]);
const NODE_COLOR: Rgba<u8> = Rgba([32, 32, 32, 255]);
const LABEL_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Label text height as a fraction of the cell height.
const LABEL_SCALE_FRACTION: f32 = 0.3;

/// Draws the optional decorations of a base tile.
pub struct Decorator {
    font: Option<Font<'static>>,
}

impl Decorator {
    pub fn new(font: Option<Font<'static>>) -> Self {
        Self { font }
    }

    /// Load the label font from a TrueType file, if one is configured.
    pub fn from_font_path(path: Option<&Path>) -> MapResult<Self> {
        let Some(path) = path else {
            return Ok(Self::new(None));
        };

        let data = std::fs::read(path).map_err(|e| {
            MapError::configuration(format!("cannot read font {}: {}", path.display(), e))
        })?;
        let font = Font::try_from_vec(data).ok_or_else(|| {
            MapError::configuration(format!("{} is not a usable TrueType font", path.display()))
        })?;
        Ok(Self::new(Some(font)))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw every decoration enabled in `flags`.
    pub fn decorate(
        &self,
        bitmap: &mut Bitmap,
        grid: &Grid,
        geometry: &CellGeometry,
        zoom: ZoomLevel,
        flags: DrawFlags,
    ) {
        if flags.grid_lines {
            draw_grid_lines(bitmap, grid, geometry, zoom);
        }
        if flags.nodes {
            draw_nodes(bitmap, grid, geometry, zoom);
        }
        if flags.labels {
            match &self.font {
                Some(font) => draw_labels(bitmap, grid, geometry, zoom, font),
                None => warn!("Labels requested but no label font is configured, skipping"),
            }
        }
    }
}

/// Lines along every cell boundary.
fn draw_grid_lines(bitmap: &mut Bitmap, grid: &Grid, geometry: &CellGeometry, zoom: ZoomLevel) {
    let (span_x, span_y) = geometry.cell_span(zoom);
    let max_x = bitmap.width().saturating_sub(1) as f32;
    let max_y = bitmap.height().saturating_sub(1) as f32;

    for x in 0..=grid.x_size() {
        let px = ((x as u32 * span_x) as f32).min(max_x);
        draw_line_segment_mut(bitmap, (px, 0.0), (px, max_y), GRID_LINE_COLOR);
    }
    for y in 0..=grid.y_size() {
        let py = ((y as u32 * span_y) as f32).min(max_y);
        draw_line_segment_mut(bitmap, (0.0, py), (max_x, py), GRID_LINE_COLOR);
    }
}

/// A small dot at the centre of every cell.
fn draw_nodes(bitmap: &mut Bitmap, grid: &Grid, geometry: &CellGeometry, zoom: ZoomLevel) {
    let (span_x, span_y) = geometry.cell_span(zoom);
    let radius = (span_x.min(span_y) / 8).max(1) as i32;

    for cell in grid.cells() {
        let (cx, cy) = geometry.cell_center(cell.x as i64, cell.y as i64, zoom);
        draw_filled_circle_mut(bitmap, (cx as i32, cy as i32), radius, NODE_COLOR);
    }
}

/// The first label of each labelled cell, at the cell's top-left corner.
fn draw_labels(
    bitmap: &mut Bitmap,
    grid: &Grid,
    geometry: &CellGeometry,
    zoom: ZoomLevel,
    font: &Font<'static>,
) {
    let (_, span_y) = geometry.cell_span(zoom);
    let scale = Scale::uniform((span_y as f32 * LABEL_SCALE_FRACTION).max(6.0));

    for cell in grid.cells() {
        let Some(label) = cell.labels.first() else {
            continue;
        };
        let (px, py) = geometry.cell_to_pixel(cell.x as i64, cell.y as i64, zoom);
        draw_text_mut(bitmap, LABEL_COLOR, px as i32 + 1, py as i32 + 1, scale, font, label);
    }
}
