//! Grid cell <-> pixel conversion.

use map_common::{MapError, MapResult, ZoomLevel};
use serde::{Deserialize, Serialize};

/// Extra pixel rows below the last cell row of a full rendered image.
pub const BORDER_ROWS: u32 = 1;

/// Pixel size of one cell at zoom level 1.
///
/// Both dimensions are non-zero by construction, so the pixel -> cell
/// direction never divides by zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellGeometry {
    cell_width: u32,
    cell_height: u32,
}

impl CellGeometry {
    pub fn new(cell_width: u32, cell_height: u32) -> MapResult<Self> {
        if cell_width == 0 || cell_height == 0 {
            return Err(MapError::configuration(format!(
                "cell size must be non-zero, got {}x{}",
                cell_width, cell_height
            )));
        }
        Ok(Self {
            cell_width,
            cell_height,
        })
    }

    pub fn cell_width(&self) -> u32 {
        self.cell_width
    }

    pub fn cell_height(&self) -> u32 {
        self.cell_height
    }

    /// Pixel size of one cell at the given zoom.
    pub fn cell_span(&self, zoom: ZoomLevel) -> (u32, u32) {
        (self.cell_width * zoom.get(), self.cell_height * zoom.get())
    }

    /// Top-left pixel of a cell.
    pub fn cell_to_pixel(&self, cell_x: i64, cell_y: i64, zoom: ZoomLevel) -> (i64, i64) {
        let (span_x, span_y) = self.cell_span(zoom);
        (cell_x * span_x as i64, cell_y * span_y as i64)
    }

    /// Cell containing a pixel (floor division, also for negative pixels).
    pub fn pixel_to_cell(&self, px: i64, py: i64, zoom: ZoomLevel) -> (i64, i64) {
        let (span_x, span_y) = self.cell_span(zoom);
        (px.div_euclid(span_x as i64), py.div_euclid(span_y as i64))
    }

    /// Centre pixel of a cell.
    pub fn cell_center(&self, cell_x: i64, cell_y: i64, zoom: ZoomLevel) -> (i64, i64) {
        let (px, py) = self.cell_to_pixel(cell_x, cell_y, zoom);
        let (span_x, span_y) = self.cell_span(zoom);
        (px + span_x as i64 / 2, py + span_y as i64 / 2)
    }

    /// Size of the full rendered image of an `x_size × y_size` grid.
    pub fn full_image_size(&self, x_size: usize, y_size: usize, zoom: ZoomLevel) -> (u32, u32) {
        let (span_x, span_y) = self.cell_span(zoom);
        (
            x_size as u32 * span_x,
            y_size as u32 * span_y + BORDER_ROWS,
        )
    }
}
