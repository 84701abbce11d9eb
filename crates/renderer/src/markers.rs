//! Disc markers and area outlines drawn over a copy of a cached view.
//!
//! Positions are given in grid cells; `origin` is the pixel position of the
//! bitmap's top-left corner inside the full rendered image, so the same
//! markers can be drawn on a full tile or on any crop of it.

use image::Rgba;
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use map_common::{Bitmap, CellRect, Grid, MapError, ZoomLevel};
use tracing::warn;
use viewport::CellGeometry;

/// Marker diameter as a fraction of the smaller cell side.
pub const DEFAULT_DOT_SIZE_FRACTION: f32 = 0.4;

/// Smallest marker diameter in pixels.
pub const MIN_MARKER_DIAMETER: u32 = 4;

pub const ITEM_MARKER_COLOR: Rgba<u8> = Rgba([255, 215, 0, 255]);
pub const SELECTED_MARKER_COLOR: Rgba<u8> = Rgba([220, 20, 60, 255]);
pub const OUTLINE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub const AREA_COLOR: Rgba<u8> = Rgba([30, 144, 255, 255]);

/// One marker to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerSpec {
    pub grid_x: i64,
    pub grid_y: i64,
    pub color: Rgba<u8>,
    pub is_selected: bool,
}

impl MarkerSpec {
    /// Marker for a cell holding a requested data item.
    pub fn item(grid_x: i64, grid_y: i64) -> Self {
        Self {
            grid_x,
            grid_y,
            color: ITEM_MARKER_COLOR,
            is_selected: false,
        }
    }

    /// Marker for the explicitly selected cell.
    pub fn selected(grid_x: i64, grid_y: i64) -> Self {
        Self {
            grid_x,
            grid_y,
            color: SELECTED_MARKER_COLOR,
            is_selected: true,
        }
    }
}

/// Outer diameter of a marker disc in pixels.
pub fn marker_diameter(geometry: &CellGeometry, zoom: ZoomLevel, dot_size_fraction: f32) -> u32 {
    let side = geometry.cell_width().min(geometry.cell_height()) as f32;
    let scaled = (side * dot_size_fraction * zoom.get() as f32).round() as i64 - 2;
    scaled.max(MIN_MARKER_DIAMETER as i64) as u32
}

/// Draw markers in order; later markers cover earlier ones.
///
/// Discs are drawn with an odd pixel width, the largest one not wider than
/// [`marker_diameter`] (an even diameter loses one pixel). Markers outside
/// the grid are skipped with a warning. Returns how many markers were drawn.
pub fn draw_markers(
    bitmap: &mut Bitmap,
    markers: &[MarkerSpec],
    grid: &Grid,
    geometry: &CellGeometry,
    zoom: ZoomLevel,
    origin: (i64, i64),
    dot_size_fraction: f32,
) -> usize {
    // draw_filled_circle_mut paints 2r+1 pixels across
    let radius = (marker_diameter(geometry, zoom, dot_size_fraction).saturating_sub(1) / 2) as i32;
    let mut drawn = 0;

    for marker in markers {
        if let Err(err) = grid.checked_cell(marker.grid_x, marker.grid_y) {
            warn!(error = %err, selected = marker.is_selected, "Skipping marker");
            continue;
        }

        let (cx, cy) = geometry.cell_center(marker.grid_x, marker.grid_y, zoom);
        let center = ((cx - origin.0) as i32, (cy - origin.1) as i32);

        draw_filled_circle_mut(bitmap, center, radius, OUTLINE_COLOR);
        draw_filled_circle_mut(bitmap, center, (radius - 1).max(0), marker.color);
        drawn += 1;
    }

    drawn
}

/// Outline a rectangle of cells, clipped to the grid.
///
/// Returns false (with a warning) when the rectangle misses the grid entirely.
pub fn draw_area_selection(
    bitmap: &mut Bitmap,
    area: &CellRect,
    grid: &Grid,
    geometry: &CellGeometry,
    zoom: ZoomLevel,
    origin: (i64, i64),
) -> bool {
    let max_x = grid.x_size() as i64 - 1;
    let max_y = grid.y_size() as i64 - 1;
    if area.x2 < 0 || area.y2 < 0 || area.x1 > max_x || area.y1 > max_y {
        let err = MapError::InvalidCellAccess {
            x: area.x1,
            y: area.y1,
            x_size: grid.x_size(),
            y_size: grid.y_size(),
        };
        warn!(error = %err, "Skipping area selection outside the grid");
        return false;
    }

    let (x1, y1) = (area.x1.max(0), area.y1.max(0));
    let (x2, y2) = (area.x2.min(max_x), area.y2.min(max_y));

    let (left, top) = geometry.cell_to_pixel(x1, y1, zoom);
    let (right, bottom) = geometry.cell_to_pixel(x2 + 1, y2 + 1, zoom);
    let width = (right - left) as u32;
    let height = (bottom - top) as u32;

    let rect = Rect::at((left - origin.0) as i32, (top - origin.1) as i32).of_size(width, height);
    draw_hollow_rect_mut(bitmap, rect, AREA_COLOR);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn setup() -> (Grid, CellGeometry, Bitmap) {
        let grid = Grid::new(4, 4).unwrap();
        let geometry = CellGeometry::new(20, 20).unwrap();
        (grid, geometry, Bitmap::from_pixel(80, 81, WHITE))
    }

    #[test]
    fn test_marker_diameter() {
        let geometry = CellGeometry::new(20, 30).unwrap();
        // round(20 * 0.4 * 1) - 2 = 6
        assert_eq!(marker_diameter(&geometry, ZoomLevel::default(), 0.4), 6);
        // round(20 * 0.4 * 3) - 2 = 22
        assert_eq!(marker_diameter(&geometry, ZoomLevel::new(3).unwrap(), 0.4), 22);

        let tiny = CellGeometry::new(4, 4).unwrap();
        assert_eq!(
            marker_diameter(&tiny, ZoomLevel::default(), 0.4),
            MIN_MARKER_DIAMETER
        );
    }

    #[test]
    fn test_marker_has_outline_and_fill() {
        let (grid, geometry, mut bitmap) = setup();
        let markers = [MarkerSpec::item(1, 1)];
        let drawn = draw_markers(
            &mut bitmap,
            &markers,
            &grid,
            &geometry,
            ZoomLevel::new(2).unwrap(),
            (0, 0),
            0.4,
        );
        assert_eq!(drawn, 1);

        // Zoom 2: cell span 40, centre (60, 60); diameter 14, radius 6
        assert_eq!(bitmap.get_pixel(60, 60), &ITEM_MARKER_COLOR);
        assert_eq!(bitmap.get_pixel(65, 60), &ITEM_MARKER_COLOR);
        assert_eq!(bitmap.get_pixel(66, 60), &OUTLINE_COLOR);
        assert_eq!(bitmap.get_pixel(67, 60), &WHITE);
    }

    #[test]
    fn test_marker_width_never_exceeds_diameter() {
        for (zoom, fraction) in [(1, 0.4), (2, 0.4), (3, 0.4), (2, 0.75), (3, 1.0)] {
            let (grid, geometry, mut bitmap) = setup();
            let zoom = ZoomLevel::new(zoom).unwrap();
            draw_markers(&mut bitmap, &[MarkerSpec::item(0, 0)], &grid, &geometry, zoom, (0, 0), fraction);

            let (_, cy) = geometry.cell_center(0, 0, zoom);
            let painted = (0..bitmap.width())
                .filter(|&x| bitmap.get_pixel(x, cy as u32) != &WHITE)
                .count() as u32;
            let diameter = marker_diameter(&geometry, zoom, fraction);
            assert!(painted <= diameter, "{} px painted for diameter {}", painted, diameter);
            assert!(painted + 1 >= diameter, "{} px painted for diameter {}", painted, diameter);
            assert_eq!(painted % 2, 1);
        }
    }

    #[test]
    fn test_markers_respect_origin() {
        let (grid, geometry, mut bitmap) = setup();
        draw_markers(
            &mut bitmap,
            &[MarkerSpec::selected(2, 2)],
            &grid,
            &geometry,
            ZoomLevel::default(),
            (20, 20),
            0.4,
        );
        // Cell (2, 2) centre is (50, 50) in the full image, (30, 30) here
        assert_eq!(bitmap.get_pixel(30, 30), &SELECTED_MARKER_COLOR);
        assert_eq!(bitmap.get_pixel(50, 50), &WHITE);
    }

    #[test]
    fn test_later_markers_paint_over_earlier() {
        let (grid, geometry, mut bitmap) = setup();
        let markers = [MarkerSpec::item(0, 0), MarkerSpec::selected(0, 0)];
        draw_markers(&mut bitmap, &markers, &grid, &geometry, ZoomLevel::default(), (0, 0), 0.4);
        assert_eq!(bitmap.get_pixel(10, 10), &SELECTED_MARKER_COLOR);
    }

    #[test]
    fn test_out_of_grid_markers_skipped() {
        let (grid, geometry, mut bitmap) = setup();
        let markers = [MarkerSpec::item(-1, 0), MarkerSpec::item(4, 4), MarkerSpec::item(3, 3)];
        let drawn = draw_markers(&mut bitmap, &markers, &grid, &geometry, ZoomLevel::default(), (0, 0), 0.4);
        assert_eq!(drawn, 1);
    }

    #[test]
    fn test_area_selection_outline() {
        let (grid, geometry, mut bitmap) = setup();
        let area = CellRect::new(1, 1, 9, 2);
        assert!(draw_area_selection(&mut bitmap, &area, &grid, &geometry, ZoomLevel::default(), (0, 0)));
        // Clipped to columns 1..=3, rows 1..=2: pixels 20..80 x 20..60
        assert_eq!(bitmap.get_pixel(20, 30), &AREA_COLOR);
        assert_eq!(bitmap.get_pixel(79, 30), &AREA_COLOR);
        assert_eq!(bitmap.get_pixel(40, 59), &AREA_COLOR);
        assert_eq!(bitmap.get_pixel(40, 40), &WHITE);
    }

    #[test]
    fn test_area_outside_grid_skipped() {
        let (grid, geometry, mut bitmap) = setup();
        let before = bitmap.clone();
        let area = CellRect::new(5, 5, 8, 8);
        assert!(!draw_area_selection(&mut bitmap, &area, &grid, &geometry, ZoomLevel::default(), (0, 0)));
        assert_eq!(bitmap, before);
    }
}
