//! Clickable hit regions for a rendered view.
//!
//! Regions are produced lazily in row-major order. The iterator is `Clone`, so
//! the same layout can be walked again and always yields the same sequence.

use map_common::{Cell, Grid, ZoomLevel};
use quick_xml::escape::escape;
use serde::Serialize;
use std::fmt::Write;

use crate::CellGeometry;

/// Placement of the hit regions relative to a cropped image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMapLayout {
    pub zoom: ZoomLevel,
    /// Cell shown at the naive crop origin
    pub offset_x: i64,
    pub offset_y: i64,
    /// Extra offset reported by the viewport resolver
    pub extra_offset_x: i64,
    pub extra_offset_y: i64,
    /// First and last visible cells (inclusive)
    pub start: (usize, usize),
    pub end: (usize, usize),
}

/// One clickable rectangle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitRegion {
    pub cell_x: usize,
    pub cell_y: usize,
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub title: String,
    pub href: String,
}

impl HitRegion {
    pub fn center(&self) -> (i64, i64) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }
}

/// Lazy, restartable sequence of hit regions.
#[derive(Debug, Clone)]
pub struct HitRegions<'a> {
    grid: &'a Grid,
    geometry: CellGeometry,
    layout: ImageMapLayout,
    link_template: &'a str,
    next: Option<(usize, usize)>,
}

/// Hit regions for every visible cell of `layout`.
///
/// The end cell is clamped to the grid; an empty range yields nothing.
pub fn generate<'a>(
    grid: &'a Grid,
    geometry: CellGeometry,
    layout: ImageMapLayout,
    link_template: &'a str,
) -> HitRegions<'a> {
    let end = (
        layout.end.0.min(grid.x_size().saturating_sub(1)),
        layout.end.1.min(grid.y_size().saturating_sub(1)),
    );
    let layout = ImageMapLayout { end, ..layout };
    let next = (layout.start.0 <= end.0 && layout.start.1 <= end.1).then_some(layout.start);

    HitRegions {
        grid,
        geometry,
        layout,
        link_template,
        next,
    }
}

impl<'a> HitRegions<'a> {
    fn region_for(&self, x: usize, y: usize) -> HitRegion {
        let (span_x, span_y) = self.geometry.cell_span(self.layout.zoom);
        let left = (x as i64 - self.layout.offset_x) * span_x as i64 + self.layout.extra_offset_x;
        let top = (y as i64 - self.layout.offset_y) * span_y as i64 + self.layout.extra_offset_y;

        HitRegion {
            cell_x: x,
            cell_y: y,
            left,
            top,
            right: left + span_x as i64,
            bottom: top + span_y as i64,
            title: self
                .grid
                .cell_at(x, y)
                .map(tooltip)
                .unwrap_or_else(|| format!("({}, {})", x, y)),
            href: link_for(self.link_template, x, y),
        }
    }
}

impl<'a> Iterator for HitRegions<'a> {
    type Item = HitRegion;

    fn next(&mut self) -> Option<HitRegion> {
        let (x, y) = self.next?;
        let (start_x, _) = self.layout.start;
        let (end_x, end_y) = self.layout.end;

        self.next = if x < end_x {
            Some((x + 1, y))
        } else if y < end_y {
            Some((start_x, y + 1))
        } else {
            None
        };

        Some(self.region_for(x, y))
    }
}

/// Tooltip text for a cell: labels, else item ids, else its position.
pub fn tooltip(cell: &Cell) -> String {
    if !cell.labels.is_empty() {
        cell.labels.join(", ")
    } else if !cell.items.is_empty() {
        cell.items.join(", ")
    } else {
        format!("({}, {})", cell.x, cell.y)
    }
}

/// Substitute `{x}` and `{y}` into a link template.
pub fn link_for(template: &str, x: usize, y: usize) -> String {
    template
        .replace("{x}", &x.to_string())
        .replace("{y}", &y.to_string())
}

/// Render regions as an HTML `<map>` fragment.
pub fn to_html(name: &str, regions: impl IntoIterator<Item = HitRegion>) -> String {
    let mut html = format!("<map name=\"{}\">\n", escape(name));
    for region in regions {
        // Writing into a String cannot fail
        let _ = writeln!(
            html,
            "  <area shape=\"rect\" coords=\"{},{},{},{}\" title=\"{}\" href=\"{}\">",
            region.left,
            region.top,
            region.right,
            region.bottom,
            escape(region.title.as_str()),
            escape(region.href.as_str()),
        );
    }
    html.push_str("</map>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::from_cells(
            3,
            2,
            vec![
                Cell::new(0, 0).with_items(["doc-1"]),
                Cell::new(2, 1).with_items(["doc-2"]).with_labels(["a & b"]),
            ],
        )
        .unwrap()
    }

    fn layout(start: (usize, usize), end: (usize, usize)) -> ImageMapLayout {
        ImageMapLayout {
            zoom: ZoomLevel::default(),
            offset_x: 0,
            offset_y: 0,
            extra_offset_x: 0,
            extra_offset_y: 0,
            start,
            end,
        }
    }

    #[test]
    fn test_row_major_order() {
        let grid = grid();
        let geometry = CellGeometry::new(10, 10).unwrap();
        let cells: Vec<(usize, usize)> = generate(&grid, geometry, layout((0, 0), (2, 1)), "")
            .map(|r| (r.cell_x, r.cell_y))
            .collect();
        assert_eq!(cells, vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]);
    }

    #[test]
    fn test_region_bounds_include_offsets() {
        let grid = grid();
        let geometry = CellGeometry::new(10, 8).unwrap();
        let layout = ImageMapLayout {
            zoom: ZoomLevel::new(2).unwrap(),
            offset_x: 1,
            offset_y: 1,
            extra_offset_x: 5,
            extra_offset_y: 3,
            start: (1, 1),
            end: (2, 1),
        };
        let regions: Vec<HitRegion> = generate(&grid, geometry, layout, "").collect();
        assert_eq!(regions.len(), 2);
        assert_eq!(
            (regions[1].left, regions[1].top, regions[1].right, regions[1].bottom),
            (25, 3, 45, 19)
        );
    }

    #[test]
    fn test_end_clamped_to_grid() {
        let grid = grid();
        let geometry = CellGeometry::new(10, 10).unwrap();
        assert_eq!(generate(&grid, geometry, layout((0, 0), (9, 9)), "").count(), 6);
        assert_eq!(generate(&grid, geometry, layout((2, 2), (9, 9)), "").count(), 0);
    }

    #[test]
    fn test_restartable_and_deterministic() {
        let grid = grid();
        let geometry = CellGeometry::new(10, 10).unwrap();
        let regions = generate(&grid, geometry, layout((0, 0), (2, 1)), "/cell/{x}/{y}");
        let first: Vec<HitRegion> = regions.clone().collect();
        let second: Vec<HitRegion> = regions.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_tooltips_and_links() {
        let grid = grid();
        let geometry = CellGeometry::new(10, 10).unwrap();
        let regions: Vec<HitRegion> =
            generate(&grid, geometry, layout((0, 0), (2, 1)), "/s?x={x}&y={y}").collect();
        assert_eq!(regions[0].title, "doc-1");
        assert_eq!(regions[1].title, "(1, 0)");
        assert_eq!(regions[5].title, "a & b");
        assert_eq!(regions[5].href, "/s?x=2&y=1");
    }

    #[test]
    fn test_html_is_escaped() {
        let grid = grid();
        let geometry = CellGeometry::new(10, 10).unwrap();
        let html = to_html(
            "som",
            generate(&grid, geometry, layout((2, 1), (2, 1)), "/s?x={x}&y={y}"),
        );
        assert!(html.starts_with("<map name=\"som\">"));
        assert!(html.contains(
            "<area shape=\"rect\" coords=\"20,10,30,20\" title=\"a &amp; b\" href=\"/s?x=2&amp;y=1\">"
        ));
        assert!(html.trim_end().ends_with("</map>"));
    }
}
