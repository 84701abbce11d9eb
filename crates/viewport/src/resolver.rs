//! Viewport crops of a full rendered image.
//!
//! A crop never reads outside the source image. When the naive crop
//! rectangle would run past an edge, its origin slides back inside and the
//! distance it moved is reported as an extra offset. Anything drawn in cell
//! coordinates relative to the naive origin (image-map regions, markers) must
//! add that extra offset to stay aligned with the cropped pixels.

use image::imageops;
use map_common::{Bitmap, ZoomLevel};

use crate::CellGeometry;

/// A crop rectangle inside a source image, plus how far it was slid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Naive origin minus clamped origin
    pub extra_offset_x: i64,
    pub extra_offset_y: i64,
}

impl CropRect {
    /// Compute the clamped crop of a `full_width × full_height` image.
    ///
    /// `offset_x`/`offset_y` are in cells; the naive origin is their top-left
    /// pixel at `zoom`. Requested sizes larger than the image shrink to the
    /// image size on that axis.
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        full_width: u32,
        full_height: u32,
        geometry: &CellGeometry,
        zoom: ZoomLevel,
        offset_x: i64,
        offset_y: i64,
        requested_width: u32,
        requested_height: u32,
    ) -> Self {
        let (naive_x, naive_y) = geometry.cell_to_pixel(offset_x, offset_y, zoom);
        let (x, width) = clamp_axis(naive_x, requested_width, full_width);
        let (y, height) = clamp_axis(naive_y, requested_height, full_height);

        Self {
            x,
            y,
            width,
            height,
            extra_offset_x: naive_x - x as i64,
            extra_offset_y: naive_y - y as i64,
        }
    }

    /// Whether the crop covers the whole source image.
    pub fn is_full(&self, full_width: u32, full_height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == full_width && self.height == full_height
    }
}

/// Result of resolving a viewport against a full image.
#[derive(Debug, Clone)]
pub struct ResolvedViewport {
    /// Owned copy of the visible pixels
    pub bitmap: Bitmap,
    pub rect: CropRect,
}

impl ResolvedViewport {
    /// Pixel origin of the crop within the full image.
    pub fn origin(&self) -> (i64, i64) {
        (self.rect.x as i64, self.rect.y as i64)
    }
}

/// Crop `full` to the requested viewport, sliding the window inside the image.
#[allow(clippy::too_many_arguments)]
pub fn resolve(
    full: &Bitmap,
    geometry: &CellGeometry,
    zoom: ZoomLevel,
    offset_x: i64,
    offset_y: i64,
    requested_width: u32,
    requested_height: u32,
) -> ResolvedViewport {
    let rect = CropRect::compute(
        full.width(),
        full.height(),
        geometry,
        zoom,
        offset_x,
        offset_y,
        requested_width,
        requested_height,
    );

    let bitmap = if rect.is_full(full.width(), full.height()) {
        full.clone()
    } else {
        imageops::crop_imm(full, rect.x, rect.y, rect.width, rect.height).to_image()
    };

    ResolvedViewport { bitmap, rect }
}

/// Clamp one axis: returns (origin, size).
fn clamp_axis(naive: i64, requested: u32, full: u32) -> (u32, u32) {
    let size = requested.min(full);
    let max_origin = (full - size) as i64;
    (naive.clamp(0, max_origin) as u32, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn zoom(level: u32) -> ZoomLevel {
        ZoomLevel::new(level).unwrap()
    }

    #[test]
    fn test_crop_inside_bounds_has_no_extra_offset() {
        let geometry = CellGeometry::new(16, 16).unwrap();
        let rect = CropRect::compute(480, 481, &geometry, zoom(3), 2, 1, 160, 161);
        assert_eq!((rect.x, rect.y), (96, 48));
        assert_eq!((rect.width, rect.height), (160, 161));
        assert_eq!((rect.extra_offset_x, rect.extra_offset_y), (0, 0));
    }

    #[test]
    fn test_crop_slides_back_inside() {
        let geometry = CellGeometry::new(16, 16).unwrap();
        // Naive origin x = 9 * 48 = 432, only 48 px remain of the requested 160
        let rect = CropRect::compute(480, 481, &geometry, zoom(3), 9, 0, 160, 161);
        assert_eq!(rect.x, 320);
        assert_eq!(rect.extra_offset_x, 112);
        assert_eq!(rect.x + rect.width, 480);
    }

    #[test]
    fn test_oversized_request_returns_full_image() {
        let geometry = CellGeometry::new(4, 4).unwrap();
        let full = Bitmap::from_pixel(40, 41, Rgba([1, 2, 3, 255]));
        let resolved = resolve(&full, &geometry, zoom(1), 0, 0, 1000, 1000);
        assert_eq!(resolved.bitmap.dimensions(), (40, 41));
        assert_eq!(resolved.origin(), (0, 0));
        assert_eq!(resolved.rect.extra_offset_x, 0);
    }

    #[test]
    fn test_resolve_copies_visible_pixels() {
        let geometry = CellGeometry::new(2, 2).unwrap();
        let mut full = Bitmap::new(8, 8);
        full.put_pixel(4, 2, Rgba([255, 0, 0, 255]));

        let resolved = resolve(&full, &geometry, zoom(1), 2, 1, 4, 4);
        assert_eq!(resolved.origin(), (4, 2));
        assert_eq!(resolved.bitmap.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }
}
