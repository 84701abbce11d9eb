//! Visualizations of a map lattice.
//!
//! A visualization turns the grid into pixels of a requested size. The
//! pipeline treats it as an opaque collaborator: it only relies on the
//! returned bitmap having exactly the requested dimensions.

use image::Rgba;
use map_common::{Bitmap, Grid, MapError, MapResult};
use rayon::prelude::*;
use std::sync::Arc;

use crate::palette::{is_short_name, PaletteConfig, PaletteDefinition};

/// A named rendering of the whole grid.
pub trait Visualization: Send + Sync {
    /// Short name used in requests and cache keys.
    fn short_name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Render the grid into a `width × height` bitmap.
    fn render(
        &self,
        grid: &Grid,
        palette: &PaletteDefinition,
        width: u32,
        height: u32,
    ) -> MapResult<Bitmap>;
}

/// Hit histogram: cell colour from the number of mapped items.
#[derive(Debug, Default)]
pub struct HitHistogram;

impl Visualization for HitHistogram {
    fn short_name(&self) -> &str {
        "hits"
    }

    fn description(&self) -> &str {
        "Number of data items mapped onto each cell"
    }

    fn render(
        &self,
        grid: &Grid,
        palette: &PaletteDefinition,
        width: u32,
        height: u32,
    ) -> MapResult<Bitmap> {
        let max = grid.max_item_count().max(1) as f32;
        Ok(fill_cells(grid, width, height, |x, y| {
            let count = grid.cell_at(x, y).map_or(0, |c| c.items.len());
            palette.color_at(count as f32 / max)
        }))
    }
}

/// Labelled cells in the palette's far colour, everything else in its near colour.
#[derive(Debug, Default)]
pub struct LabelCoverage;

impl Visualization for LabelCoverage {
    fn short_name(&self) -> &str {
        "labels"
    }

    fn description(&self) -> &str {
        "Cells carrying at least one label"
    }

    fn render(
        &self,
        grid: &Grid,
        palette: &PaletteDefinition,
        width: u32,
        height: u32,
    ) -> MapResult<Bitmap> {
        let near = palette.color_at(0.0);
        let far = palette.color_at(1.0);
        Ok(fill_cells(grid, width, height, |x, y| {
            match grid.cell_at(x, y) {
                Some(cell) if !cell.labels.is_empty() => far,
                _ => near,
            }
        }))
    }
}

/// Uniform background in the palette's near colour.
#[derive(Debug, Default)]
pub struct FlatBackground;

impl Visualization for FlatBackground {
    fn short_name(&self) -> &str {
        "flat"
    }

    fn description(&self) -> &str {
        "Plain background"
    }

    fn render(
        &self,
        _grid: &Grid,
        palette: &PaletteDefinition,
        width: u32,
        height: u32,
    ) -> MapResult<Bitmap> {
        Ok(Bitmap::from_pixel(width, height, palette.color_at(0.0)))
    }
}

/// Fill each pixel with the colour of the cell it falls into.
///
/// Cells are spread evenly over the image; pixel rows past the last cell row
/// take the colour of the last row.
fn fill_cells<F>(grid: &Grid, width: u32, height: u32, color_of: F) -> Bitmap
where
    F: Fn(usize, usize) -> Rgba<u8> + Sync,
{
    let mut bitmap = Bitmap::new(width, height);
    if width == 0 || height == 0 {
        return bitmap;
    }

    let x_size = grid.x_size();
    let y_size = grid.y_size();
    // Pixel rows covered by cells (the rest is the bottom border)
    let cell_rows = height.saturating_sub(1).max(1) as usize;
    let row_len = width as usize * 4;

    let buffer: &mut [u8] = &mut bitmap;
    buffer
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(py, row)| {
            let y = (py * y_size / cell_rows).min(y_size - 1);
            for (px, pixel) in row.chunks_exact_mut(4).enumerate() {
                let x = (px * x_size / width as usize).min(x_size - 1);
                pixel.copy_from_slice(&color_of(x, y).0);
            }
        });

    bitmap
}

/// Named visualizations plus the palettes they can be rendered with.
pub struct VisualizationRegistry {
    visualizations: Vec<Arc<dyn Visualization>>,
    palettes: PaletteConfig,
}

impl VisualizationRegistry {
    /// Empty registry over the given palettes.
    pub fn new(palettes: PaletteConfig) -> Self {
        Self {
            visualizations: Vec::new(),
            palettes,
        }
    }

    /// Registry with the built-in visualizations.
    pub fn with_builtins(palettes: PaletteConfig) -> Self {
        let mut registry = Self::new(palettes);
        registry.visualizations.push(Arc::new(HitHistogram));
        registry.visualizations.push(Arc::new(LabelCoverage));
        registry.visualizations.push(Arc::new(FlatBackground));
        registry
    }

    /// Add a visualization, replacing any with the same short name.
    pub fn register(&mut self, visualization: Arc<dyn Visualization>) -> MapResult<()> {
        let name = visualization.short_name().to_string();
        if !is_short_name(&name) {
            return Err(MapError::configuration(format!(
                "visualization name '{}' must be alphanumeric (dashes allowed)",
                name
            )));
        }
        self.visualizations.retain(|v| v.short_name() != name);
        self.visualizations.push(visualization);
        Ok(())
    }

    pub fn visualization(&self, name: &str) -> MapResult<Arc<dyn Visualization>> {
        self.visualizations
            .iter()
            .find(|v| v.short_name() == name)
            .cloned()
            .ok_or_else(|| MapError::UnknownVisualization(name.to_string()))
    }

    pub fn palette(&self, name: &str) -> MapResult<&PaletteDefinition> {
        self.palettes
            .get_palette(name)
            .ok_or_else(|| MapError::UnknownPalette(name.to_string()))
    }

    pub fn visualization_names(&self) -> Vec<String> {
        self.visualizations
            .iter()
            .map(|v| v.short_name().to_string())
            .collect()
    }

    pub fn palette_names(&self) -> Vec<String> {
        self.palettes.names().map(str::to_string).collect()
    }

    /// Render a visualization and check the collaborator honoured the size.
    pub fn render(
        &self,
        name: &str,
        palette: &str,
        grid: &Grid,
        width: u32,
        height: u32,
    ) -> MapResult<Bitmap> {
        let visualization = self.visualization(name)?;
        let palette = self.palette(palette)?;
        render_checked(visualization.as_ref(), grid, palette, width, height)
    }
}

/// Call a visualization and reject bitmaps of the wrong size.
pub fn render_checked(
    visualization: &dyn Visualization,
    grid: &Grid,
    palette: &PaletteDefinition,
    width: u32,
    height: u32,
) -> MapResult<Bitmap> {
    let bitmap = visualization.render(grid, palette, width, height)?;
    if bitmap.dimensions() != (width, height) {
        return Err(MapError::render_failure(format!(
            "visualization '{}' returned {}x{}, expected {}x{}",
            visualization.short_name(),
            bitmap.width(),
            bitmap.height(),
            width,
            height
        )));
    }
    Ok(bitmap)
}
