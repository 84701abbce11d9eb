//! Map rendering pipeline.
//!
//! Three cached products, each built from the one below it:
//! - base: the full visualization at one zoom level, with decorations
//! - interactive: a clamped crop of the base with markers and an image map
//! - section: the neighbourhood of one cell with its nearest-neighbour list
//!
//! CPU work (visualization, cropping, drawing, PNG encoding) runs on the
//! blocking pool; the async side only waits on caches.

use map_common::{
    Bitmap, Grid, MapError, MapResult, Neighbor, RenderParams, SectionRequest, ViewRequest,
    ZoomLevel,
};
use renderer::markers::{self, MarkerSpec};
use renderer::png::encode_png;
use renderer::{Decorator, PaletteConfig, VisualizationRegistry};
use std::sync::Arc;
use storage::{CacheEntry, CacheKey, EntryMetadata, Tier, TileCacheConfig, TileCacheService};
use tracing::{debug, info, warn};
use viewport::{image_map, resolver, CellGeometry, ImageMapLayout};

use crate::config::ViewerConfig;
use crate::metrics::{record_render, Timer};

/// Name of the generated `<map>` element.
pub const IMAGE_MAP_NAME: &str = "som-map";

/// Per-request rendering knobs taken from the configuration.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub dot_size_fraction: f32,
    pub link_template: String,
    pub section_radius: u32,
}

impl RenderSettings {
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            dot_size_fraction: config.dot_size_fraction,
            link_template: config.link_template.clone(),
            section_radius: config.section_radius,
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from_config(&ViewerConfig::default())
    }
}

/// Shared, read-only inputs of every render.
struct RenderContext {
    grid: Grid,
    geometry: CellGeometry,
    registry: VisualizationRegistry,
    decorator: Decorator,
    settings: RenderSettings,
}

/// Renders and caches base tiles, interactive views and section views.
pub struct MapRenderer {
    ctx: Arc<RenderContext>,
    cache: TileCacheService,
}

impl MapRenderer {
    /// Build the renderer described by `config`: grid, palettes, font, caches.
    pub fn from_config(config: &ViewerConfig) -> MapResult<Self> {
        let grid = Grid::from_file(&config.grid_path)?;
        info!(
            path = %config.grid_path.display(),
            x_size = grid.x_size(),
            y_size = grid.y_size(),
            "Loaded map grid"
        );

        let palettes = match &config.palettes {
            Some(path) => PaletteConfig::from_file(path)?,
            None => PaletteConfig::builtin(),
        };
        let registry = VisualizationRegistry::with_builtins(palettes);
        let decorator = Decorator::from_font_path(config.label_font.as_deref())?;
        if !decorator.has_font() {
            info!("No label font configured, label decorations are disabled");
        }

        Self::new(
            grid,
            CellGeometry::new(config.cell_width, config.cell_height)?,
            registry,
            decorator,
            &config.cache_config(),
            RenderSettings::from_config(config),
        )
    }

    pub fn new(
        grid: Grid,
        geometry: CellGeometry,
        registry: VisualizationRegistry,
        decorator: Decorator,
        cache: &TileCacheConfig,
        settings: RenderSettings,
    ) -> MapResult<Self> {
        Ok(Self {
            ctx: Arc::new(RenderContext {
                grid,
                geometry,
                registry,
                decorator,
                settings,
            }),
            cache: TileCacheService::new(cache)?,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.ctx.grid
    }

    pub fn geometry(&self) -> CellGeometry {
        self.ctx.geometry
    }

    pub fn registry(&self) -> &VisualizationRegistry {
        &self.ctx.registry
    }

    pub fn cache(&self) -> &TileCacheService {
        &self.cache
    }

    /// Full image for `params`, rendered once per key.
    pub async fn base_tile(&self, params: &RenderParams) -> MapResult<Arc<CacheEntry>> {
        self.check_names(params)?;
        let key = CacheKey::base(params);

        self.cache
            .get_or_render(&key, || {
                let ctx = self.ctx.clone();
                let params = params.clone();
                let text = key.as_str().to_string();
                run_blocking(Tier::Base, move || render_base(&ctx, &params, text))
            })
            .await
    }

    /// Pixel size of a view before clamping to the zoomed image.
    ///
    /// Missing hints default to the full zoom-1 image size.
    pub fn requested_size(&self, request: &ViewRequest) -> (u32, u32) {
        let grid = &self.ctx.grid;
        let (w, h) =
            self.ctx
                .geometry
                .full_image_size(grid.x_size(), grid.y_size(), ZoomLevel::default());
        (
            request.viewport.requested_width.unwrap_or(w),
            request.viewport.requested_height.unwrap_or(h),
        )
    }

    /// Interactive view: crop of the base image plus markers and image map.
    pub async fn view(&self, request: &ViewRequest) -> MapResult<Arc<CacheEntry>> {
        self.check_names(&request.render)?;

        let grid = &self.ctx.grid;
        let zoom = request.render.zoom;
        let (full_w, full_h) = self
            .ctx
            .geometry
            .full_image_size(grid.x_size(), grid.y_size(), zoom);
        let (req_w, req_h) = self.requested_size(request);
        let key = CacheKey::interactive(request, req_w.min(full_w), req_h.min(full_h));

        self.cache
            .get_or_render(&key, || async {
                let base = self.base_tile(&request.render).await?;
                let ctx = self.ctx.clone();
                let request = request.clone();
                let text = key.as_str().to_string();
                run_blocking(Tier::Interactive, move || {
                    render_view(&ctx, &base.bitmap, &request, (req_w, req_h), text)
                })
                .await
            })
            .await
    }

    /// Image-map fragment belonging to the interactive view.
    pub async fn image_map(&self, request: &ViewRequest) -> MapResult<String> {
        let entry = self.view(request).await?;
        entry
            .metadata
            .image_map
            .clone()
            .ok_or_else(|| MapError::InternalError(format!("view {} has no image map", entry.key)))
    }

    /// Section view around one cell.
    pub async fn section(&self, request: &SectionRequest) -> MapResult<Arc<CacheEntry>> {
        self.check_names(&request.render)?;
        self.ctx.grid.checked_cell(request.center.0, request.center.1)?;

        let radius = self.ctx.settings.section_radius;
        let key = CacheKey::section(request, radius);

        self.cache
            .get_or_render(&key, || async {
                let base = self.base_tile(&request.render).await?;
                let ctx = self.ctx.clone();
                let request = request.clone();
                let text = key.as_str().to_string();
                run_blocking(Tier::Section, move || {
                    render_section(&ctx, &base.bitmap, &request, radius, text)
                })
                .await
            })
            .await
    }

    /// Nearest-neighbour list of a section view.
    pub async fn neighbors(&self, request: &SectionRequest) -> MapResult<Vec<Neighbor>> {
        let entry = self.section(request).await?;
        Ok(entry.metadata.neighbors.clone().unwrap_or_default())
    }

    fn check_names(&self, params: &RenderParams) -> MapResult<()> {
        self.ctx.registry.visualization(&params.visualization)?;
        self.ctx.registry.palette(&params.palette)?;
        Ok(())
    }
}

/// Run a render on the blocking pool and record its duration.
async fn run_blocking<F>(tier: Tier, render: F) -> MapResult<CacheEntry>
where
    F: FnOnce() -> MapResult<CacheEntry> + Send + 'static,
{
    let timer = Timer::start();
    let result = tokio::task::spawn_blocking(render)
        .await
        .map_err(|e| MapError::InternalError(format!("render task failed: {}", e)))
        .and_then(|r| r);

    record_render(tier, timer.elapsed_ms(), result.is_ok());
    if let Ok(entry) = &result {
        debug!(
            tier = %tier,
            key = %entry.key,
            duration_ms = timer.elapsed_ms(),
            "Rendered"
        );
    }
    result
}

fn render_base(ctx: &RenderContext, params: &RenderParams, key: String) -> MapResult<CacheEntry> {
    let grid = &ctx.grid;
    let zoom = params.zoom;
    let (width, height) = ctx.geometry.full_image_size(grid.x_size(), grid.y_size(), zoom);

    let mut bitmap = ctx
        .registry
        .render(&params.visualization, &params.palette, grid, width, height)?;
    ctx.decorator
        .decorate(&mut bitmap, grid, &ctx.geometry, zoom, params.flags);

    let layout = ImageMapLayout {
        zoom,
        offset_x: 0,
        offset_y: 0,
        extra_offset_x: 0,
        extra_offset_y: 0,
        start: (0, 0),
        end: (grid.x_size() - 1, grid.y_size() - 1),
    };
    let html = image_map_html(ctx, params, layout);

    finish_entry(key, bitmap, |m| m.with_image_map(html))
}

fn render_view(
    ctx: &RenderContext,
    base: &Bitmap,
    request: &ViewRequest,
    requested: (u32, u32),
    key: String,
) -> MapResult<CacheEntry> {
    let grid = &ctx.grid;
    let geometry = &ctx.geometry;
    let vp = &request.viewport;
    let zoom = request.render.zoom;

    let (offset_px_x, offset_px_y) =
        viewport::zoom::viewport_offsets(zoom, vp.move_x, vp.move_y, base.width(), base.height());
    let (offset_x, offset_y) = geometry.pixel_to_cell(offset_px_x as i64, offset_px_y as i64, zoom);

    let resolved = resolver::resolve(
        base,
        geometry,
        zoom,
        offset_x,
        offset_y,
        requested.0,
        requested.1,
    );
    let rect = resolved.rect;
    let origin = resolved.origin();
    let mut bitmap = resolved.bitmap;

    if let Some(area) = &request.area {
        markers::draw_area_selection(&mut bitmap, area, grid, geometry, zoom, origin);
    }
    let specs = build_markers(grid, request);
    markers::draw_markers(
        &mut bitmap,
        &specs,
        grid,
        geometry,
        zoom,
        origin,
        ctx.settings.dot_size_fraction,
    );

    let (first_x, first_y) = geometry.pixel_to_cell(origin.0, origin.1, zoom);
    let (last_x, last_y) = geometry.pixel_to_cell(
        origin.0 + rect.width as i64 - 1,
        origin.1 + rect.height as i64 - 1,
        zoom,
    );
    let layout = ImageMapLayout {
        zoom,
        offset_x,
        offset_y,
        extra_offset_x: rect.extra_offset_x,
        extra_offset_y: rect.extra_offset_y,
        start: (first_x.max(0) as usize, first_y.max(0) as usize),
        end: (last_x.max(0) as usize, last_y.max(0) as usize),
    };
    let html = image_map_html(ctx, &request.render, layout);

    finish_entry(key, bitmap, |m| m.with_image_map(html))
}

fn render_section(
    ctx: &RenderContext,
    base: &Bitmap,
    request: &SectionRequest,
    radius: u32,
    key: String,
) -> MapResult<CacheEntry> {
    let grid = &ctx.grid;
    let geometry = &ctx.geometry;
    let zoom = request.render.zoom;
    let (cx, cy) = request.center;
    let r = radius as i64;

    let x1 = (cx - r).max(0);
    let y1 = (cy - r).max(0);
    let x2 = (cx + r).min(grid.x_size() as i64 - 1);
    let y2 = (cy + r).min(grid.y_size() as i64 - 1);

    let (span_x, span_y) = geometry.cell_span(zoom);
    let width = (x2 - x1 + 1) as u32 * span_x;
    let height = (y2 - y1 + 1) as u32 * span_y;

    let resolved = resolver::resolve(base, geometry, zoom, x1, y1, width, height);
    let rect = resolved.rect;
    let origin = resolved.origin();
    let mut bitmap = resolved.bitmap;

    markers::draw_markers(
        &mut bitmap,
        &[MarkerSpec::selected(cx, cy)],
        grid,
        geometry,
        zoom,
        origin,
        ctx.settings.dot_size_fraction,
    );

    let layout = ImageMapLayout {
        zoom,
        offset_x: x1,
        offset_y: y1,
        extra_offset_x: rect.extra_offset_x,
        extra_offset_y: rect.extra_offset_y,
        start: (x1 as usize, y1 as usize),
        end: (x2 as usize, y2 as usize),
    };
    let html = image_map_html(ctx, &request.render, layout);
    let neighbors = nearest_neighbors(grid, request.center, (x1, y1), (x2, y2));

    finish_entry(key, bitmap, |m| m.with_image_map(html).with_neighbors(neighbors))
}

/// Markers for a view request: requested items first, then the selection.
pub fn build_markers(grid: &Grid, request: &ViewRequest) -> Vec<MarkerSpec> {
    let mut specs = Vec::with_capacity(request.marked_items.len() + 1);

    for id in &request.marked_items {
        match grid.locate_item(id) {
            Some((x, y)) => specs.push(MarkerSpec::item(x as i64, y as i64)),
            None => warn!(item = %id, "Requested item is not mapped onto the grid"),
        }
    }

    if let Some((x, y)) = request.selected_cell {
        specs.push(MarkerSpec::selected(x, y));
    }

    specs
}

/// Non-empty cells of the inclusive rectangle `from..=to`, nearest to
/// `center` first; equal distances keep row-major order.
pub fn nearest_neighbors(
    grid: &Grid,
    center: (i64, i64),
    from: (i64, i64),
    to: (i64, i64),
) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = (from.1..=to.1)
        .flat_map(|y| (from.0..=to.0).map(move |x| (x, y)))
        .filter_map(|(x, y)| grid.checked_cell(x, y).ok())
        .filter(|cell| !cell.is_empty())
        .map(|cell| {
            let dx = cell.x as f64 - center.0 as f64;
            let dy = cell.y as f64 - center.1 as f64;
            Neighbor {
                x: cell.x,
                y: cell.y,
                distance: (dx * dx + dy * dy).sqrt(),
                items: cell.items.clone(),
                labels: cell.labels.clone(),
            }
        })
        .collect();

    // Stable sort keeps row-major order among ties
    neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    neighbors
}

fn image_map_html(ctx: &RenderContext, params: &RenderParams, layout: ImageMapLayout) -> String {
    let template = ctx
        .settings
        .link_template
        .replace("{vis}", &params.visualization)
        .replace("{palette}", &params.palette)
        .replace("{zoom}", &params.zoom.to_string());
    let regions = image_map::generate(&ctx.grid, ctx.geometry, layout, &template);
    image_map::to_html(IMAGE_MAP_NAME, regions)
}

fn finish_entry<F>(key: String, bitmap: Bitmap, metadata: F) -> MapResult<CacheEntry>
where
    F: FnOnce(EntryMetadata) -> EntryMetadata,
{
    let png = encode_png(&bitmap)?;
    let metadata = metadata(EntryMetadata::new(bitmap.width(), bitmap.height()));
    Ok(CacheEntry::new(key, bitmap, png, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use map_common::{Cell, DrawFlags, Viewport};

    fn grid() -> Grid {
        Grid::from_cells(
            5,
            5,
            vec![
                Cell::new(2, 2).with_items(["centre"]),
                Cell::new(1, 2).with_items(["west"]),
                Cell::new(3, 2).with_items(["east"]),
                Cell::new(3, 3).with_items(["south-east"]),
                Cell::new(0, 0).with_labels(["label only"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_nearest_neighbors_order() {
        let neighbors = nearest_neighbors(&grid(), (2, 2), (0, 0), (4, 4));
        let order: Vec<(usize, usize)> = neighbors.iter().map(|n| (n.x, n.y)).collect();
        assert_eq!(order, vec![(2, 2), (1, 2), (3, 2), (3, 3)]);
        assert_eq!(neighbors[0].distance, 0.0);
        assert!((neighbors[3].distance - 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_neighbors_respects_bounds() {
        let neighbors = nearest_neighbors(&grid(), (2, 2), (2, 2), (4, 4));
        let order: Vec<(usize, usize)> = neighbors.iter().map(|n| (n.x, n.y)).collect();
        assert_eq!(order, vec![(2, 2), (3, 2), (3, 3)]);
    }

    #[test]
    fn test_build_markers_skips_unknown_items() {
        let params = RenderParams::new("hits", "grey", ZoomLevel::default(), DrawFlags::default());
        let mut request = ViewRequest::new(params, Viewport::new(ZoomLevel::default(), 0, 0));
        request.marked_items = vec!["east".into(), "missing".into(), "west".into()];
        request.selected_cell = Some((4, 4));

        let specs = build_markers(&grid(), &request);
        assert_eq!(
            specs,
            vec![
                MarkerSpec::item(3, 2),
                MarkerSpec::item(1, 2),
                MarkerSpec::selected(4, 4),
            ]
        );
    }
}
