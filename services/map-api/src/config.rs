//! Viewer configuration.
//!
//! Loaded from an optional YAML file, then overridden by `MAP_*` environment
//! variables.

use map_common::{MapError, MapResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use storage::TileCacheConfig;
use tracing::info;

/// Default link target of an image-map region: the section view of that cell.
pub const DEFAULT_LINK_TEMPLATE: &str =
    "/map/section?vis={vis}&palette={palette}&zoom={zoom}&x={x}&y={y}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// JSON export of the map lattice
    pub grid_path: PathBuf,
    /// Root of the persisted images; unset keeps images in memory only
    pub image_dir: Option<PathBuf>,
    pub cell_width: u32,
    pub cell_height: u32,
    /// Marker diameter as a fraction of the smaller cell side
    pub dot_size_fraction: f32,
    /// Image-map link; `{x}`, `{y}`, `{vis}`, `{palette}` and `{zoom}` are substituted
    pub link_template: String,
    /// Cells shown on each side of a section view's centre
    pub section_radius: u32,
    /// TrueType font for cell labels
    pub label_font: Option<PathBuf>,
    /// Palette JSON file; built-in palettes when unset
    pub palettes: Option<PathBuf>,
    pub base_capacity: usize,
    pub view_capacity: usize,
    pub section_capacity: usize,
    pub default_visualization: String,
    pub default_palette: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let cache = TileCacheConfig::default();
        Self {
            grid_path: PathBuf::from("./data/grid.json"),
            image_dir: None,
            cell_width: 16,
            cell_height: 16,
            dot_size_fraction: renderer::markers::DEFAULT_DOT_SIZE_FRACTION,
            link_template: DEFAULT_LINK_TEMPLATE.to_string(),
            section_radius: 2,
            label_font: None,
            palettes: None,
            base_capacity: cache.base_capacity,
            view_capacity: cache.interactive_capacity,
            section_capacity: cache.section_capacity,
            default_visualization: "hits".to_string(),
            default_palette: "grey".to_string(),
        }
    }
}

impl ViewerConfig {
    pub fn from_yaml(yaml: &str) -> MapResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| MapError::configuration(format!("invalid viewer config: {}", e)))
    }

    pub fn from_file(path: &Path) -> MapResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            MapError::configuration(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    /// File (if any), then environment, then validation.
    pub fn load(path: Option<&Path>) -> MapResult<Self> {
        let mut config = match path {
            Some(path) => {
                info!(path = %path.display(), "Loading viewer config");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MAP_*` overrides read through `var`.
    pub fn apply_overrides<F>(&mut self, var: F) -> MapResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("MAP_GRID_PATH") {
            self.grid_path = PathBuf::from(v);
        }
        if let Some(v) = var("MAP_IMAGE_DIR") {
            self.image_dir = non_empty(v).map(PathBuf::from);
        }
        if let Some(v) = var("MAP_CELL_WIDTH") {
            self.cell_width = parse_var("MAP_CELL_WIDTH", &v)?;
        }
        if let Some(v) = var("MAP_CELL_HEIGHT") {
            self.cell_height = parse_var("MAP_CELL_HEIGHT", &v)?;
        }
        if let Some(v) = var("MAP_DOT_SIZE_FRACTION") {
            self.dot_size_fraction = parse_var("MAP_DOT_SIZE_FRACTION", &v)?;
        }
        if let Some(v) = var("MAP_LINK_TEMPLATE") {
            self.link_template = v;
        }
        if let Some(v) = var("MAP_SECTION_RADIUS") {
            self.section_radius = parse_var("MAP_SECTION_RADIUS", &v)?;
        }
        if let Some(v) = var("MAP_LABEL_FONT") {
            self.label_font = non_empty(v).map(PathBuf::from);
        }
        if let Some(v) = var("MAP_PALETTES") {
            self.palettes = non_empty(v).map(PathBuf::from);
        }
        if let Some(v) = var("MAP_BASE_CAPACITY") {
            self.base_capacity = parse_var("MAP_BASE_CAPACITY", &v)?;
        }
        if let Some(v) = var("MAP_VIEW_CAPACITY") {
            self.view_capacity = parse_var("MAP_VIEW_CAPACITY", &v)?;
        }
        if let Some(v) = var("MAP_SECTION_CAPACITY") {
            self.section_capacity = parse_var("MAP_SECTION_CAPACITY", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> MapResult<()> {
        if self.cell_width == 0 || self.cell_height == 0 {
            return Err(MapError::configuration("cell_width and cell_height must be non-zero"));
        }
        if !(self.dot_size_fraction > 0.0 && self.dot_size_fraction <= 1.0) {
            return Err(MapError::configuration(format!(
                "dot_size_fraction must be in (0, 1], got {}",
                self.dot_size_fraction
            )));
        }
        if self.base_capacity == 0 || self.view_capacity == 0 || self.section_capacity == 0 {
            return Err(MapError::configuration("cache capacities must be at least 1"));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> TileCacheConfig {
        TileCacheConfig {
            image_dir: self.image_dir.clone(),
            base_capacity: self.base_capacity,
            interactive_capacity: self.view_capacity,
            section_capacity: self.section_capacity,
        }
    }
}

fn non_empty(v: String) -> Option<String> {
    (!v.trim().is_empty()).then_some(v)
}

fn parse_var<T>(name: &str, value: &str) -> MapResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| MapError::configuration(format!("{}='{}': {}", name, value, e)))
}
