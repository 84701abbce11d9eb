//! Rendering parameters shared by the pipeline and the cache key builder.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{MapError, MapResult};

/// Discrete zoom level (1 = whole grid visible).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ZoomLevel(u32);

impl ZoomLevel {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 3;

    pub fn new(level: u32) -> MapResult<Self> {
        if !(Self::MIN..=Self::MAX).contains(&level) {
            return Err(MapError::invalid_parameter(
                "zoom",
                format!("must be between {} and {}, got {}", Self::MIN, Self::MAX, level),
            ));
        }
        Ok(Self(level))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Largest pan step allowed in either direction at this level.
    pub fn max_move(self) -> i32 {
        self.0 as i32 - 1
    }

    pub fn clamp_move(self, step: i32) -> i32 {
        step.clamp(-self.max_move(), self.max_move())
    }
}

impl Default for ZoomLevel {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl TryFrom<u32> for ZoomLevel {
    type Error = MapError;

    fn try_from(level: u32) -> MapResult<Self> {
        Self::new(level)
    }
}

impl From<ZoomLevel> for u32 {
    fn from(zoom: ZoomLevel) -> Self {
        zoom.0
    }
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decorations drawn on top of the visualization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrawFlags {
    pub grid_lines: bool,
    pub nodes: bool,
    pub labels: bool,
}

/// Everything that determines the pixels of a base tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderParams {
    pub visualization: String,
    pub palette: String,
    pub zoom: ZoomLevel,
    pub flags: DrawFlags,
}

impl RenderParams {
    pub fn new(
        visualization: impl Into<String>,
        palette: impl Into<String>,
        zoom: ZoomLevel,
        flags: DrawFlags,
    ) -> Self {
        Self {
            visualization: visualization.into(),
            palette: palette.into(),
            zoom,
            flags,
        }
    }
}

/// Zoom and pan state of an interactive view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub zoom: ZoomLevel,
    pub move_x: i32,
    pub move_y: i32,
    /// Pixel size hints; the full zoom-1 image size is used when absent
    pub requested_width: Option<u32>,
    pub requested_height: Option<u32>,
}

impl Viewport {
    /// Build a viewport, clamping the pan steps to what the zoom level allows.
    pub fn new(zoom: ZoomLevel, move_x: i32, move_y: i32) -> Self {
        Self {
            zoom,
            move_x: zoom.clamp_move(move_x),
            move_y: zoom.clamp_move(move_y),
            requested_width: None,
            requested_height: None,
        }
    }

    pub fn with_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.requested_width = width.filter(|w| *w > 0);
        self.requested_height = height.filter(|h| *h > 0);
        self
    }
}

/// Inclusive rectangle of cells, normalized so that `x1 <= x2` and `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRect {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl CellRect {
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Parse `x1,y1,x2,y2`.
    pub fn parse(s: &str) -> MapResult<Self> {
        let parts: Vec<i64> = s
            .split(',')
            .map(|p| p.trim().parse::<i64>())
            .collect::<Result<_, _>>()
            .map_err(|e| MapError::invalid_parameter("area", e.to_string()))?;

        match parts.as_slice() {
            [x1, y1, x2, y2] => Ok(Self::new(*x1, *y1, *x2, *y2)),
            _ => Err(MapError::invalid_parameter(
                "area",
                format!("expected x1,y1,x2,y2, got '{}'", s),
            )),
        }
    }
}

/// An interactive view request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewRequest {
    pub render: RenderParams,
    pub viewport: Viewport,
    /// Explicit point selection
    pub selected_cell: Option<(i64, i64)>,
    /// Data items whose cells get a marker, in drawing order
    pub marked_items: Vec<String>,
    pub area: Option<CellRect>,
}

impl ViewRequest {
    pub fn new(render: RenderParams, viewport: Viewport) -> Self {
        Self {
            render,
            viewport,
            selected_cell: None,
            marked_items: Vec::new(),
            area: None,
        }
    }

    /// Split a comma-separated id list, dropping blanks and surrounding whitespace.
    pub fn parse_item_ids(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A single-cell section view request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionRequest {
    pub render: RenderParams,
    pub center: (i64, i64),
}
