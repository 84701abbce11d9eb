//! Common types shared across the SOM map viewer crates.

pub mod error;
pub mod grid;
pub mod params;

pub use error::{MapError, MapResult};
pub use grid::{Cell, Grid, Neighbor};
pub use params::{CellRect, DrawFlags, RenderParams, SectionRequest, ViewRequest, Viewport, ZoomLevel};

/// RGBA pixel buffer used for every rendered image.
pub type Bitmap = image::RgbaImage;
