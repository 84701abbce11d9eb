//! Zoom, pan and hit-region geometry for rendered map images.
//!
//! - `transform`: grid cell <-> pixel conversion
//! - `zoom`: pan offsets for the discrete zoom levels
//! - `resolver`: clamped viewport crops of a full image
//! - `image_map`: clickable regions aligned with a crop

pub mod image_map;
pub mod resolver;
pub mod transform;
pub mod zoom;

pub use image_map::{HitRegion, HitRegions, ImageMapLayout};
pub use resolver::{CropRect, ResolvedViewport};
pub use transform::CellGeometry;
