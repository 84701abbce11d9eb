//! Image rendering for SOM map views.
//!
//! - Palettes (colour-stop gradients)
//! - Built-in visualizations behind the `Visualization` trait
//! - Grid line, node and label decorations
//! - Marker overlays
//! - PNG encoding

pub mod decorations;
pub mod markers;
pub mod palette;
pub mod png;
pub mod visualization;

pub use decorations::Decorator;
pub use markers::MarkerSpec;
pub use palette::{ColorStop, PaletteConfig, PaletteDefinition};
pub use visualization::{Visualization, VisualizationRegistry};
