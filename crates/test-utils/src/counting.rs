//! A visualization that counts its renders, for cache tests.

use map_common::{Bitmap, Grid, MapError, MapResult};
use renderer::{PaletteDefinition, Visualization};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Visualization that counts its renders and can be slowed down or broken.
///
/// Renders a flat bitmap in the palette's near colour.
pub struct CountingVisualization {
    name: String,
    renders: AtomicUsize,
    delay: Option<Duration>,
    failing: AtomicBool,
}

impl CountingVisualization {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            renders: AtomicUsize::new(0),
            delay: None,
            failing: AtomicBool::new(false),
        }
    }

    /// Sleep this long inside every render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Make subsequent renders fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of render calls so far, including failed ones.
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl Visualization for CountingVisualization {
    fn short_name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Counts renders (tests only)"
    }

    fn render(
        &self,
        _grid: &Grid,
        palette: &PaletteDefinition,
        width: u32,
        height: u32,
    ) -> MapResult<Bitmap> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(MapError::render_failure("counting visualization set to fail"));
        }
        Ok(Bitmap::from_pixel(width, height, palette.color_at(0.0)))
    }
}
