//! Palette configuration for map visualizations.
//!
//! A palette is a list of colour stops. Visualizations ask for the colour at
//! a normalized position in `0.0..=1.0`; the stop values are rescaled to that
//! range, so `[0, 100]` and `[0, 1]` describe the same gradient.

use image::Rgba;
use map_common::{MapError, MapResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Colour used when a stop holds an unparseable colour.
const FALLBACK_COLOR: Rgba<u8> = Rgba([200, 200, 200, 255]);

/// Palette configuration loaded from JSON
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaletteConfig {
    pub version: String,
    pub palettes: BTreeMap<String, PaletteDefinition>,
}

/// A single palette definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaletteDefinition {
    pub name: String,
    pub description: Option<String>,
    pub stops: Vec<ColorStop>,
}

/// Color stop for gradient
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColorStop {
    pub value: f32,
    pub color: String,
}

impl ColorStop {
    pub fn new(value: f32, color: impl Into<String>) -> Self {
        Self {
            value,
            color: color.into(),
        }
    }
}

impl PaletteConfig {
    /// Load palette configuration from JSON string
    pub fn from_json(json_str: &str) -> MapResult<Self> {
        let config: Self = serde_json::from_str(json_str)
            .map_err(|e| MapError::configuration(format!("invalid palette file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load palette configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> MapResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MapError::configuration(format!("cannot read palettes {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Palettes available without a configuration file.
    pub fn builtin() -> Self {
        let mut palettes = BTreeMap::new();
        palettes.insert(
            "grey".to_string(),
            PaletteDefinition::new(
                "Greyscale",
                vec![ColorStop::new(0.0, "#FFFFFF"), ColorStop::new(1.0, "#202020")],
            ),
        );
        palettes.insert(
            "heat".to_string(),
            PaletteDefinition::new(
                "Heat",
                vec![
                    ColorStop::new(0.0, "#FFFFCC"),
                    ColorStop::new(0.35, "#FD8D3C"),
                    ColorStop::new(0.7, "#E31A1C"),
                    ColorStop::new(1.0, "#800026"),
                ],
            ),
        );
        palettes.insert(
            "ocean".to_string(),
            PaletteDefinition::new(
                "Ocean",
                vec![
                    ColorStop::new(0.0, "#F7FCF0"),
                    ColorStop::new(0.5, "#4EB3D3"),
                    ColorStop::new(1.0, "#084081"),
                ],
            ),
        );

        Self {
            version: "1.0".to_string(),
            palettes,
        }
    }

    /// Get a specific palette definition
    pub fn get_palette(&self, name: &str) -> Option<&PaletteDefinition> {
        self.palettes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.palettes.keys().map(String::as_str)
    }

    fn validate(&self) -> MapResult<()> {
        for (key, palette) in &self.palettes {
            if !is_short_name(key) {
                return Err(MapError::configuration(format!(
                    "palette name '{}' must be alphanumeric (dashes allowed)",
                    key
                )));
            }
            if palette.stops.is_empty() {
                return Err(MapError::configuration(format!(
                    "palette '{}' has no colour stops",
                    key
                )));
            }
        }
        Ok(())
    }
}

impl PaletteDefinition {
    pub fn new(name: impl Into<String>, stops: Vec<ColorStop>) -> Self {
        Self {
            name: name.into(),
            description: None,
            stops,
        }
    }

    /// Colour at normalized position `t` (clamped to `0.0..=1.0`).
    pub fn color_at(&self, t: f32) -> Rgba<u8> {
        let mut stops: Vec<(f32, Option<(u8, u8, u8)>)> = self
            .stops
            .iter()
            .map(|s| (s.value, hex_to_rgb(&s.color)))
            .collect();
        stops.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let (first, last) = match (stops.first(), stops.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => return FALLBACK_COLOR,
        };

        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let target = first + t * (last - first);

        // Last stop at or below the target
        let low_idx = stops.iter().rposition(|(v, _)| *v <= target).unwrap_or(0);
        let high_idx = (low_idx + 1).min(stops.len() - 1);

        let (low_val, low_rgb) = stops[low_idx];
        let (high_val, high_rgb) = stops[high_idx];

        let frac = if (high_val - low_val).abs() < f32::EPSILON {
            0.0
        } else {
            ((target - low_val) / (high_val - low_val)).clamp(0.0, 1.0)
        };

        match (low_rgb, high_rgb) {
            (Some((r1, g1, b1)), Some((r2, g2, b2))) => Rgba([
                lerp(r1, r2, frac),
                lerp(g1, g2, frac),
                lerp(b1, b2, frac),
                255,
            ]),
            _ => FALLBACK_COLOR,
        }
    }
}

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 * (1.0 - t) + b as f32 * t).round() as u8
}

/// Whether a name is usable as a cache-key and file-name segment.
pub fn is_short_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Parse hex color string to RGB
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some((r, g, b))
}
