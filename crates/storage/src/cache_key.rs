//! Deterministic cache keys for the three image tiers.

use map_common::{DrawFlags, RenderParams, SectionRequest, ViewRequest};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::{self, Write};

/// Cache tier an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Full rendered image per visualization, palette, zoom and decorations
    Base,
    /// Cropped, annotated views
    Interactive,
    /// Single-cell section views
    Section,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Base, Tier::Interactive, Tier::Section];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Base => "base",
            Tier::Interactive => "interactive",
            Tier::Section => "section",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key: the tier plus a canonical text built from every
/// pixel-affecting parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tier: Tier,
    text: String,
}

impl CacheKey {
    /// Key of the full base image.
    pub fn base(params: &RenderParams) -> Self {
        Self {
            tier: Tier::Base,
            text: base_text(params),
        }
    }

    /// Key of an interactive view, given its effective pixel size.
    pub fn interactive(request: &ViewRequest, width: u32, height: u32) -> Self {
        let vp = &request.viewport;
        let mut text = format!(
            "{}_mx{}_my{}_{}x{}",
            base_text(&request.render),
            vp.move_x,
            vp.move_y,
            width,
            height
        );

        match request.selected_cell {
            Some((x, y)) => {
                let _ = write!(text, "_sel{},{}", x, y);
            }
            None => text.push_str("_sel-"),
        }

        match &request.area {
            Some(area) => {
                let _ = write!(text, "_area{},{},{},{}", area.x1, area.y1, area.x2, area.y2);
            }
            None => text.push_str("_area-"),
        }

        // Length-prefixed ids keep the text unambiguous whatever the ids contain
        text.push_str("_ids");
        for id in &request.marked_items {
            let _ = write!(text, "[{}:{}]", id.len(), id);
        }

        Self {
            tier: Tier::Interactive,
            text,
        }
    }

    /// Key of a section view around `request.center`.
    pub fn section(request: &SectionRequest, radius: u32) -> Self {
        Self {
            tier: Tier::Section,
            text: format!(
                "{}_x{}_y{}_r{}",
                base_text(&request.render),
                request.center.0,
                request.center.1,
                radius
            ),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// File name (without extension) for the on-disk copy.
    ///
    /// Interactive keys embed arbitrary item ids and are hashed; the other
    /// tiers use the key text as long as it is file-name safe.
    pub fn file_stem(&self) -> String {
        let safe = self
            .text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));

        if self.tier != Tier::Interactive && safe {
            self.text.clone()
        } else {
            format!("{:x}", Sha256::digest(self.text.as_bytes()))
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tier, self.text)
    }
}

fn base_text(params: &RenderParams) -> String {
    format!(
        "{}_{}_z{}_{}",
        params.visualization,
        params.palette,
        params.zoom,
        flags_text(params.flags)
    )
}

fn flags_text(flags: DrawFlags) -> String {
    format!(
        "g{}n{}l{}",
        flags.grid_lines as u8, flags.nodes as u8, flags.labels as u8
    )
}
