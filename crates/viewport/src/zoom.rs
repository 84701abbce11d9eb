//! Pan offsets for the discrete zoom levels.
//!
//! Each zoom level exposes a fixed handful of pan positions instead of
//! continuous panning, which keeps the set of interactive cache keys small.
//! The position tables are hand-tuned and reproduced exactly.

use map_common::ZoomLevel;

/// Fraction of the visible extent for each pan step of zoom level 2 (steps -1..=1).
const ZOOM_2_STEPS: [(u64, u64); 3] = [(0, 1), (1, 4), (1, 2)];

/// Fraction of the visible extent for each pan step of zoom level 3 (steps -2..=2).
const ZOOM_3_STEPS: [(u64, u64); 5] = [(0, 1), (1, 6), (1, 3), (1, 2), (2, 3)];

/// Pixel offset of the top-left visible corner along one axis.
///
/// `visible_extent` is the size of the full zoomed image on that axis. The
/// step is expected to be clamped by the caller already; values beyond the
/// table map to its nearest end.
pub fn offset(zoom: ZoomLevel, step: i32, visible_extent: u32) -> u32 {
    let table: &[(u64, u64)] = match zoom.get() {
        2 => &ZOOM_2_STEPS,
        3 => &ZOOM_3_STEPS,
        _ => return 0,
    };

    let centre = (table.len() / 2) as i64;
    let idx = (centre + step as i64).clamp(0, table.len() as i64 - 1) as usize;
    let (num, den) = table[idx];
    round_half_up(visible_extent as u64 * num, den) as u32
}

/// Pixel offsets of a viewport on a full image of `full_width × full_height`.
pub fn viewport_offsets(
    zoom: ZoomLevel,
    move_x: i32,
    move_y: i32,
    full_width: u32,
    full_height: u32,
) -> (u32, u32) {
    (
        offset(zoom, move_x, full_width),
        offset(zoom, move_y, full_height),
    )
}

fn round_half_up(num: u64, den: u64) -> u64 {
    (2 * num + den) / (2 * den)
}
