//! Common test fixtures for map viewer tests.

use map_common::{Cell, Grid};
use std::path::{Path, PathBuf};

/// Cell size used by the reference scenarios (16 × 16 px).
pub const CELL_SIZE: u32 = 16;

/// A 10 × 10 grid with a few documents and labels.
///
/// - `doc-1`, `doc-2` at (0, 0), labelled "origin"
/// - `doc-3` at (4, 5)
/// - `doc-4` at (5, 5), labelled "centre"
/// - `doc-5` at (9, 9)
pub fn sample_grid() -> Grid {
    Grid::from_cells(10, 10, sample_cells()).expect("sample cells lie inside the grid")
}

fn sample_cells() -> Vec<Cell> {
    vec![
        Cell::new(0, 0)
            .with_items(["doc-1", "doc-2"])
            .with_labels(["origin"]),
        Cell::new(4, 5).with_items(["doc-3"]),
        Cell::new(5, 5).with_items(["doc-4"]).with_labels(["centre"]),
        Cell::new(9, 9).with_items(["doc-5"]),
    ]
}

/// JSON export of [`sample_grid`], in the on-disk grid format.
pub fn sample_grid_json() -> String {
    let cells = serde_json::to_value(sample_cells()).expect("cells serialize");
    serde_json::json!({
        "x_size": 10,
        "y_size": 10,
        "cells": cells,
    })
    .to_string()
}

/// Write [`sample_grid_json`] into `dir` and return the file path.
pub fn write_sample_grid(dir: &Path) -> PathBuf {
    let path = dir.join("grid.json");
    std::fs::write(&path, sample_grid_json()).expect("write grid fixture");
    path
}
