//! Read-only model of a trained map lattice.
//!
//! The lattice is produced elsewhere and exported as JSON. Only non-empty
//! cells need to be listed in the export; every other position is an empty
//! cell with no items and no labels.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::{MapError, MapResult};

/// One addressable position of the lattice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
    /// Identifiers of the data items mapped onto this cell
    #[serde(default)]
    pub items: Vec<String>,
    /// Descriptive labels attached to this cell
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self {
            x,
            y,
            items: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn with_items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// JSON export layout.
#[derive(Debug, Deserialize)]
struct GridFile {
    x_size: usize,
    y_size: usize,
    #[serde(default)]
    cells: Vec<Cell>,
}

/// Immutable `x_size × y_size` lattice of cells.
#[derive(Debug, Clone)]
pub struct Grid {
    x_size: usize,
    y_size: usize,
    /// Row-major cell storage
    cells: Vec<Cell>,
    /// Data item id -> cell position
    item_index: HashMap<String, (usize, usize)>,
}

impl Grid {
    /// Create an empty grid.
    pub fn new(x_size: usize, y_size: usize) -> MapResult<Self> {
        Self::from_cells(x_size, y_size, Vec::new())
    }

    /// Create a grid from a sparse list of cells.
    ///
    /// Positions not present in `cells` are empty. A cell listed twice
    /// replaces the earlier entry.
    pub fn from_cells(
        x_size: usize,
        y_size: usize,
        cells: impl IntoIterator<Item = Cell>,
    ) -> MapResult<Self> {
        if x_size == 0 || y_size == 0 {
            return Err(MapError::configuration(format!(
                "grid must have at least one cell, got {}x{}",
                x_size, y_size
            )));
        }

        let mut storage: Vec<Cell> = (0..y_size)
            .flat_map(|y| (0..x_size).map(move |x| Cell::new(x, y)))
            .collect();

        for cell in cells {
            if cell.x >= x_size || cell.y >= y_size {
                return Err(MapError::configuration(format!(
                    "cell ({}, {}) lies outside the {}x{} grid",
                    cell.x, cell.y, x_size, y_size
                )));
            }
            let idx = cell.y * x_size + cell.x;
            storage[idx] = cell;
        }

        let mut item_index = HashMap::new();
        for cell in &storage {
            for item in &cell.items {
                item_index.insert(item.clone(), (cell.x, cell.y));
            }
        }

        Ok(Self {
            x_size,
            y_size,
            cells: storage,
            item_index,
        })
    }

    /// Parse a grid from its JSON export.
    pub fn from_json(json: &str) -> MapResult<Self> {
        let file: GridFile = serde_json::from_str(json)
            .map_err(|e| MapError::configuration(format!("invalid grid file: {}", e)))?;
        Self::from_cells(file.x_size, file.y_size, file.cells)
    }

    /// Load a grid from a JSON file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> MapResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MapError::configuration(format!("cannot read grid {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// Check whether a signed position lies inside the grid.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.x_size && (y as usize) < self.y_size
    }

    pub fn cell_at(&self, x: usize, y: usize) -> Option<&Cell> {
        if x >= self.x_size || y >= self.y_size {
            return None;
        }
        self.cells.get(y * self.x_size + x)
    }

    /// Look up a cell addressed by (possibly out of range) request coordinates.
    pub fn checked_cell(&self, x: i64, y: i64) -> MapResult<&Cell> {
        if !self.contains(x, y) {
            return Err(MapError::InvalidCellAccess {
                x,
                y,
                x_size: self.x_size,
                y_size: self.y_size,
            });
        }
        Ok(&self.cells[y as usize * self.x_size + x as usize])
    }

    /// Position of the cell a data item is mapped onto.
    pub fn locate_item(&self, item: &str) -> Option<(usize, usize)> {
        self.item_index.get(item).copied()
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Largest number of items mapped onto a single cell.
    pub fn max_item_count(&self) -> usize {
        self.cells.iter().map(|c| c.items.len()).max().unwrap_or(0)
    }
}

/// A cell near a selected cell, as listed next to a section view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub x: usize,
    pub y: usize,
    /// Euclidean distance in cells from the selected cell
    pub distance: f64,
    pub items: Vec<String>,
    pub labels: Vec<String>,
}
