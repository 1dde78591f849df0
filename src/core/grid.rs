//! Grid coordinate model.
//!
//! Continuous positions snap to discrete cell handles. Rounding is
//! round-half-to-even on each axis independently, so `0.5` snaps to `0` and
//! `1.5` snaps to `2` (cell_size 1.0).

use serde::{Deserialize, Serialize};

use super::error::{CoreError, RangeError, ensure_finite};

/// A continuous 2-D position in world units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        ensure_finite("position.x", self.x)?;
        ensure_finite("position.y", self.y)?;
        Ok(())
    }
}

/// The unique identity of one cell: its snapped coordinate in grid units.
///
/// Doubles as the canvas storage key. Integer indices sidestep float equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellHandle {
    pub col: i64,
    pub row: i64,
}

impl CellHandle {
    pub const fn new(col: i64, row: i64) -> Self {
        Self { col, row }
    }
}

/// Grid geometry: the edge length of one cell in world units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grid {
    cell_size: f64,
}

impl Grid {
    pub fn new(cell_size: f64) -> Result<Self, CoreError> {
        ensure_finite("cell_size", cell_size)?;
        if cell_size <= 0.0 {
            return Err(RangeError {
                field: "cell_size",
                value: cell_size,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            }
            .into());
        }
        Ok(Self { cell_size })
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Handle of the cell whose center is nearest `raw`.
    ///
    /// Total: non-finite input maps to the origin cell, huge input saturates.
    pub fn handle_for(&self, raw: Point) -> CellHandle {
        CellHandle {
            col: (raw.x / self.cell_size).round_ties_even() as i64,
            row: (raw.y / self.cell_size).round_ties_even() as i64,
        }
    }

    /// World position of a cell's center.
    pub fn position_of(&self, handle: CellHandle) -> Point {
        Point {
            x: handle.col as f64 * self.cell_size,
            y: handle.row as f64 * self.cell_size,
        }
    }

    pub fn snap(&self, raw: Point) -> Point {
        self.position_of(self.handle_for(raw))
    }
}

/// Snap `raw` to the nearest grid position for `cell_size`.
///
/// `cell_size` must be positive; callers validate it once via [`Grid::new`].
pub fn snap(raw: Point, cell_size: f64) -> Point {
    let snap_axis = |v: f64| (v / cell_size).round_ties_even() * cell_size;
    Point {
        x: snap_axis(raw.x),
        y: snap_axis(raw.y),
    }
}
