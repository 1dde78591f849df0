//! Radius queries over stored cells.
//!
//! `linear_scan` is the reference algorithm. `grid_walk` walks the cells
//! under the query's bounding box instead and is picked by [`within_radius`]
//! when that box holds fewer cells than the store does. Both return handles
//! sorted, inclusive of cells exactly `radius` away.

use std::collections::HashMap;

use super::grid::{CellHandle, Grid, Point};

/// Handles within `radius` of `center`, sorted.
///
/// A negative or non-finite radius, or a non-finite center, matches nothing.
pub fn within_radius<V>(
    cells: &HashMap<CellHandle, V>,
    grid: &Grid,
    center: Point,
    radius: f64,
) -> Vec<CellHandle> {
    let Some(bounds) = Bounds::new(grid, center, radius) else {
        return Vec::new();
    };
    if bounds.area() < cells.len() as u128 {
        walk(cells, grid, center, radius, &bounds)
    } else {
        linear_scan(cells, grid, center, radius)
    }
}

pub fn linear_scan<V>(
    cells: &HashMap<CellHandle, V>,
    grid: &Grid,
    center: Point,
    radius: f64,
) -> Vec<CellHandle> {
    if !query_is_valid(center, radius) {
        return Vec::new();
    }
    let mut hits: Vec<CellHandle> = cells
        .keys()
        .copied()
        .filter(|handle| grid.position_of(*handle).distance(&center) <= radius)
        .collect();
    hits.sort_unstable();
    hits
}

pub fn grid_walk<V>(
    cells: &HashMap<CellHandle, V>,
    grid: &Grid,
    center: Point,
    radius: f64,
) -> Vec<CellHandle> {
    match Bounds::new(grid, center, radius) {
        Some(bounds) => walk(cells, grid, center, radius, &bounds),
        None => Vec::new(),
    }
}

fn walk<V>(
    cells: &HashMap<CellHandle, V>,
    grid: &Grid,
    center: Point,
    radius: f64,
    bounds: &Bounds,
) -> Vec<CellHandle> {
    let mut hits = Vec::new();
    // Row-major walk yields handles already sorted by (col, row).
    for col in bounds.min_col..=bounds.max_col {
        for row in bounds.min_row..=bounds.max_row {
            let handle = CellHandle::new(col, row);
            if cells.contains_key(&handle) && grid.position_of(handle).distance(&center) <= radius
            {
                hits.push(handle);
            }
        }
    }
    hits
}

fn query_is_valid(center: Point, radius: f64) -> bool {
    center.is_finite() && radius.is_finite() && radius >= 0.0
}

/// Inclusive grid-index box around a query circle, padded by one cell so
/// float rounding at the edges never drops a candidate.
struct Bounds {
    min_col: i64,
    max_col: i64,
    min_row: i64,
    max_row: i64,
}

impl Bounds {
    fn new(grid: &Grid, center: Point, radius: f64) -> Option<Self> {
        if !query_is_valid(center, radius) {
            return None;
        }
        let cs = grid.cell_size();
        let index = |v: f64| v as i64;
        Some(Self {
            min_col: index(((center.x - radius) / cs).floor()).saturating_sub(1),
            max_col: index(((center.x + radius) / cs).ceil()).saturating_add(1),
            min_row: index(((center.y - radius) / cs).floor()).saturating_sub(1),
            max_row: index(((center.y + radius) / cs).ceil()).saturating_add(1),
        })
    }

    fn area(&self) -> u128 {
        let span = |lo: i64, hi: i64| (i128::from(hi) - i128::from(lo) + 1) as u128;
        span(self.min_col, self.max_col).saturating_mul(span(self.min_row, self.max_row))
    }
}
