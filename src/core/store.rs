//! The local canvas replica.
//!
//! Cells are keyed by [`CellHandle`]. Every resident handle is also in the
//! eviction queue and the two never drift; residency never exceeds capacity
//! once a call returns.
//!
//! `erase_before` and `clear_before` are the replicated removals. They only
//! take cells written before their stamp and leave [`Tombstones`] behind, so
//! a write that loses the race to a removal stays removed in any order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::color::Rgba;
use super::crdt::Lww;
use super::eviction::EvictionQueue;
use super::grid::{CellHandle, Grid, Point};
use super::spatial;
use super::time::Stamp;
use super::tombstone::Tombstones;

/// What a cell looks like.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Paint {
    pub color: Rgba,
    pub size: f32,
}

impl Paint {
    pub fn new(color: Rgba, size: f32) -> Self {
        Self { color, size }
    }
}

#[derive(Clone, Debug)]
pub struct Cell {
    paint: Lww<Paint>,
    insertion_order: u64,
}

impl Cell {
    pub fn paint(&self) -> Paint {
        self.paint.value
    }

    pub fn color(&self) -> Rgba {
        self.paint.value.color
    }

    pub fn size(&self) -> f32 {
        self.paint.value.size
    }

    pub fn stamp(&self) -> Stamp {
        self.paint.stamp
    }

    pub fn insertion_order(&self) -> u64 {
        self.insertion_order
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// A new cell. `evicted` is the handle pushed out by capacity, which is
    /// the placed handle itself when capacity is 0.
    Inserted { evicted: Option<CellHandle> },
    /// An existing cell took the newer paint; insertion order unchanged.
    Overwritten,
    /// The stored paint, or a removal covering the cell, is newer.
    Stale,
}

impl PlaceOutcome {
    pub fn applied(&self) -> bool {
        !matches!(self, PlaceOutcome::Stale)
    }

    pub fn evicted(&self) -> Option<CellHandle> {
        match self {
            PlaceOutcome::Inserted { evicted } => *evicted,
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub handle: CellHandle,
    pub position: Point,
    pub color: Rgba,
    pub size: f32,
    pub insertion_order: u64,
    pub stamp: Stamp,
}

#[derive(Clone, Debug)]
pub struct CanvasStore {
    grid: Grid,
    capacity: usize,
    cells: HashMap<CellHandle, Cell>,
    queue: EvictionQueue<CellHandle>,
    next_order: u64,
    tombstones: Tombstones,
}

impl CanvasStore {
    pub fn new(grid: Grid, capacity: usize) -> Self {
        Self {
            grid,
            capacity,
            cells: HashMap::with_capacity(capacity),
            queue: EvictionQueue::with_capacity(capacity),
            next_order: 0,
            tombstones: Tombstones::default(),
        }
    }

    /// Keep at most `limit` erase marks.
    pub fn with_tombstone_limit(mut self, limit: usize) -> Self {
        self.tombstones = Tombstones::new(limit);
        self
    }

    pub fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, handle: &CellHandle) -> bool {
        self.cells.contains_key(handle)
    }

    pub fn get(&self, handle: &CellHandle) -> Option<&Cell> {
        self.cells.get(handle)
    }

    /// Handles from oldest to newest.
    pub fn handles(&self) -> impl Iterator<Item = CellHandle> + '_ {
        self.queue.iter()
    }

    pub fn oldest(&self) -> Option<CellHandle> {
        self.queue.peek_oldest()
    }

    pub fn place(&mut self, handle: CellHandle, paint: Paint, stamp: Stamp) -> PlaceOutcome {
        if self.tombstones.blocks(self.grid.position_of(handle), stamp) {
            return PlaceOutcome::Stale;
        }
        if let Some(cell) = self.cells.get_mut(&handle) {
            return if cell.paint.assign(paint, stamp) {
                PlaceOutcome::Overwritten
            } else {
                PlaceOutcome::Stale
            };
        }

        if self.capacity == 0 {
            return PlaceOutcome::Inserted {
                evicted: Some(handle),
            };
        }

        let insertion_order = self.next_order;
        self.next_order += 1;
        self.cells.insert(
            handle,
            Cell {
                paint: Lww::new(paint, stamp),
                insertion_order,
            },
        );
        self.queue.push(handle);

        let evicted = if self.cells.len() > self.capacity {
            self.queue.pop_oldest().inspect(|oldest| {
                self.cells.remove(oldest);
            })
        } else {
            None
        };
        PlaceOutcome::Inserted { evicted }
    }

    /// Remove every cell within `radius` of `center`. Returns the removed
    /// handles, sorted.
    pub fn erase_at(&mut self, center: Point, radius: f64) -> Vec<CellHandle> {
        let hits = spatial::within_radius(&self.cells, &self.grid, center, radius);
        for handle in &hits {
            self.cells.remove(handle);
            self.queue.remove(handle);
        }
        hits
    }

    /// Erase written by `stamp`: removes cells in the circle written before
    /// it and marks the circle against older writes still in flight.
    pub fn erase_before(&mut self, center: Point, radius: f64, stamp: Stamp) -> Vec<CellHandle> {
        let mut hits = spatial::within_radius(&self.cells, &self.grid, center, radius);
        hits.retain(|handle| self.cells.get(handle).is_some_and(|cell| cell.stamp() < stamp));
        for handle in &hits {
            self.cells.remove(handle);
            self.queue.remove(handle);
        }
        if center.is_finite() && radius.is_finite() && radius >= 0.0 {
            self.tombstones.record_erase(center, radius, stamp);
        }
        hits
    }

    /// Drop everything and restart insertion order. Returns how many cells went.
    pub fn clear(&mut self) -> usize {
        let removed = self.cells.len();
        self.cells.clear();
        self.queue.clear();
        self.next_order = 0;
        removed
    }

    /// Clear written by `stamp`. Cells written after it survive; so does
    /// insertion order unless nothing is left.
    pub fn clear_before(&mut self, stamp: Stamp) -> usize {
        self.tombstones.record_clear(stamp);
        let doomed: Vec<CellHandle> = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.stamp() < stamp)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in &doomed {
            self.cells.remove(handle);
            self.queue.remove(handle);
        }
        if self.cells.is_empty() {
            self.next_order = 0;
        }
        doomed.len()
    }

    /// Resident cells in insertion order.
    pub fn snapshot(&self) -> Vec<CellSnapshot> {
        self.queue
            .iter()
            .filter_map(|handle| {
                self.cells.get(&handle).map(|cell| CellSnapshot {
                    handle,
                    position: self.grid.position_of(handle),
                    color: cell.color(),
                    size: cell.size(),
                    insertion_order: cell.insertion_order,
                    stamp: cell.stamp(),
                })
            })
            .collect()
    }

    /// Replace contents with `snapshot`, replaying it in insertion order.
    /// Tombstones are kept, so cells this replica already saw removed stay
    /// out. Returns the number of resident cells afterwards.
    pub fn restore(&mut self, snapshot: &[CellSnapshot]) -> usize {
        self.clear();
        let mut ordered: Vec<&CellSnapshot> = snapshot.iter().collect();
        ordered.sort_by_key(|cell| cell.insertion_order);
        for cell in ordered {
            self.place(cell.handle, Paint::new(cell.color, cell.size), cell.stamp);
        }
        self.len()
    }

    /// Map and queue agree, orders strictly increase, and residency is within capacity.
    pub fn is_consistent(&self) -> bool {
        if self.cells.len() != self.queue.len() || self.cells.len() > self.capacity {
            return false;
        }
        let mut last = None;
        for handle in self.queue.iter() {
            let Some(cell) = self.cells.get(&handle) else {
                return false;
            };
            if last.is_some_and(|prev| cell.insertion_order <= prev) || cell.insertion_order >= self.next_order {
                return false;
            }
            last = Some(cell.insertion_order);
        }
        true
    }
}
