//! Stamped removal marks.
//!
//! A Place that races an Erase or Clear settles the same way on every
//! replica regardless of arrival order. Clears raise a floor stamp; erases
//! leave a mark over their circle. A write older than a covering mark is
//! stale. Erase marks are bounded and the oldest is forgotten first.

use std::collections::VecDeque;

use super::grid::Point;
use super::time::Stamp;

pub const DEFAULT_TOMBSTONE_LIMIT: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EraseMark {
    pub center: Point,
    pub radius: f64,
    pub stamp: Stamp,
}

impl EraseMark {
    fn covers(&self, position: Point, stamp: Stamp) -> bool {
        stamp < self.stamp && position.distance(&self.center) <= self.radius
    }
}

#[derive(Clone, Debug)]
pub struct Tombstones {
    clear_floor: Option<Stamp>,
    erases: VecDeque<EraseMark>,
    limit: usize,
}

impl Tombstones {
    pub fn new(limit: usize) -> Self {
        Self {
            clear_floor: None,
            erases: VecDeque::new(),
            limit,
        }
    }

    pub fn clear_floor(&self) -> Option<Stamp> {
        self.clear_floor
    }

    pub fn erase_marks(&self) -> usize {
        self.erases.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// True when a write at `position` stamped `stamp` was already removed.
    pub fn blocks(&self, position: Point, stamp: Stamp) -> bool {
        if self.clear_floor.is_some_and(|floor| stamp < floor) {
            return true;
        }
        self.erases.iter().any(|mark| mark.covers(position, stamp))
    }

    pub fn record_erase(&mut self, center: Point, radius: f64, stamp: Stamp) {
        if self.limit == 0 || self.clear_floor.is_some_and(|floor| stamp <= floor) {
            return;
        }
        self.erases.push_back(EraseMark {
            center,
            radius,
            stamp,
        });
        while self.erases.len() > self.limit {
            self.erases.pop_front();
        }
    }

    pub fn record_clear(&mut self, stamp: Stamp) {
        if self.clear_floor.is_some_and(|floor| floor >= stamp) {
            return;
        }
        self.clear_floor = Some(stamp);
        // Marks under the floor can no longer block anything.
        self.erases.retain(|mark| mark.stamp > stamp);
    }
}

impl Default for Tombstones {
    fn default() -> Self {
        Self::new(DEFAULT_TOMBSTONE_LIMIT)
    }
}
