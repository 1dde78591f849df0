//! Adapters from small model values to production canvas types.

use pixelroom::core::{
    CanvasStore, CellHandle, Grid, Paint, ParticipantId, Point, Rgba, Stamp, WriteStamp,
};

pub const ERASE_RADIUS: f64 = 0.25;

pub fn participant(writer: u8) -> ParticipantId {
    ParticipantId::from_bytes([writer.wrapping_add(1); 16])
}

/// Production stamp for a model write at logical `time` by `writer`.
pub fn stamp(time: u8, writer: u8) -> Stamp {
    Stamp::new(WriteStamp::new(u64::from(time), 0), participant(writer))
}

pub fn handle(cell: u8) -> CellHandle {
    CellHandle::new(i64::from(cell), 0)
}

pub fn color(index: u8) -> Rgba {
    match index % 3 {
        0 => Rgba::RED,
        1 => Rgba::GREEN,
        _ => Rgba::BLUE,
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreOp {
    Place { cell: u8, color: u8 },
    Erase(u8),
    Clear,
}

/// Replay `ops` on a fresh production store. Every place carries a newer
/// stamp than the one before it.
pub fn replay(capacity: usize, ops: &[StoreOp]) -> Option<CanvasStore> {
    let mut store = CanvasStore::new(Grid::new(1.0).ok()?, capacity);
    for (time, op) in (1u64..).zip(ops) {
        match *op {
            StoreOp::Place { cell, color: index } => {
                store.place(
                    handle(cell),
                    Paint::new(color(index), 1.0),
                    Stamp::new(WriteStamp::new(time, 0), participant(0)),
                );
            }
            StoreOp::Erase(cell) => {
                store.erase_at(Point::new(f64::from(cell), 0.0), ERASE_RADIUS);
            }
            StoreOp::Clear => {
                store.clear();
            }
        }
    }
    Some(store)
}
