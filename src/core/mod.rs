//! Core canvas domain types.
//!
//! Module hierarchy follows type dependency order:
//! - time: HLC primitives
//! - identity: ParticipantId, MessageId
//! - color, grid: value types and snapping
//! - crdt: Lww<T>
//! - eviction: FIFO queue with O(1) removal
//! - spatial: radius queries
//! - tombstone: stamped removal marks
//! - store: CanvasStore

pub mod color;
pub mod crdt;
pub mod effect;
pub mod error;
pub mod eviction;
pub mod grid;
pub mod identity;
pub mod spatial;
pub mod store;
pub mod time;
pub mod tombstone;

pub use color::Rgba;
pub use crdt::{Crdt, Lww};
pub use effect::{Effect, Transience};
pub use error::{CoreError, InvalidId, RangeError};
pub use eviction::EvictionQueue;
pub use grid::{CellHandle, Grid, Point, snap};
pub use identity::{MessageId, ParticipantId};
pub use store::{CanvasStore, Cell, CellSnapshot, Paint, PlaceOutcome};
pub use time::{Clock, Stamp, SystemTimeSource, TimeSource, WriteStamp};
pub use tombstone::{DEFAULT_TOMBSTONE_LIMIT, EraseMark, Tombstones};
