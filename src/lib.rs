#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod paths;
pub mod sync;
pub mod telemetry;
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    CanvasStore, CellHandle, CellSnapshot, Clock, Grid, Lww, MessageId, Paint, ParticipantId,
    PlaceOutcome, Point, Rgba, Stamp, WriteStamp,
};
pub use crate::sync::{
    CanvasObserver, DeliverOutcome, LocalBus, PeerObserver, RequestOutcome, Session,
    SessionSettings, Target, Transport,
};
