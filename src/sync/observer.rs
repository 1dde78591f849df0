//! Outbound notifications to rendering and presence collaborators.
//!
//! Registered once when the session is built. Calls are synchronous and in
//! the order mutations were applied.

use crate::core::{CellHandle, CellSnapshot, ParticipantId, Rgba};

use super::presence::{BrushProperties, BrushState};

pub trait CanvasObserver {
    fn on_cell_placed(&mut self, _handle: CellHandle, _color: Rgba, _size: f32) {}

    fn on_cell_removed(&mut self, _handle: CellHandle) {}

    fn on_canvas_cleared(&mut self) {}

    fn on_snapshot(&mut self, _cells: &[CellSnapshot]) {}
}

pub trait PeerObserver {
    fn on_remote_changed(
        &mut self,
        _peer: ParticipantId,
        _props: &BrushProperties,
        _previous: Option<&BrushState>,
    ) {
    }

    fn on_peer_left(&mut self, _peer: ParticipantId) {}

    /// A frame from `origin` was dropped as malformed.
    fn on_message_rejected(&mut self, _origin: ParticipantId, _reason: &str) {}
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl CanvasObserver for NoopObserver {}

impl PeerObserver for NoopObserver {}
