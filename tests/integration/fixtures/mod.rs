//! Shared builders for hand-made frames and peers.

#![allow(dead_code)]

use pixelroom::core::{CanvasStore, Grid, ParticipantId, Point, Rgba, WriteStamp};
use pixelroom::sync::frame::DEFAULT_MAX_FRAME_BYTES;
use pixelroom::sync::{
    ClearOp, Envelope, EraseOp, Message, PlaceOp, SessionSettings, encode_envelope, encode_frame,
};
use pixelroom::test_harness::{CapturedPeer, TestClock};

pub fn pid(seed: u8) -> ParticipantId {
    ParticipantId::from_bytes([seed; 16])
}

/// Settings with the draw throttle switched off.
pub fn unthrottled() -> SessionSettings {
    SessionSettings {
        draw_cooldown_ms: 0,
        min_stroke_distance: 0.0,
        ..SessionSettings::default()
    }
}

pub fn store(capacity: usize) -> CanvasStore {
    CanvasStore::new(Grid::new(1.0).expect("grid"), capacity)
}

pub fn peer(seed: u8, capacity: usize, clock: &TestClock) -> CapturedPeer {
    CapturedPeer::new(seed, unthrottled(), store(capacity), clock)
}

pub fn frame(origin: ParticipantId, seq: u64, message: Message) -> Vec<u8> {
    let payload = encode_envelope(&Envelope::new(origin, seq, message)).expect("encode envelope");
    encode_frame(&payload, DEFAULT_MAX_FRAME_BYTES).expect("encode frame")
}

pub fn place_frame(
    origin: ParticipantId,
    seq: u64,
    x: f64,
    y: f64,
    color: Rgba,
    stamp: WriteStamp,
) -> Vec<u8> {
    frame(
        origin,
        seq,
        Message::Place(PlaceOp {
            position: Point::new(x, y),
            size: 1.0,
            color,
            origin,
            stamp,
        }),
    )
}

pub fn erase_frame(
    origin: ParticipantId,
    seq: u64,
    x: f64,
    y: f64,
    size: f32,
    stamp: WriteStamp,
) -> Vec<u8> {
    frame(
        origin,
        seq,
        Message::Erase(EraseOp {
            position: Point::new(x, y),
            size,
            stamp,
        }),
    )
}

pub fn clear_frame(origin: ParticipantId, seq: u64, stamp: WriteStamp) -> Vec<u8> {
    frame(origin, seq, Message::Clear(ClearOp { stamp }))
}
