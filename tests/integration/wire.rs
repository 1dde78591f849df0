//! Malformed inbound frames and failed broadcasts.

use pixelroom::Effect;
use pixelroom::core::{CellHandle, ParticipantId, PlaceOutcome, Point, Rgba, WriteStamp};
use pixelroom::sync::{
    DeliverError, DeliverOutcome, EraseOp, FrameError, Message, MessageType, PlaceOp,
    ProtoDecodeError, RequestError, RequestOutcome,
};
use pixelroom::test_harness::{CapturedPeer, Event, TestClock};

use crate::fixtures;

fn viewer() -> CapturedPeer {
    fixtures::peer(2, 10, &TestClock::new(1_000))
}

/// Deliver `frame`, expect a rejection, and check nothing changed.
fn reject(peer: &mut CapturedPeer, origin: ParticipantId, frame: &[u8]) -> DeliverError {
    let before = peer.store.snapshot();
    let rejected_before = peer.session.stats().rejected;
    let err = peer.deliver(origin, frame).unwrap_err();
    assert_eq!(peer.store.snapshot(), before);
    assert_eq!(peer.session.stats().rejected, rejected_before + 1);
    assert!(matches!(
        peer.events.events().last(),
        Some(Event::Rejected { origin: got, .. }) if *got == origin
    ));
    err
}

fn raw_envelope(version: u32, kind: &str, origin: ParticipantId) -> Vec<u8> {
    let mut enc = minicbor::Encoder::new(Vec::new());
    enc.map(5)
        .and_then(|e| e.str("v"))
        .and_then(|e| e.u32(version))
        .and_then(|e| e.str("type"))
        .and_then(|e| e.str(kind))
        .and_then(|e| e.str("origin"))
        .and_then(|e| e.str(&origin.as_uuid().to_string()))
        .and_then(|e| e.str("seq"))
        .and_then(|e| e.u64(1))
        .and_then(|e| e.str("body"))
        .and_then(|e| e.map(0))
        .expect("encode raw envelope");
    let payload = enc.into_writer();
    pixelroom::sync::encode_frame(&payload, 1024).expect("frame")
}

fn valid_place(origin: ParticipantId) -> Vec<u8> {
    fixtures::place_frame(origin, 1, 0.0, 0.0, Rgba::RED, WriteStamp::new(1_000, 1))
}

#[test]
fn truncated_frame_is_rejected() {
    let mut peer = viewer();
    let painter = fixtures::pid(1);
    let frame = valid_place(painter);
    let err = reject(&mut peer, painter, &frame[..frame.len() - 3]);
    assert!(matches!(err, DeliverError::Frame(FrameError::Truncated { .. })));
}

#[test]
fn corrupted_payload_fails_crc() {
    let mut peer = viewer();
    let painter = fixtures::pid(1);
    let mut frame = valid_place(painter);
    let last = frame.len() - 1;
    frame[last] ^= 0xff;
    let err = reject(&mut peer, painter, &frame);
    assert!(matches!(err, DeliverError::Frame(FrameError::FrameCrcMismatch { .. })));
}

#[test]
fn oversized_length_is_rejected() {
    let mut peer = viewer();
    let painter = fixtures::pid(1);
    let mut frame = valid_place(painter);
    frame[..4].copy_from_slice(&(1u32 << 24).to_le_bytes());
    let err = reject(&mut peer, painter, &frame);
    assert!(matches!(err, DeliverError::Frame(FrameError::FrameTooLarge { .. })));
}

#[test]
fn unknown_operation_kind_is_rejected() {
    let mut peer = viewer();
    let painter = fixtures::pid(1);
    let err = reject(&mut peer, painter, &raw_envelope(1, "SPRAY", painter));
    assert!(matches!(
        err,
        DeliverError::Decode(ProtoDecodeError::UnknownMessageType(ref kind)) if kind == "SPRAY"
    ));
}

#[test]
fn future_protocol_version_is_rejected() {
    let mut peer = viewer();
    let painter = fixtures::pid(1);
    let err = reject(&mut peer, painter, &raw_envelope(2, "CLEAR", painter));
    assert!(matches!(
        err,
        DeliverError::Decode(ProtoDecodeError::UnsupportedVersion { got: 2, .. })
    ));
}

#[test]
fn out_of_range_color_and_size_are_rejected() {
    let mut peer = viewer();
    let painter = fixtures::pid(1);

    let bright = Rgba {
        r: 1.5,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    let frame = fixtures::place_frame(painter, 1, 0.0, 0.0, bright, WriteStamp::new(1_000, 1));
    let err = reject(&mut peer, painter, &frame);
    assert!(matches!(
        err,
        DeliverError::Invalid {
            op: MessageType::Place,
            ..
        }
    ));

    let huge = fixtures::frame(
        painter,
        2,
        Message::Place(PlaceOp {
            position: Point::new(0.0, 0.0),
            size: 50.0,
            color: Rgba::RED,
            origin: painter,
            stamp: WriteStamp::new(1_000, 2),
        }),
    );
    reject(&mut peer, painter, &huge);

    let erase = fixtures::erase_frame(painter, 3, 0.0, 0.0, 0.0, WriteStamp::new(1_000, 3));
    let err = reject(&mut peer, painter, &erase);
    assert!(matches!(
        err,
        DeliverError::Invalid {
            op: MessageType::Erase,
            ..
        }
    ));
}

#[test]
fn non_finite_position_is_rejected() {
    let mut peer = viewer();
    let painter = fixtures::pid(1);
    let frame = fixtures::frame(
        painter,
        1,
        Message::Erase(EraseOp {
            position: Point::new(f64::NAN, 0.0),
            size: 1.0,
            stamp: WriteStamp::new(1_000, 1),
        }),
    );
    reject(&mut peer, painter, &frame);
}

#[test]
fn runaway_stamps_are_rejected_and_leave_the_clock_alone() {
    let clock = TestClock::new(1_000);
    let mut viewer = fixtures::peer(2, 10, &clock);
    let painter = fixtures::pid(1);

    let pinned = fixtures::place_frame(
        painter,
        1,
        9.0,
        9.0,
        Rgba::GREEN,
        WriteStamp::new(u64::MAX, u32::MAX),
    );
    let err = reject(&mut viewer, painter, &pinned);
    assert!(matches!(
        err,
        DeliverError::Invalid {
            op: MessageType::Place,
            ..
        }
    ));

    let exhausted =
        fixtures::place_frame(painter, 2, 9.0, 9.0, Rgba::GREEN, WriteStamp::new(1_000, u32::MAX));
    reject(&mut viewer, painter, &exhausted);

    let skew = viewer.session.settings().max_clock_skew_ms;
    let erase = fixtures::erase_frame(painter, 3, 0.0, 0.0, 1.0, WriteStamp::new(1_001 + skew, 0));
    let err = reject(&mut viewer, painter, &erase);
    assert!(matches!(
        err,
        DeliverError::Invalid {
            op: MessageType::Erase,
            ..
        }
    ));
    let clear = fixtures::clear_frame(painter, 4, WriteStamp::new(1_001 + skew, 0));
    reject(&mut viewer, painter, &clear);

    // Later writes from the viewer still move forward.
    viewer.session.set_color(Rgba::RED).expect("red");
    viewer.place(0.0, 0.0);
    clock.advance_ms(100);
    viewer.session.set_color(Rgba::BLUE).expect("blue");
    let second = viewer.place(0.0, 0.0);
    assert!(matches!(
        second,
        RequestOutcome::Placed {
            outcome: PlaceOutcome::Overwritten,
            ..
        }
    ));
    let cell = viewer.store.get(&CellHandle::new(0, 0)).expect("cell");
    assert_eq!(cell.color(), Rgba::BLUE);
    assert!(cell.stamp().at < WriteStamp::new(2_000, 0));
}

#[test]
fn stamp_within_the_skew_window_is_accepted() {
    let clock = TestClock::new(1_000);
    let mut viewer = fixtures::peer(2, 10, &clock);
    let painter = fixtures::pid(1);
    let skew = viewer.session.settings().max_clock_skew_ms;

    let stamp = WriteStamp::new(1_000 + skew, 0);
    let edge = fixtures::place_frame(painter, 1, 0.0, 0.0, Rgba::RED, stamp);
    assert!(matches!(
        viewer.deliver(painter, &edge).expect("edge of window"),
        DeliverOutcome::Applied { .. }
    ));
}

#[test]
fn spoofed_origins_are_rejected() {
    let mut peer = viewer();
    let painter = fixtures::pid(1);
    let impostor = fixtures::pid(7);

    let err = reject(&mut peer, impostor, &valid_place(painter));
    assert!(matches!(err, DeliverError::OriginMismatch { .. }));

    let forged = fixtures::frame(
        painter,
        2,
        Message::Place(PlaceOp {
            position: Point::new(0.0, 0.0),
            size: 1.0,
            color: Rgba::RED,
            origin: impostor,
            stamp: WriteStamp::new(1_000, 1),
        }),
    );
    let err = reject(&mut peer, painter, &forged);
    assert!(matches!(err, DeliverError::PlaceOriginMismatch { .. }));
}

#[test]
fn rejection_does_not_block_later_messages() {
    let mut peer = viewer();
    let painter = fixtures::pid(1);
    let frame = valid_place(painter);
    reject(&mut peer, painter, &frame[..5]);

    assert_eq!(
        peer.deliver(painter, &frame).expect("valid place"),
        DeliverOutcome::Applied {
            handle: CellHandle::new(0, 0),
            evicted: None,
        }
    );
}

#[test]
fn clearing_an_empty_canvas_is_not_an_error() {
    let mut peer = viewer();
    let painter = fixtures::pid(1);
    let frame = fixtures::clear_frame(painter, 1, WriteStamp::new(1_000, 1));
    assert_eq!(
        peer.deliver(painter, &frame).expect("clear"),
        DeliverOutcome::Cleared(0)
    );
}

#[test]
fn failed_place_broadcast_keeps_the_local_write() {
    let clock = TestClock::new(1_000);
    let mut painter = fixtures::peer(1, 10, &clock);
    painter.transport.fail_next();

    let err = painter
        .session
        .request_place(&mut painter.store, Point::new(4.0, 4.0))
        .unwrap_err();
    assert!(matches!(
        err,
        RequestError::Broadcast {
            op: MessageType::Place,
            ..
        }
    ));
    assert_eq!(err.effect(), Effect::Some);
    assert!(err.transience().is_retryable());
    assert!(painter.store.contains(&CellHandle::new(4, 4)));
    assert_eq!(painter.session.stats().broadcast_failures, 1);

    // The next message goes out normally.
    painter.place(5.0, 4.0);
    assert_eq!(painter.transport.sent().len(), 1);
}

#[test]
fn failed_erase_and_clear_broadcasts_change_nothing() {
    let clock = TestClock::new(1_000);
    let mut painter = fixtures::peer(1, 10, &clock);
    painter.place(4.0, 4.0);

    painter.transport.fail_next();
    let err = painter
        .session
        .request_erase(&painter.store, Point::new(4.0, 4.0))
        .unwrap_err();
    assert_eq!(err.effect(), Effect::None);

    painter.transport.fail_next();
    let err = painter.session.request_clear().unwrap_err();
    assert_eq!(err.effect(), Effect::None);
    assert_eq!(painter.store.len(), 1);
}
