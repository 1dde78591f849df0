//! End-to-end canvas scenarios driven through sessions.

use pixelroom::core::{CellHandle, PlaceOutcome, Rgba};
use pixelroom::sync::{DeliverOutcome, MessageType, RequestOutcome};
use pixelroom::test_harness::{CanvasRig, Event, RigOptions, TestClock};

use crate::fixtures;

#[test]
fn capacity_erase_then_clear() {
    let mut rig = CanvasRig::with_options(RigOptions::default().participants(2).capacity(3));
    let a = CellHandle::new(0, 0);
    let b = CellHandle::new(1, 0);
    let c = CellHandle::new(2, 0);
    let d = CellHandle::new(3, 0);

    for x in 0..3 {
        rig.place(0, f64::from(x), 0.0);
    }
    let outcome = rig.place(0, 3.0, 0.0);
    assert_eq!(
        outcome,
        RequestOutcome::Placed {
            handle: d,
            outcome: PlaceOutcome::Inserted { evicted: Some(a) },
        }
    );
    assert_eq!(rig.peer(0).store.handles().collect::<Vec<_>>(), vec![b, c, d]);

    rig.deliver_all();
    rig.assert_converged();
    assert_eq!(rig.peer(1).store.handles().collect::<Vec<_>>(), vec![b, c, d]);

    // Erase waits for its own echo.
    assert_eq!(
        rig.erase(0, 1.0, 0.0),
        RequestOutcome::Sent {
            op: MessageType::Erase
        }
    );
    assert!(rig.peer(0).store.contains(&b));
    rig.deliver_all();
    for peer in rig.peers() {
        assert_eq!(peer.store.handles().collect::<Vec<_>>(), vec![c, d]);
    }

    rig.clear(1);
    rig.deliver_all();
    for peer in rig.peers() {
        assert!(peer.store.is_empty());
        assert!(peer.store.snapshot().is_empty());
        assert!(peer.events.events().contains(&Event::Cleared));
    }
    rig.assert_consistent();
}

#[test]
fn place_after_clear_starts_fresh_order() {
    let mut rig = CanvasRig::new(2);
    rig.place(0, 0.0, 0.0);
    rig.place(0, 1.0, 0.0);
    rig.clear(0);
    rig.deliver_all();

    rig.place(1, 7.0, 7.0);
    rig.deliver_all();
    for peer in rig.peers() {
        let snapshot = peer.store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].insertion_order, 0);
    }
}

#[test]
fn second_color_wins_and_keeps_order() {
    let mut rig = CanvasRig::new(2);
    rig.place(0, 0.0, 0.0);
    rig.place(0, 1.0, 0.0);
    rig.session_mut(0).set_color(Rgba::BLUE).expect("set color");
    let outcome = rig.place(0, 0.2, -0.3);
    assert_eq!(
        outcome,
        RequestOutcome::Placed {
            handle: CellHandle::new(0, 0),
            outcome: PlaceOutcome::Overwritten,
        }
    );
    rig.deliver_all();
    rig.assert_converged();

    for peer in rig.peers() {
        let cell = peer.store.get(&CellHandle::new(0, 0)).expect("cell");
        assert_eq!(cell.color(), Rgba::BLUE);
        assert_eq!(cell.insertion_order(), 0);
        assert_eq!(peer.store.oldest(), Some(CellHandle::new(0, 0)));
    }
}

#[test]
fn erase_with_nothing_left_is_a_no_op() {
    let mut rig = CanvasRig::new(2);
    rig.place(0, 4.0, 4.0);
    rig.deliver_all();

    rig.erase(1, 4.0, 4.0);
    rig.deliver_all();
    rig.erase(1, 4.0, 4.0);
    rig.deliver_all();

    for peer in rig.peers() {
        assert!(peer.store.is_empty());
    }
    assert_eq!(rig.peer(0).session.stats().erased, 1);
}

#[test]
fn concurrent_writes_to_one_cell_converge() {
    let clock = TestClock::new(5_000);
    let mut red = fixtures::peer(1, 100, &clock);
    let mut blue = fixtures::peer(2, 100, &clock);
    let mut left = fixtures::peer(3, 100, &clock);
    let mut right = fixtures::peer(4, 100, &clock);

    blue.session.set_color(Rgba::BLUE).expect("set color");
    blue.transport.take();

    red.place(6.0, 6.0);
    blue.place(6.0, 6.0);
    let red_frame = red.transport.last_frame().expect("red frame");
    let blue_frame = blue.transport.last_frame().expect("blue frame");
    let handle = CellHandle::new(6, 6);

    left.deliver(red.id(), &red_frame).expect("left red");
    right.deliver(blue.id(), &blue_frame).expect("right blue");
    // Each observer shows the message it applied last.
    assert_eq!(left.store.get(&handle).map(|c| c.color()), Some(Rgba::RED));
    assert_eq!(right.store.get(&handle).map(|c| c.color()), Some(Rgba::BLUE));

    left.deliver(blue.id(), &blue_frame).expect("left blue");
    right.deliver(red.id(), &red_frame).expect("right red");
    red.deliver(blue.id(), &blue_frame).expect("red blue");
    blue.deliver(red.id(), &red_frame).expect("blue red");

    let expected = left.store.get(&handle).map(|c| (c.color(), c.stamp()));
    for peer in [&red, &blue, &right] {
        assert_eq!(peer.store.get(&handle).map(|c| (c.color(), c.stamp())), expected);
    }
    // Equal clocks tie on the stamp; the higher participant id takes it.
    assert_eq!(expected.map(|(color, _)| color), Some(Rgba::BLUE));
}

#[test]
fn capacity_zero_keeps_the_canvas_empty() {
    let mut rig = CanvasRig::with_options(RigOptions::default().participants(2).capacity(0));
    let outcome = rig.place(0, 1.0, 1.0);
    assert_eq!(
        outcome,
        RequestOutcome::Placed {
            handle: CellHandle::new(1, 1),
            outcome: PlaceOutcome::Inserted {
                evicted: Some(CellHandle::new(1, 1)),
            },
        }
    );
    rig.deliver_all();
    for peer in rig.peers() {
        assert!(peer.store.is_empty());
        assert!(
            !peer
                .events
                .events()
                .iter()
                .any(|event| matches!(event, Event::Placed { .. }))
        );
    }
    rig.assert_consistent();
}

#[test]
fn late_joiner_restores_a_snapshot() {
    let clock = TestClock::new(1_000);
    let mut host = fixtures::peer(1, 10, &clock);
    host.place(0.0, 0.0);
    host.place(1.0, 0.0);
    host.place(2.0, 0.0);

    let snapshot = host.session.snapshot(&host.store);
    let mut joiner = fixtures::peer(2, 10, &clock);
    let resident = joiner.session.restore(&mut joiner.store, &snapshot);
    assert_eq!(resident, 3);
    assert_eq!(joiner.store.snapshot(), host.store.snapshot());
    assert_eq!(
        joiner.events.events(),
        vec![Event::Cleared, Event::Snapshot(3)]
    );

    // The joiner's next write dominates what it restored.
    joiner.place(0.0, 0.0);
    let frame = joiner.transport.last_frame().expect("frame");
    let outcome = host.deliver(joiner.id(), &frame).expect("deliver");
    assert_eq!(
        outcome,
        DeliverOutcome::Applied {
            handle: CellHandle::new(0, 0),
            evicted: None,
        }
    );
}
