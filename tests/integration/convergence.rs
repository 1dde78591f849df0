//! Convergence under duplication, reordering and latency.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pixelroom::core::{CellHandle, Point, Rgba, WriteStamp};
use pixelroom::sync::{DeliverOutcome, RequestOutcome};
use pixelroom::test_harness::{CanvasRig, CapturedPeer, NetworkProfile, RigOptions, TestClock};

use crate::fixtures;

const PALETTE: [Rgba; 4] = [Rgba::RED, Rgba::GREEN, Rgba::BLUE, Rgba::BLACK];

#[test]
fn concurrent_places_converge_over_a_reordering_network() {
    for seed in 0..8u64 {
        let mut rig = CanvasRig::new(4);
        rig.set_network_profile(NetworkProfile::relay(), seed);
        let mut rng = StdRng::seed_from_u64(seed);

        for step in 0..120 {
            let who = rng.random_range(0..rig.len());
            if rng.random_bool(0.1) {
                let color = PALETTE[rng.random_range(0..PALETTE.len())];
                rig.session_mut(who).set_color(color).expect("set color");
            }
            let x = f64::from(rng.random_range(0..6u8));
            let y = f64::from(rng.random_range(0..6u8));
            rig.place(who, x, y);
            if step % 7 == 0 {
                rig.advance_ms(rng.random_range(0..30));
                rig.pump(usize::MAX);
            }
        }

        rig.deliver_all();
        rig.assert_converged();
        rig.assert_consistent();
    }
}

#[test]
fn duplicates_are_dropped_before_the_store() {
    let mut rig = CanvasRig::new(3);
    rig.set_network_profile(
        NetworkProfile {
            duplicate_rate: 1.0,
            ..NetworkProfile::default()
        },
        11,
    );
    for x in 0..5 {
        rig.place(0, f64::from(x), 0.0);
    }
    rig.deliver_all();
    rig.assert_converged();

    for index in 1..3 {
        let stats = rig.peer(index).session.stats();
        assert_eq!(stats.applied, 5);
        assert_eq!(stats.duplicates, 5);
        assert_eq!(stats.stale, 0);
    }
}

#[test]
fn redelivered_place_does_not_resurrect_an_erased_cell() {
    let clock = TestClock::new(2_000);
    let mut painter = fixtures::peer(1, 50, &clock);
    let mut viewer = fixtures::peer(2, 50, &clock);

    painter.place(3.0, 3.0);
    let place = painter.transport.last_frame().expect("place frame");
    viewer.deliver(painter.id(), &place).expect("first delivery");

    let erase = fixtures::erase_frame(viewer.id(), 1, 3.0, 3.0, 1.0, WriteStamp::new(2_000, 5));
    assert_eq!(
        viewer.deliver(viewer.id(), &erase).expect("erase echo"),
        DeliverOutcome::Erased(1)
    );

    let outcome = viewer.deliver(painter.id(), &place).expect("redelivery");
    assert!(matches!(outcome, DeliverOutcome::Duplicate(_)));
    assert!(!viewer.store.contains(&CellHandle::new(3, 3)));
}

/// A places (3,3) while B removes around it. Each side applies its own op
/// first, then the other's; both must end with the same canvas.
fn race_place_against(remove: impl Fn(&mut CapturedPeer) -> RequestOutcome, place_late: bool) {
    let clock = TestClock::new(5_000);
    let mut a = fixtures::peer(1, 50, &clock);
    let mut b = fixtures::peer(2, 50, &clock);

    if place_late {
        remove(&mut b);
        clock.advance_ms(10);
        a.place(3.0, 3.0);
    } else {
        a.place(3.0, 3.0);
        clock.advance_ms(10);
        remove(&mut b);
    }
    let place = a.transport.last_frame().expect("place frame");
    let removal = b.transport.last_frame().expect("removal frame");

    a.deliver(b.id(), &removal).expect("removal at a");
    b.deliver(b.id(), &removal).expect("removal echo at b");
    b.deliver(a.id(), &place).expect("place at b");

    let canvas = |peer: &CapturedPeer| {
        peer.store
            .snapshot()
            .into_iter()
            .map(|cell| (cell.handle, cell.color, cell.stamp))
            .collect::<Vec<_>>()
    };
    assert_eq!(canvas(&a), canvas(&b));
    assert_eq!(a.store.contains(&CellHandle::new(3, 3)), place_late);
}

#[test]
fn place_racing_a_clear_settles_the_same_everywhere() {
    for place_late in [false, true] {
        race_place_against(
            |peer| peer.session.request_clear().expect("clear"),
            place_late,
        );
    }
}

#[test]
fn place_racing_an_erase_settles_the_same_everywhere() {
    for place_late in [false, true] {
        race_place_against(
            |peer| {
                peer.session
                    .request_erase(&peer.store, Point::new(3.0, 3.0))
                    .expect("erase")
            },
            place_late,
        );
    }
}

#[test]
fn places_erases_and_clears_converge_over_a_reordering_network() {
    for seed in 0..8u64 {
        let mut rig = CanvasRig::new(3);
        rig.set_network_profile(NetworkProfile::relay(), seed);
        let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);

        for step in 0..150 {
            let who = rng.random_range(0..rig.len());
            let x = f64::from(rng.random_range(0..6u8));
            let y = f64::from(rng.random_range(0..6u8));
            match rng.random_range(0..20u8) {
                0 => {
                    rig.clear(who);
                }
                1..=4 => {
                    rig.erase(who, x, y);
                }
                _ => {
                    rig.place(who, x, y);
                }
            }
            if step % 5 == 0 {
                rig.advance_ms(rng.random_range(0..30));
                rig.pump(usize::MAX);
            }
        }

        rig.deliver_all();
        rig.assert_converged();
        rig.assert_consistent();
    }
}

#[test]
fn redelivered_place_does_not_resurrect_an_evicted_cell() {
    let clock = TestClock::new(2_000);
    let mut viewer = fixtures::peer(2, 1, &clock);
    let painter = fixtures::pid(1);

    let first = fixtures::place_frame(painter, 1, 0.0, 0.0, Rgba::RED, WriteStamp::new(2_000, 1));
    let second = fixtures::place_frame(painter, 2, 1.0, 0.0, Rgba::RED, WriteStamp::new(2_000, 2));
    viewer.deliver(painter, &first).expect("first");
    assert_eq!(
        viewer.deliver(painter, &second).expect("second"),
        DeliverOutcome::Applied {
            handle: CellHandle::new(1, 0),
            evicted: Some(CellHandle::new(0, 0)),
        }
    );

    assert!(matches!(
        viewer.deliver(painter, &first).expect("again"),
        DeliverOutcome::Duplicate(_)
    ));
    assert_eq!(
        viewer.store.handles().collect::<Vec<_>>(),
        vec![CellHandle::new(1, 0)]
    );
}

#[test]
fn eviction_stays_local_but_bounded() {
    let mut rig = CanvasRig::with_options(RigOptions::default().participants(3).capacity(4));
    rig.set_network_profile(NetworkProfile::relay(), 3);
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..60 {
        let who = rng.random_range(0..3);
        let x = f64::from(rng.random_range(0..10u8));
        rig.place(who, x, 0.0);
        rig.advance_ms(5);
        rig.pump(usize::MAX);
    }
    rig.deliver_all();

    // Replicas may disagree on which cells were evicted.
    for peer in rig.peers() {
        assert!(peer.store.len() <= 4);
    }
    rig.assert_consistent();
}

#[test]
fn remote_stamp_moves_the_local_clock_forward() {
    let clock = TestClock::new(1_000);
    let mut viewer = fixtures::peer(2, 10, &clock);
    let painter = fixtures::pid(9);

    // A peer whose wall clock runs far ahead.
    let ahead = fixtures::place_frame(painter, 1, 0.0, 0.0, Rgba::RED, WriteStamp::new(90_000, 4));
    viewer.deliver(painter, &ahead).expect("deliver");

    viewer.session.set_color(Rgba::GREEN).expect("set color");
    viewer.place(0.0, 0.0);
    let cell = viewer.store.get(&CellHandle::new(0, 0)).expect("cell");
    assert_eq!(cell.color(), Rgba::GREEN);
    assert!(cell.stamp().at > WriteStamp::new(90_000, 4));
}
