//! Sessions wired through the in-process room bus.

use std::thread;
use std::time::Duration;

use pixelroom::core::{CanvasStore, CellHandle, Clock, Point, Rgba};
use pixelroom::sync::{
    BusEndpoint, BusError, BusLimits, DropReason, LocalBus, RequestError, Session, TransportError,
};
use pixelroom::test_harness::TestClock;

use crate::fixtures;

struct BusPeer {
    session: Session<BusEndpoint>,
    store: CanvasStore,
}

fn join(bus: &LocalBus, seed: u8, clock: Clock) -> BusPeer {
    let endpoint = bus.join(fixtures::pid(seed)).expect("join");
    BusPeer {
        session: Session::new(fixtures::pid(seed), fixtures::unthrottled(), endpoint, clock),
        store: fixtures::store(100),
    }
}

/// Drain every endpoint into its session until the room goes quiet.
fn pump(peers: &mut [BusPeer]) -> usize {
    let mut delivered = 0;
    loop {
        let mut moved = 0;
        for peer in peers.iter_mut() {
            for delivery in peer.session.transport().drain() {
                peer.session
                    .deliver(&mut peer.store, delivery.origin, &delivery.frame)
                    .expect("deliver");
                moved += 1;
            }
        }
        if moved == 0 {
            return delivered;
        }
        delivered += moved;
    }
}

fn place(peer: &mut BusPeer, x: f64, y: f64) {
    peer.session
        .request_place(&mut peer.store, Point::new(x, y))
        .expect("place");
}

fn handles(store: &CanvasStore) -> Vec<CellHandle> {
    store.handles().collect()
}

#[test]
fn sessions_share_a_canvas_over_the_bus() {
    let clock = TestClock::new(1_000);
    let bus = LocalBus::new(BusLimits::default());
    let mut peers: Vec<BusPeer> = (1..=3).map(|seed| join(&bus, seed, clock.hlc())).collect();

    place(&mut peers[0], 0.0, 0.0);
    peers[1].session.set_color(Rgba::GREEN).expect("color");
    place(&mut peers[1], 1.0, 0.0);
    // Two places plus one property update, each reaching two peers.
    assert_eq!(pump(&mut peers), 6);

    let expected = vec![CellHandle::new(0, 0), CellHandle::new(1, 0)];
    for peer in &peers {
        assert_eq!(handles(&peer.store), expected);
    }
    assert_eq!(
        peers[2]
            .store
            .get(&CellHandle::new(1, 0))
            .map(|cell| cell.color()),
        Some(Rgba::GREEN)
    );
    assert!(peers[2].session.roster().get(&fixtures::pid(2)).is_some());

    let BusPeer { session, store } = &mut peers[2];
    session
        .request_erase(store, Point::new(0.0, 0.0))
        .expect("erase");
    // Erase echoes back to its sender.
    assert_eq!(pump(&mut peers), 3);
    for peer in &peers {
        assert_eq!(handles(&peer.store), vec![CellHandle::new(1, 0)]);
    }

    peers[0].session.request_clear().expect("clear");
    pump(&mut peers);
    for peer in &peers {
        assert!(peer.store.is_empty());
    }
}

#[test]
fn full_room_turns_away_late_joiners() {
    let bus = LocalBus::new(BusLimits::new(2, 16).expect("limits"));
    let first = bus.join(fixtures::pid(1)).expect("first");
    let _second = bus.join(fixtures::pid(2)).expect("second");

    let err = bus.join(fixtures::pid(3)).err().expect("room full");
    assert_eq!(err, BusError::RoomFull { max_participants: 2 });
    assert!(err.transience().is_retryable());

    drop(first);
    assert_eq!(bus.participant_count().expect("count"), 1);
    bus.join(fixtures::pid(3)).expect("seat freed");
}

#[test]
fn lagging_participant_is_dropped_from_the_room() {
    let clock = TestClock::new(1_000);
    let bus = LocalBus::new(BusLimits::new(4, 2).expect("limits"));
    let mut painter = join(&bus, 1, clock.hlc());
    let mut slow = join(&bus, 2, clock.hlc());

    for x in 0..3 {
        place(&mut painter, f64::from(x), 0.0);
    }
    assert_eq!(slow.session.transport().drop_reason(), Some(DropReason::Lagged));
    assert_eq!(bus.participant_count().expect("count"), 1);

    let err = slow.session.request_clear().unwrap_err();
    assert!(matches!(
        err,
        RequestError::Broadcast {
            source: TransportError::Disconnected,
            ..
        }
    ));
    assert!(!err.transience().is_retryable());
    assert!(slow.store.is_empty());
}

#[test]
fn painters_on_separate_threads_converge() {
    const STROKES: u8 = 20;
    let bus = LocalBus::new(BusLimits::default());
    let endpoints = [
        bus.join(fixtures::pid(1)).expect("join"),
        bus.join(fixtures::pid(2)).expect("join"),
    ];

    let workers: Vec<_> = endpoints
        .into_iter()
        .enumerate()
        .map(|(row, endpoint)| {
            thread::spawn(move || {
                let id = endpoint.id();
                let mut session =
                    Session::new(id, fixtures::unthrottled(), endpoint, Clock::system());
                let mut store = fixtures::store(100);
                for x in 0..STROKES {
                    session
                        .request_place(&mut store, Point::new(f64::from(x), row as f64))
                        .expect("place");
                }

                let mut idle = 0;
                while store.len() < usize::from(STROKES) * 2 && idle < 200 {
                    match session.transport().recv_timeout(Duration::from_millis(10)) {
                        Some(delivery) => {
                            session
                                .deliver(&mut store, delivery.origin, &delivery.frame)
                                .expect("deliver");
                            idle = 0;
                        }
                        None => idle += 1,
                    }
                }
                let mut cells = handles(&store);
                cells.sort();
                cells
            })
        })
        .collect();

    let results: Vec<Vec<CellHandle>> = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker"))
        .collect();
    assert_eq!(results[0].len(), usize::from(STROKES) * 2);
    assert_eq!(results[0], results[1]);
}
