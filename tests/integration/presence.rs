//! Brush property publication, erase mode, activity gating and leave.

use pixelroom::core::{CellHandle, Rgba};
use pixelroom::sync::{
    BrushProperties, DeliverOutcome, Message, MessageType, RequestOutcome, SkipReason, Target,
};
use pixelroom::test_harness::{CanvasRig, Event, TestClock};

use crate::fixtures;

#[test]
fn property_changes_reach_peers_once() {
    let mut rig = CanvasRig::new(2);
    let painter = rig.id(0);

    rig.session_mut(0).set_color(Rgba::BLUE).expect("set color");
    rig.session_mut(0).set_color(Rgba::BLUE).expect("unchanged color");
    rig.deliver_all();

    let events = rig.peer(1).events.take();
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::RemoteChanged {
            peer,
            props,
            previous,
        } => {
            assert_eq!(*peer, painter);
            assert_eq!(props.color, Rgba::BLUE);
            assert!(previous.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }

    rig.session_mut(0).set_size(4.0).expect("set size");
    rig.deliver_all();
    let events = rig.peer(1).events.take();
    assert!(matches!(
        &events[..],
        [Event::RemoteChanged { previous: Some(prev), props, .. }]
            if prev.color == Rgba::BLUE && props.size == 4.0
    ));
    assert_eq!(
        rig.peer(1).session.roster().get(&painter).map(|p| p.size),
        Some(4.0)
    );
}

#[test]
fn size_is_clamped_before_publishing() {
    let mut rig = CanvasRig::new(2);
    rig.session_mut(0).set_size(500.0).expect("set size");
    assert_eq!(rig.peer(0).session.brush().size, 10.0);
    rig.session_mut(0).set_size(-3.0).expect("set size");
    assert_eq!(rig.peer(0).session.brush().size, 0.1);
    rig.deliver_all();

    let painter = rig.id(0);
    let held = rig.peer(1).session.roster().get(&painter).copied();
    assert_eq!(held.map(|p| p.size), Some(0.1));
}

#[test]
fn older_revisions_are_ignored() {
    let clock = TestClock::new(1_000);
    let mut painter = fixtures::peer(1, 10, &clock);
    let mut viewer = fixtures::peer(2, 10, &clock);

    painter.session.set_color(Rgba::GREEN).expect("green");
    painter.session.set_color(Rgba::BLUE).expect("blue");
    let sent = painter.transport.take();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(target, _)| *target == Target::Others));

    assert_eq!(
        viewer.deliver(painter.id(), &sent[1].1).expect("newer"),
        DeliverOutcome::PeerUpdated(painter.id())
    );
    assert_eq!(
        viewer.deliver(painter.id(), &sent[0].1).expect("older"),
        DeliverOutcome::Ignored
    );
    assert_eq!(
        viewer.session.roster().get(&painter.id()).map(|p| p.color),
        Some(Rgba::BLUE)
    );
}

#[test]
fn announce_introduces_a_joiner() {
    let mut rig = CanvasRig::new(3);
    rig.session_mut(2).announce().expect("announce");
    rig.deliver_all();
    let newcomer = rig.id(2);
    for index in 0..2 {
        let roster = rig.peer(index).session.roster();
        assert_eq!(roster.len(), 1);
        assert!(roster.get(&newcomer).is_some());
    }
    assert!(rig.peer(2).session.roster().is_empty());
}

#[test]
fn erase_mode_turns_place_into_erase() {
    let mut rig = CanvasRig::new(2);
    rig.place(0, 2.0, 2.0);
    rig.deliver_all();

    rig.session_mut(1).set_erase_mode(true).expect("erase mode");
    let outcome = rig.place(1, 2.0, 2.0);
    assert_eq!(
        outcome,
        RequestOutcome::Sent {
            op: MessageType::Erase
        }
    );
    rig.deliver_all();
    for peer in rig.peers() {
        assert!(!peer.store.contains(&CellHandle::new(2, 2)));
    }
    assert!(rig.peer(0).events.events().contains(&Event::Removed(CellHandle::new(2, 2))));
}

#[test]
fn inactive_brush_skips_place_and_erase_but_not_clear() {
    let mut rig = CanvasRig::new(2);
    rig.place(0, 1.0, 1.0);
    rig.deliver_all();

    assert!(!rig.session_mut(0).toggle_active().expect("toggle"));
    assert_eq!(rig.place(0, 3.0, 3.0), RequestOutcome::Skipped(SkipReason::Inactive));
    assert_eq!(rig.erase(0, 1.0, 1.0), RequestOutcome::Skipped(SkipReason::Inactive));
    assert_eq!(
        rig.clear(0),
        RequestOutcome::Sent {
            op: MessageType::Clear
        }
    );
    rig.deliver_all();
    for peer in rig.peers() {
        assert!(peer.store.is_empty());
    }
    assert_eq!(rig.peer(0).session.stats().skipped, 2);

    assert!(rig.session_mut(0).toggle_active().expect("toggle back"));
    assert!(matches!(
        rig.place(0, 3.0, 3.0),
        RequestOutcome::Placed { .. }
    ));
}

#[test]
fn leave_drops_the_roster_entry() {
    let mut rig = CanvasRig::new(3);
    rig.session_mut(0).announce().expect("announce");
    rig.deliver_all();
    let leaver = rig.id(0);

    rig.session_mut(0).leave().expect("leave");
    rig.deliver_all();
    for index in 1..3 {
        let peer = rig.peer(index);
        assert!(peer.session.roster().get(&leaver).is_none());
        assert!(peer.events.events().contains(&Event::PeerLeft(leaver)));
    }
    assert!(!rig.peer(0).events.events().contains(&Event::PeerLeft(leaver)));
}

#[test]
fn own_property_echo_is_ignored() {
    let clock = TestClock::new(1_000);
    let mut painter = fixtures::peer(1, 10, &clock);
    let props = BrushProperties {
        revision: 9,
        color: Rgba::WHITE,
        size: 2.0,
        erase_mode: false,
        active: true,
    };
    let frame = fixtures::frame(painter.id(), 40, Message::Props(props));
    assert_eq!(
        painter.deliver(painter.id(), &frame).expect("echo"),
        DeliverOutcome::Ignored
    );
    assert!(painter.session.roster().is_empty());
}
