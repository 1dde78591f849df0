//! Deterministic multi-participant rig for convergence tests.
//!
//! Every participant gets its own [`Session`] and [`CanvasStore`]. Broadcasts
//! land in one shared simulated network that applies seeded latency, jitter,
//! duplication and reordering. Nothing is lost, so delivery stays
//! at-least-once.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::{
    CanvasStore, CellHandle, CellSnapshot, Clock, Grid, Paint, ParticipantId, Point, Rgba, Stamp,
    TimeSource,
};
use crate::sync::{
    BrushProperties, BrushState, CanvasObserver, DeliverError, DeliverOutcome, PeerObserver,
    RequestError, RequestOutcome, Session, SessionSettings, Target, Transport, TransportError,
};

#[derive(Clone, Debug)]
pub struct TestClock {
    now: Arc<AtomicU64>,
}

impl TestClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// An HLC reading this clock.
    pub fn hlc(&self) -> Clock {
        Clock::new(Arc::new(self.clone()))
    }
}

impl TimeSource for TestClock {
    fn now_ms(&self) -> u64 {
        TestClock::now_ms(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkProfile {
    pub base_latency_ms: u64,
    pub jitter_ms: u64,
    pub duplicate_rate: f64,
    pub reorder_rate: f64,
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self {
            base_latency_ms: 0,
            jitter_ms: 0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
        }
    }
}

impl NetworkProfile {
    /// A relayed room: tens of milliseconds, some duplicates, some reordering.
    pub fn relay() -> Self {
        Self {
            base_latency_ms: 20,
            jitter_ms: 40,
            duplicate_rate: 0.05,
            reorder_rate: 0.1,
        }
    }

    fn sample_delay_ms(&self, rng: &mut StdRng) -> u64 {
        let jitter = if self.jitter_ms > 0 {
            rng.random_range(0..=self.jitter_ms)
        } else {
            0
        };
        self.base_latency_ms.saturating_add(jitter)
    }
}

#[derive(Clone, Debug)]
struct ScheduledFrame {
    deliver_at_ms: u64,
    order: u64,
    origin: usize,
    to: usize,
    frame: Arc<[u8]>,
}

#[derive(Debug)]
struct SimNetwork {
    now_ms: u64,
    next_order: u64,
    participants: usize,
    queue: Vec<ScheduledFrame>,
    fail_next: Vec<bool>,
    profile: NetworkProfile,
    rng: StdRng,
    sent_frames: u64,
}

impl SimNetwork {
    fn new(participants: usize) -> Self {
        Self {
            now_ms: 0,
            next_order: 0,
            participants,
            queue: Vec::new(),
            fail_next: vec![false; participants],
            profile: NetworkProfile::default(),
            rng: StdRng::seed_from_u64(0),
            sent_frames: 0,
        }
    }

    fn broadcast(&mut self, origin: usize, frame: Vec<u8>, target: Target) -> Result<(), TransportError> {
        if std::mem::take(&mut self.fail_next[origin]) {
            return Err(TransportError::Send {
                reason: "injected failure".to_string(),
            });
        }
        self.sent_frames += 1;
        let frame: Arc<[u8]> = Arc::from(frame);
        for to in 0..self.participants {
            if target == Target::Others && to == origin {
                continue;
            }
            self.schedule(origin, to, Arc::clone(&frame));
            if self.roll(self.profile.duplicate_rate) {
                self.schedule(origin, to, Arc::clone(&frame));
            }
        }
        Ok(())
    }

    fn schedule(&mut self, origin: usize, to: usize, frame: Arc<[u8]>) {
        let delay = if self.roll(self.profile.reorder_rate) {
            // Jump the queue: ready immediately, ahead of anything in flight.
            0
        } else {
            self.profile.sample_delay_ms(&mut self.rng)
        };
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(ScheduledFrame {
            deliver_at_ms: self.now_ms.saturating_add(delay),
            order,
            origin,
            to,
            frame,
        });
    }

    /// The next frame due at or before `now_ms`.
    fn pop_ready(&mut self) -> Option<ScheduledFrame> {
        let idx = self
            .queue
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.deliver_at_ms <= self.now_ms)
            .min_by_key(|(_, frame)| (frame.deliver_at_ms, frame.order))
            .map(|(idx, _)| idx)?;
        Some(self.queue.swap_remove(idx))
    }

    fn next_due_ms(&self) -> Option<u64> {
        self.queue.iter().map(|frame| frame.deliver_at_ms).min()
    }

    fn roll(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        let value: f64 = self.rng.random();
        value < rate
    }
}

/// One participant's handle onto the simulated network.
#[derive(Clone, Debug)]
pub struct SimTransport {
    index: usize,
    net: Rc<RefCell<SimNetwork>>,
}

impl Transport for SimTransport {
    fn broadcast(&mut self, frame: Vec<u8>, target: Target) -> Result<(), TransportError> {
        self.net.borrow_mut().broadcast(self.index, frame, target)
    }
}

/// Transport that keeps every frame for the test to route by hand.
#[derive(Clone, Debug, Default)]
pub struct CaptureTransport {
    sent: Rc<RefCell<Vec<(Target, Vec<u8>)>>>,
    fail_next: Rc<RefCell<bool>>,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(Target, Vec<u8>)> {
        self.sent.borrow().clone()
    }

    /// Drain what was sent so far.
    pub fn take(&self) -> Vec<(Target, Vec<u8>)> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    pub fn last_frame(&self) -> Option<Vec<u8>> {
        self.sent.borrow().last().map(|(_, frame)| frame.clone())
    }

    pub fn fail_next(&self) {
        *self.fail_next.borrow_mut() = true;
    }
}

impl Transport for CaptureTransport {
    fn broadcast(&mut self, frame: Vec<u8>, target: Target) -> Result<(), TransportError> {
        if std::mem::take(&mut *self.fail_next.borrow_mut()) {
            return Err(TransportError::Send {
                reason: "injected failure".to_string(),
            });
        }
        self.sent.borrow_mut().push((target, frame));
        Ok(())
    }
}

/// A session over a [`CaptureTransport`], with its store and recorder.
pub struct CapturedPeer {
    pub session: Session<CaptureTransport>,
    pub store: CanvasStore,
    pub transport: CaptureTransport,
    pub events: Recorder,
}

impl CapturedPeer {
    /// `seed` picks the participant id; higher seeds win stamp ties.
    pub fn new(seed: u8, settings: SessionSettings, store: CanvasStore, clock: &TestClock) -> Self {
        let transport = CaptureTransport::new();
        let events = Recorder::new();
        let session = Session::new(
            ParticipantId::from_bytes([seed; 16]),
            settings,
            transport.clone(),
            clock.hlc(),
        )
        .with_canvas_observer(events.clone())
        .with_peer_observer(events.clone());
        Self {
            session,
            store,
            transport,
            events,
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.session.id()
    }

    pub fn place(&mut self, x: f64, y: f64) -> RequestOutcome {
        self.session
            .request_place(&mut self.store, Point::new(x, y))
            .expect("place request")
    }

    pub fn deliver(
        &mut self,
        origin: ParticipantId,
        frame: &[u8],
    ) -> Result<DeliverOutcome, DeliverError> {
        self.session.deliver(&mut self.store, origin, frame)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Placed {
        handle: CellHandle,
        color: Rgba,
        size: f32,
    },
    Removed(CellHandle),
    Cleared,
    Snapshot(usize),
    RemoteChanged {
        peer: ParticipantId,
        props: BrushProperties,
        previous: Option<BrushState>,
    },
    PeerLeft(ParticipantId),
    Rejected {
        origin: ParticipantId,
        reason: String,
    },
}

/// Observer that records every callback in order.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    events: Rc<RefCell<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    fn push(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl CanvasObserver for Recorder {
    fn on_cell_placed(&mut self, handle: CellHandle, color: Rgba, size: f32) {
        self.push(Event::Placed {
            handle,
            color,
            size,
        });
    }

    fn on_cell_removed(&mut self, handle: CellHandle) {
        self.push(Event::Removed(handle));
    }

    fn on_canvas_cleared(&mut self) {
        self.push(Event::Cleared);
    }

    fn on_snapshot(&mut self, cells: &[CellSnapshot]) {
        self.push(Event::Snapshot(cells.len()));
    }
}

impl PeerObserver for Recorder {
    fn on_remote_changed(
        &mut self,
        peer: ParticipantId,
        props: &BrushProperties,
        previous: Option<&BrushState>,
    ) {
        self.push(Event::RemoteChanged {
            peer,
            props: *props,
            previous: previous.copied(),
        });
    }

    fn on_peer_left(&mut self, peer: ParticipantId) {
        self.push(Event::PeerLeft(peer));
    }

    fn on_message_rejected(&mut self, origin: ParticipantId, reason: &str) {
        self.push(Event::Rejected {
            origin,
            reason: reason.to_string(),
        });
    }
}

#[derive(Clone, Debug)]
pub struct RigOptions {
    pub participants: usize,
    pub cell_size: f64,
    pub capacity: usize,
    pub settings: SessionSettings,
    pub start_ms: u64,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            participants: 3,
            cell_size: 1.0,
            capacity: 1000,
            settings: SessionSettings {
                draw_cooldown_ms: 0,
                min_stroke_distance: 0.0,
                ..SessionSettings::default()
            },
            start_ms: 1_000,
        }
    }
}

impl RigOptions {
    pub fn participants(mut self, participants: usize) -> Self {
        self.participants = participants;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn cell_size(mut self, cell_size: f64) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }
}

pub struct RigPeer {
    pub session: Session<SimTransport>,
    pub store: CanvasStore,
    pub events: Recorder,
}

impl RigPeer {
    pub fn id(&self) -> ParticipantId {
        self.session.id()
    }

    /// Resident paint keyed by handle, ignoring local insertion order.
    pub fn canvas(&self) -> Vec<(CellHandle, Paint, Stamp)> {
        let mut cells: Vec<_> = self
            .store
            .snapshot()
            .into_iter()
            .map(|cell| (cell.handle, Paint::new(cell.color, cell.size), cell.stamp))
            .collect();
        cells.sort_by_key(|(handle, _, _)| *handle);
        cells
    }
}

pub struct CanvasRig {
    clock: TestClock,
    net: Rc<RefCell<SimNetwork>>,
    peers: Vec<RigPeer>,
}

impl CanvasRig {
    pub fn new(participants: usize) -> Self {
        Self::with_options(RigOptions::default().participants(participants))
    }

    pub fn with_options(options: RigOptions) -> Self {
        assert!(options.participants >= 1, "canvas rig needs a participant");
        let grid = Grid::new(options.cell_size).expect("rig cell size");
        let clock = TestClock::new(options.start_ms);
        let net = Rc::new(RefCell::new(SimNetwork::new(options.participants)));
        net.borrow_mut().now_ms = options.start_ms;

        let peers = (0..options.participants)
            .map(|index| {
                let id = ParticipantId::from_bytes([index as u8 + 1; 16]);
                let transport = SimTransport {
                    index,
                    net: Rc::clone(&net),
                };
                let events = Recorder::new();
                let session = Session::new(id, options.settings.clone(), transport, clock.hlc())
                    .with_canvas_observer(events.clone())
                    .with_peer_observer(events.clone());
                RigPeer {
                    session,
                    store: CanvasStore::new(grid, options.capacity),
                    events,
                }
            })
            .collect();

        Self { clock, net, peers }
    }

    pub fn clock(&self) -> TestClock {
        self.clock.clone()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn peer(&self, index: usize) -> &RigPeer {
        &self.peers[index]
    }

    pub fn peer_mut(&mut self, index: usize) -> &mut RigPeer {
        &mut self.peers[index]
    }

    pub fn peers(&self) -> &[RigPeer] {
        &self.peers
    }

    pub fn id(&self, index: usize) -> ParticipantId {
        self.peers[index].id()
    }

    pub fn set_network_profile(&mut self, profile: NetworkProfile, seed: u64) {
        let mut net = self.net.borrow_mut();
        net.profile = profile;
        net.rng = StdRng::seed_from_u64(seed);
    }

    /// The next broadcast from `index` fails before reaching the network.
    pub fn fail_next_broadcast(&mut self, index: usize) {
        self.net.borrow_mut().fail_next[index] = true;
    }

    /// Frames accepted by the network so far.
    pub fn sent_frames(&self) -> u64 {
        self.net.borrow().sent_frames
    }

    pub fn pending(&self) -> usize {
        self.net.borrow().queue.len()
    }

    pub fn advance_ms(&mut self, delta_ms: u64) {
        self.clock.advance_ms(delta_ms);
        let mut net = self.net.borrow_mut();
        net.now_ms = self.clock.now_ms();
    }

    pub fn try_place(
        &mut self,
        index: usize,
        x: f64,
        y: f64,
    ) -> Result<RequestOutcome, RequestError> {
        let peer = &mut self.peers[index];
        peer.session.request_place(&mut peer.store, Point::new(x, y))
    }

    pub fn place(&mut self, index: usize, x: f64, y: f64) -> RequestOutcome {
        self.try_place(index, x, y).expect("place request")
    }

    pub fn erase(&mut self, index: usize, x: f64, y: f64) -> RequestOutcome {
        let peer = &mut self.peers[index];
        peer.session
            .request_erase(&peer.store, Point::new(x, y))
            .expect("erase request")
    }

    pub fn clear(&mut self, index: usize) -> RequestOutcome {
        self.peers[index]
            .session
            .request_clear()
            .expect("clear request")
    }

    pub fn session_mut(&mut self, index: usize) -> &mut Session<SimTransport> {
        &mut self.peers[index].session
    }

    /// Deliver everything already due. Returns how many frames were handed over.
    pub fn pump(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps {
            let next = self.net.borrow_mut().pop_ready();
            let Some(scheduled) = next else {
                break;
            };
            let origin = self.peers[scheduled.origin].id();
            let peer = &mut self.peers[scheduled.to];
            // Rejections are counted in the receiver's stats.
            let _ = peer
                .session
                .deliver(&mut peer.store, origin, &scheduled.frame);
            steps += 1;
        }
        steps
    }

    /// Pump, moving time forward to each next due frame, until nothing is in flight.
    pub fn deliver_all(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..100_000 {
            delivered += self.pump(usize::MAX);
            let next_due = self.net.borrow().next_due_ms();
            let Some(due) = next_due else {
                return delivered;
            };
            let now = self.clock.now_ms();
            self.advance_ms(due.saturating_sub(now).max(1));
        }
        panic!("canvas rig network never drained");
    }

    /// Hand a raw frame to `to` as if `origin` had sent it.
    pub fn inject(
        &mut self,
        to: usize,
        origin: ParticipantId,
        frame: &[u8],
    ) -> Result<DeliverOutcome, DeliverError> {
        let peer = &mut self.peers[to];
        peer.session.deliver(&mut peer.store, origin, frame)
    }

    pub fn converged(&self) -> bool {
        let mut canvases = self.peers.iter().map(RigPeer::canvas);
        let Some(first) = canvases.next() else {
            return true;
        };
        canvases.all(|canvas| canvas == first)
    }

    pub fn assert_converged(&self) {
        if self.converged() {
            return;
        }
        let summary: Vec<_> = self
            .peers
            .iter()
            .map(|peer| (peer.id(), peer.store.len()))
            .collect();
        panic!("canvas rig not converged: {summary:?}");
    }

    pub fn assert_consistent(&self) {
        for peer in &self.peers {
            assert!(
                peer.store.is_consistent(),
                "store of {} drifted from its eviction queue",
                peer.id()
            );
        }
    }
}
