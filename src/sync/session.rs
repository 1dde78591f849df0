//! Replication session.
//!
//! One `Session` per participant. The host owns the [`CanvasStore`] and lends
//! it to every call that reads or mutates the canvas. Local Place requests
//! and inbound Place messages share one apply path; Erase and Clear are only
//! ever applied from the wire, so the originator waits for its own echo.
//!
//! Every cell-changing message carries an HLC stamp. Removals only take
//! writes older than themselves, which keeps replicas in agreement however
//! a Place and a racing Erase or Clear are ordered.

use crate::core::{
    CanvasStore, CellHandle, CellSnapshot, Clock, Effect, MessageId, Paint, ParticipantId,
    PlaceOutcome, Point, RangeError, Rgba, Stamp, WriteStamp,
};

use super::dedup::{DEFAULT_DEDUP_WINDOW, SeenLog};
use super::error::{DeliverError, RequestError};
use super::frame::{DEFAULT_MAX_FRAME_BYTES, decode_frame, encode_frame};
use super::observer::{CanvasObserver, NoopObserver, PeerObserver};
use super::presence::{BrushProperties, BrushState, PeerRoster, PropertyPublisher, RosterUpdate};
use super::proto::{
    ClearOp, EraseOp, Envelope, Message, MessageType, PlaceOp, decode_envelope, encode_envelope,
};
use super::throttle::{StrokeThrottle, Throttled};
use super::transport::{Target, Transport};

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub initial_brush: BrushState,
    pub min_size: f32,
    pub max_size: f32,
    pub erase_radius_multiplier: f64,
    pub draw_cooldown_ms: u64,
    pub min_stroke_distance: f64,
    pub dedup_window: usize,
    pub max_frame_bytes: usize,
    /// How far past local wall time an inbound stamp may run.
    pub max_clock_skew_ms: u64,
}

pub const DEFAULT_MAX_CLOCK_SKEW_MS: u64 = 5 * 60 * 1000;

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            initial_brush: BrushState::new(Rgba::RED, 1.0),
            min_size: 0.1,
            max_size: 10.0,
            erase_radius_multiplier: 0.5,
            draw_cooldown_ms: 50,
            min_stroke_distance: 0.5,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            max_clock_skew_ms: DEFAULT_MAX_CLOCK_SKEW_MS,
        }
    }
}

/// Why a request did nothing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SkipReason {
    Inactive,
    Cooldown { remaining_ms: u64 },
    TooClose { distance: f64 },
}

impl From<Throttled> for SkipReason {
    fn from(value: Throttled) -> Self {
        match value {
            Throttled::Cooldown { remaining_ms } => SkipReason::Cooldown { remaining_ms },
            Throttled::TooClose { distance } => SkipReason::TooClose { distance },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RequestOutcome {
    /// Applied locally and broadcast to the others.
    Placed {
        handle: CellHandle,
        outcome: PlaceOutcome,
    },
    /// Broadcast to everyone; applies when the echo is delivered.
    Sent { op: MessageType },
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliverOutcome {
    Applied {
        handle: CellHandle,
        evicted: Option<CellHandle>,
    },
    Stale {
        handle: CellHandle,
    },
    Erased(usize),
    Cleared(usize),
    PeerUpdated(ParticipantId),
    PeerLeft(ParticipantId),
    Duplicate(MessageId),
    /// Well-formed but nothing to do (own presence echo, stale properties).
    Ignored,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub sent: u64,
    pub applied: u64,
    pub stale: u64,
    pub erased: u64,
    pub cleared: u64,
    pub evicted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub broadcast_failures: u64,
    pub skipped: u64,
}

pub struct Session<T> {
    id: ParticipantId,
    settings: SessionSettings,
    transport: T,
    clock: Clock,
    next_seq: u64,
    seen: SeenLog,
    throttle: StrokeThrottle,
    brush: PropertyPublisher,
    roster: PeerRoster,
    canvas_observer: Box<dyn CanvasObserver>,
    peer_observer: Box<dyn PeerObserver>,
    stats: SessionStats,
}

impl<T: Transport> Session<T> {
    pub fn new(id: ParticipantId, settings: SessionSettings, transport: T, clock: Clock) -> Self {
        let throttle = StrokeThrottle::new(settings.draw_cooldown_ms, settings.min_stroke_distance);
        let brush = PropertyPublisher::new(
            settings.initial_brush,
            settings.min_size,
            settings.max_size,
        );
        Self {
            id,
            seen: SeenLog::new(settings.dedup_window),
            throttle,
            brush,
            settings,
            transport,
            clock,
            next_seq: 1,
            roster: PeerRoster::new(),
            canvas_observer: Box::new(NoopObserver),
            peer_observer: Box::new(NoopObserver),
            stats: SessionStats::default(),
        }
    }

    pub fn with_canvas_observer(mut self, observer: impl CanvasObserver + 'static) -> Self {
        self.canvas_observer = Box::new(observer);
        self
    }

    pub fn with_peer_observer(mut self, observer: impl PeerObserver + 'static) -> Self {
        self.peer_observer = Box::new(observer);
        self
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn brush(&self) -> &BrushState {
        self.brush.state()
    }

    pub fn roster(&self) -> &PeerRoster {
        &self.roster
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Place at `raw`, or erase there while erase mode is on.
    pub fn request_place(
        &mut self,
        store: &mut CanvasStore,
        raw: Point,
    ) -> Result<RequestOutcome, RequestError> {
        raw.validate()?;
        let brush = *self.brush.state();
        if !brush.active {
            return Ok(self.skip(SkipReason::Inactive));
        }

        let handle = store.grid().handle_for(raw);
        let position = store.grid().position_of(handle);
        let now = self.clock.now_ms();
        if let Err(throttled) = self.throttle.check(now, position) {
            return Ok(self.skip(throttled.into()));
        }
        self.throttle.record(now, position);

        if brush.erase_mode {
            return self.send_erase(position, brush.size);
        }

        let stamp = Stamp::new(self.clock.tick(), self.id);
        let paint = Paint::new(brush.color, brush.size);
        let seq = self.allocate_seq();
        self.seen.insert(MessageId::new(self.id, seq));
        let outcome = self.apply_place(store, handle, paint, stamp);
        tracing::debug!("placed {handle:?} locally: {outcome:?}");

        let message = Message::Place(PlaceOp {
            position,
            size: paint.size,
            color: paint.color,
            origin: self.id,
            stamp: stamp.at,
        });
        self.send(seq, message, Target::Others)?;
        Ok(RequestOutcome::Placed { handle, outcome })
    }

    pub fn request_erase(
        &mut self,
        store: &CanvasStore,
        raw: Point,
    ) -> Result<RequestOutcome, RequestError> {
        raw.validate()?;
        let brush = *self.brush.state();
        if !brush.active {
            return Ok(self.skip(SkipReason::Inactive));
        }
        self.send_erase(store.grid().snap(raw), brush.size)
    }

    pub fn request_clear(&mut self) -> Result<RequestOutcome, RequestError> {
        let stamp = self.clock.tick();
        let seq = self.allocate_seq();
        self.send(seq, Message::Clear(ClearOp { stamp }), Target::All)?;
        Ok(RequestOutcome::Sent {
            op: MessageType::Clear,
        })
    }

    /// Pointer released; the next place is not distance-limited.
    pub fn end_stroke(&mut self) {
        self.throttle.end_stroke();
    }

    pub fn set_color(&mut self, color: Rgba) -> Result<(), RequestError> {
        color.validate()?;
        let props = self.brush.set_color(color);
        self.publish(props)
    }

    pub fn set_size(&mut self, size: f32) -> Result<(), RequestError> {
        let props = self.brush.set_size(size);
        self.publish(props)
    }

    pub fn set_erase_mode(&mut self, erase_mode: bool) -> Result<(), RequestError> {
        let props = self.brush.set_erase_mode(erase_mode);
        self.publish(props)
    }

    pub fn set_active(&mut self, active: bool) -> Result<(), RequestError> {
        if !active {
            self.throttle.end_stroke();
        }
        let props = self.brush.set_active(active);
        self.publish(props)
    }

    /// Flip `active`. Returns the new value.
    pub fn toggle_active(&mut self) -> Result<bool, RequestError> {
        let active = !self.brush.state().active;
        self.set_active(active)?;
        tracing::info!("brush {}", if active { "enabled" } else { "disabled" });
        Ok(active)
    }

    /// Publish the current brush so peers can discover it.
    pub fn announce(&mut self) -> Result<(), RequestError> {
        tracing::info!("participant {} announcing", self.id);
        let props = self.brush.current();
        self.publish(Some(props))
    }

    pub fn leave(&mut self) -> Result<(), RequestError> {
        tracing::info!("participant {} leaving", self.id);
        let seq = self.allocate_seq();
        self.send(seq, Message::Leave, Target::Others)
    }

    /// Resident cells in insertion order; also handed to the canvas observer.
    pub fn snapshot(&mut self, store: &CanvasStore) -> Vec<CellSnapshot> {
        let cells = store.snapshot();
        self.canvas_observer.on_snapshot(&cells);
        cells
    }

    /// Adopt a peer's snapshot wholesale.
    pub fn restore(&mut self, store: &mut CanvasStore, cells: &[CellSnapshot]) -> usize {
        for cell in cells {
            self.clock.receive(&cell.stamp.at);
        }
        let resident = store.restore(cells);
        self.canvas_observer.on_canvas_cleared();
        let restored = store.snapshot();
        self.canvas_observer.on_snapshot(&restored);
        tracing::info!("restored {resident} cells from snapshot");
        resident
    }

    /// Apply one inbound frame from `origin`.
    pub fn deliver(
        &mut self,
        store: &mut CanvasStore,
        origin: ParticipantId,
        frame: &[u8],
    ) -> Result<DeliverOutcome, DeliverError> {
        match self.deliver_inner(store, origin, frame) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.stats.rejected += 1;
                tracing::warn!("rejected message from {origin}: {err}");
                self.peer_observer
                    .on_message_rejected(origin, &err.to_string());
                Err(err)
            }
        }
    }

    fn deliver_inner(
        &mut self,
        store: &mut CanvasStore,
        origin: ParticipantId,
        frame: &[u8],
    ) -> Result<DeliverOutcome, DeliverError> {
        let payload = decode_frame(frame, self.settings.max_frame_bytes)?;
        let envelope = decode_envelope(payload)?;
        if envelope.origin != origin {
            return Err(DeliverError::OriginMismatch {
                sender: origin,
                envelope: envelope.origin,
            });
        }

        let id = envelope.id();
        if self.seen.contains(&id) {
            self.stats.duplicates += 1;
            tracing::debug!("dropping duplicate {id}");
            return Ok(DeliverOutcome::Duplicate(id));
        }

        let outcome = match envelope.message {
            Message::Place(op) => self.deliver_place(store, envelope.origin, op)?,
            Message::Erase(op) => self.deliver_erase(store, envelope.origin, op)?,
            Message::Clear(op) => self.deliver_clear(store, envelope.origin, op)?,
            Message::Props(props) => self.deliver_props(envelope.origin, props)?,
            Message::Leave => self.deliver_leave(envelope.origin),
        };
        self.seen.insert(id);
        Ok(outcome)
    }

    fn deliver_place(
        &mut self,
        store: &mut CanvasStore,
        envelope_origin: ParticipantId,
        op: PlaceOp,
    ) -> Result<DeliverOutcome, DeliverError> {
        if op.origin != envelope_origin {
            return Err(DeliverError::PlaceOriginMismatch {
                envelope: envelope_origin,
                place: op.origin,
            });
        }
        op.position
            .validate()
            .map_err(|e| DeliverError::invalid(MessageType::Place, e))?;
        op.color
            .validate()
            .map_err(|e| DeliverError::invalid(MessageType::Place, e))?;
        self.check_size(MessageType::Place, op.size)?;
        self.check_stamp(MessageType::Place, &op.stamp)?;

        self.clock.receive(&op.stamp);
        let handle = store.grid().handle_for(op.position);
        let paint = Paint::new(op.color, op.size);
        let outcome = self.apply_place(store, handle, paint, Stamp::new(op.stamp, op.origin));
        tracing::debug!("applied place {handle:?} from {}: {outcome:?}", op.origin);
        Ok(match outcome {
            PlaceOutcome::Stale => DeliverOutcome::Stale { handle },
            other => DeliverOutcome::Applied {
                handle,
                evicted: other.evicted(),
            },
        })
    }

    fn deliver_erase(
        &mut self,
        store: &mut CanvasStore,
        origin: ParticipantId,
        op: EraseOp,
    ) -> Result<DeliverOutcome, DeliverError> {
        op.position
            .validate()
            .map_err(|e| DeliverError::invalid(MessageType::Erase, e))?;
        self.check_size(MessageType::Erase, op.size)?;
        self.check_stamp(MessageType::Erase, &op.stamp)?;

        self.clock.receive(&op.stamp);
        let radius = f64::from(op.size) * self.settings.erase_radius_multiplier;
        let removed = store.erase_before(op.position, radius, Stamp::new(op.stamp, origin));
        for handle in &removed {
            self.canvas_observer.on_cell_removed(*handle);
        }
        self.stats.erased += removed.len() as u64;
        tracing::debug!("erased {} cells at {:?} r={radius}", removed.len(), op.position);
        Ok(DeliverOutcome::Erased(removed.len()))
    }

    fn deliver_clear(
        &mut self,
        store: &mut CanvasStore,
        origin: ParticipantId,
        op: ClearOp,
    ) -> Result<DeliverOutcome, DeliverError> {
        self.check_stamp(MessageType::Clear, &op.stamp)?;

        self.clock.receive(&op.stamp);
        let removed = store.clear_before(Stamp::new(op.stamp, origin));
        self.stats.cleared += 1;
        self.canvas_observer.on_canvas_cleared();
        if !store.is_empty() {
            // Writes newer than the clear survived it.
            let survivors = store.snapshot();
            self.canvas_observer.on_snapshot(&survivors);
        }
        tracing::debug!("canvas cleared by {origin}: {removed} cells");
        Ok(DeliverOutcome::Cleared(removed))
    }

    fn deliver_props(
        &mut self,
        peer: ParticipantId,
        props: BrushProperties,
    ) -> Result<DeliverOutcome, DeliverError> {
        props
            .color
            .validate()
            .map_err(|e| DeliverError::invalid(MessageType::Props, e))?;
        self.check_size(MessageType::Props, props.size)?;
        if peer == self.id {
            return Ok(DeliverOutcome::Ignored);
        }

        match self.roster.apply(peer, props) {
            RosterUpdate::Changed { previous } => {
                self.peer_observer
                    .on_remote_changed(peer, &props, previous.as_ref());
                Ok(DeliverOutcome::PeerUpdated(peer))
            }
            RosterUpdate::Unchanged | RosterUpdate::Stale => Ok(DeliverOutcome::Ignored),
        }
    }

    fn deliver_leave(&mut self, peer: ParticipantId) -> DeliverOutcome {
        if peer == self.id {
            return DeliverOutcome::Ignored;
        }
        self.roster.remove(&peer);
        self.peer_observer.on_peer_left(peer);
        tracing::info!("participant {peer} left");
        DeliverOutcome::PeerLeft(peer)
    }

    /// The one path by which paint reaches the store.
    fn apply_place(
        &mut self,
        store: &mut CanvasStore,
        handle: CellHandle,
        paint: Paint,
        stamp: Stamp,
    ) -> PlaceOutcome {
        let outcome = store.place(handle, paint, stamp);
        match outcome {
            PlaceOutcome::Inserted { evicted } => {
                self.stats.applied += 1;
                if evicted == Some(handle) {
                    // Capacity 0: the cell never became resident.
                    self.stats.evicted += 1;
                    return outcome;
                }
                self.canvas_observer
                    .on_cell_placed(handle, paint.color, paint.size);
                if let Some(evicted) = evicted {
                    self.stats.evicted += 1;
                    self.canvas_observer.on_cell_removed(evicted);
                }
            }
            PlaceOutcome::Overwritten => {
                self.stats.applied += 1;
                self.canvas_observer
                    .on_cell_placed(handle, paint.color, paint.size);
            }
            PlaceOutcome::Stale => self.stats.stale += 1,
        }
        outcome
    }

    fn send_erase(&mut self, position: Point, size: f32) -> Result<RequestOutcome, RequestError> {
        let stamp = self.clock.tick();
        let seq = self.allocate_seq();
        let op = EraseOp {
            position,
            size,
            stamp,
        };
        self.send(seq, Message::Erase(op), Target::All)?;
        Ok(RequestOutcome::Sent {
            op: MessageType::Erase,
        })
    }

    fn publish(&mut self, props: Option<BrushProperties>) -> Result<(), RequestError> {
        let Some(props) = props else {
            return Ok(());
        };
        let seq = self.allocate_seq();
        self.send(seq, Message::Props(props), Target::Others)
    }

    fn send(&mut self, seq: u64, message: Message, target: Target) -> Result<(), RequestError> {
        let op = message.message_type();
        // Only Place mutates before it is sent.
        let effect = if op == MessageType::Place {
            Effect::Some
        } else {
            Effect::None
        };

        let envelope = Envelope::new(self.id, seq, message);
        let payload =
            encode_envelope(&envelope).map_err(|source| RequestError::Encode { op, source })?;
        let frame = encode_frame(&payload, self.settings.max_frame_bytes)
            .map_err(|source| RequestError::Frame { op, source })?;

        match self.transport.broadcast(frame, target) {
            Ok(()) => {
                self.stats.sent += 1;
                Ok(())
            }
            Err(source) => {
                self.stats.broadcast_failures += 1;
                tracing::warn!("broadcast {op} #{seq} failed: {source}");
                Err(RequestError::Broadcast { op, effect, source })
            }
        }
    }

    fn check_size(&self, op: MessageType, size: f32) -> Result<(), DeliverError> {
        if !size.is_finite() || size < self.settings.min_size || size > self.settings.max_size {
            return Err(DeliverError::size_out_of_range(
                op,
                size,
                self.settings.min_size,
                self.settings.max_size,
            ));
        }
        Ok(())
    }

    /// Refuse stamps that would pin the local clock: too far ahead of wall
    /// time, or with no counter room left.
    fn check_stamp(&self, op: MessageType, stamp: &WriteStamp) -> Result<(), DeliverError> {
        let horizon = self
            .clock
            .now_ms()
            .saturating_add(self.settings.max_clock_skew_ms);
        if stamp.wall_ms > horizon {
            return Err(DeliverError::invalid(
                op,
                RangeError {
                    field: "stamp.wall_ms",
                    value: stamp.wall_ms as f64,
                    min: 0.0,
                    max: horizon as f64,
                },
            ));
        }
        if stamp.counter == u32::MAX {
            return Err(DeliverError::invalid(
                op,
                RangeError {
                    field: "stamp.counter",
                    value: f64::from(stamp.counter),
                    min: 0.0,
                    max: f64::from(u32::MAX - 1),
                },
            ));
        }
        Ok(())
    }

    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn skip(&mut self, reason: SkipReason) -> RequestOutcome {
        self.stats.skipped += 1;
        tracing::debug!("request skipped: {reason:?}");
        RequestOutcome::Skipped(reason)
    }
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("next_seq", &self.next_seq)
            .field("brush", self.brush.state())
            .field("peers", &self.roster.len())
            .field("stats", &self.stats)
            .finish()
    }
}
