//! Transport seam and an in-process room bus.
//!
//! The session hands whole frames to a [`Transport`] and never waits for an
//! acknowledgement. [`LocalBus`] is a room of bounded crossbeam channels; a
//! member whose queue fills up is dropped from the room, like a lagging
//! subscriber.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use thiserror::Error;

use crate::core::{Effect, ParticipantId, Transience};

pub const DEFAULT_MAX_PARTICIPANTS: usize = 4;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Who receives a broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// Everyone in the room except the sender.
    Others,
    /// Everyone, the sender included.
    All,
}

pub trait Transport {
    fn broadcast(&mut self, frame: Vec<u8>, target: Target) -> Result<(), TransportError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("send failed: {reason}")]
    Send { reason: String },
    #[error("transport lock poisoned")]
    LockPoisoned,
}

impl TransportError {
    pub fn transience(&self) -> Transience {
        match self {
            TransportError::Disconnected => Transience::Permanent,
            TransportError::Send { .. } => Transience::Retryable,
            TransportError::LockPoisoned => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("room is full ({max_participants} participants)")]
    RoomFull { max_participants: usize },
    #[error("participant {0} already joined")]
    AlreadyJoined(ParticipantId),
    #[error("bus limits invalid: {reason}")]
    InvalidLimits { reason: String },
    #[error("bus lock poisoned")]
    LockPoisoned,
}

impl BusError {
    pub fn transience(&self) -> Transience {
        match self {
            BusError::RoomFull { .. } => Transience::Retryable,
            BusError::AlreadyJoined(_) | BusError::InvalidLimits { .. } => Transience::Permanent,
            BusError::LockPoisoned => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusLimits {
    pub max_participants: usize,
    pub channel_capacity: usize,
}

impl BusLimits {
    pub fn new(max_participants: usize, channel_capacity: usize) -> Result<Self, BusError> {
        if max_participants == 0 {
            return Err(BusError::InvalidLimits {
                reason: "max_participants must be > 0".to_string(),
            });
        }
        if channel_capacity == 0 {
            return Err(BusError::InvalidLimits {
                reason: "channel_capacity must be > 0".to_string(),
            });
        }
        Ok(Self {
            max_participants,
            channel_capacity,
        })
    }
}

impl Default for BusLimits {
    fn default() -> Self {
        Self {
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// One frame as received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub origin: ParticipantId,
    pub frame: Arc<[u8]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    Lagged,
}

#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<Mutex<BusState>>,
}

impl LocalBus {
    pub fn new(limits: BusLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusState {
                limits,
                members: BTreeMap::new(),
            })),
        }
    }

    pub fn join(&self, id: ParticipantId) -> Result<BusEndpoint, BusError> {
        let mut state = self.inner.lock().map_err(|_| BusError::LockPoisoned)?;
        if state.members.contains_key(&id) {
            return Err(BusError::AlreadyJoined(id));
        }
        if state.members.len() >= state.limits.max_participants {
            return Err(BusError::RoomFull {
                max_participants: state.limits.max_participants,
            });
        }

        let (sender, receiver) = crossbeam::channel::bounded(state.limits.channel_capacity);
        let drop_reason = Arc::new(Mutex::new(None));
        state.members.insert(
            id,
            Member {
                sender,
                drop_reason: Arc::clone(&drop_reason),
            },
        );
        tracing::info!(participant = %id, members = state.members.len(), "joined room");

        Ok(BusEndpoint {
            id,
            bus: Arc::clone(&self.inner),
            receiver,
            drop_reason,
        })
    }

    pub fn participant_count(&self) -> Result<usize, BusError> {
        let state = self.inner.lock().map_err(|_| BusError::LockPoisoned)?;
        Ok(state.members.len())
    }
}

pub struct BusEndpoint {
    id: ParticipantId,
    bus: Arc<Mutex<BusState>>,
    receiver: Receiver<Delivery>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl BusEndpoint {
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn try_recv(&self) -> Option<Delivery> {
        match self.receiver.try_recv() {
            Ok(delivery) => Some(delivery),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Delivery> {
        match self.receiver.recv_timeout(timeout) {
            Ok(delivery) => Some(delivery),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything queued right now.
    pub fn drain(&self) -> Vec<Delivery> {
        self.receiver.try_iter().collect()
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        self.drop_reason.lock().ok().and_then(|guard| *guard)
    }
}

impl Transport for BusEndpoint {
    fn broadcast(&mut self, frame: Vec<u8>, target: Target) -> Result<(), TransportError> {
        let mut state = self.bus.lock().map_err(|_| TransportError::LockPoisoned)?;
        if !state.members.contains_key(&self.id) {
            return Err(TransportError::Disconnected);
        }

        let delivery = Delivery {
            origin: self.id,
            frame: Arc::from(frame),
        };
        let mut dropped = Vec::new();
        for (id, member) in &state.members {
            if target == Target::Others && *id == self.id {
                continue;
            }
            match member.sender.try_send(delivery.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    member.set_drop_reason(DropReason::Lagged);
                    dropped.push(*id);
                }
                Err(TrySendError::Disconnected(_)) => dropped.push(*id),
            }
        }

        for id in dropped {
            tracing::warn!(participant = %id, "dropping lagged participant from room");
            state.members.remove(&id);
        }
        Ok(())
    }
}

impl Drop for BusEndpoint {
    fn drop(&mut self) {
        if let Ok(mut state) = self.bus.lock()
            && state.members.remove(&self.id).is_some()
        {
            tracing::info!(participant = %self.id, "left room");
        }
    }
}

struct BusState {
    limits: BusLimits,
    members: BTreeMap<ParticipantId, Member>,
}

struct Member {
    sender: Sender<Delivery>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl Member {
    fn set_drop_reason(&self, reason: DropReason) {
        if let Ok(mut guard) = self.drop_reason.lock()
            && guard.is_none()
        {
            *guard = Some(reason);
        }
    }
}
