//! Time primitives.
//!
//! HLC (Hybrid Logical Clock) stamps order cell writes across participants.
//! `TimeSource` is the seam for the wall clock so tests can drive time by hand.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::identity::ParticipantId;

/// Millisecond wall clock.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by `SystemTime`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// HLC timestamp - the ordering primitive.
///
/// (wall_ms, counter) forms a total order within one participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteStamp {
    pub wall_ms: u64,
    pub counter: u32,
}

impl WriteStamp {
    pub const ZERO: WriteStamp = WriteStamp {
        wall_ms: 0,
        counter: 0,
    };

    pub fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }
}

impl PartialOrd for WriteStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WriteStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wall_ms
            .cmp(&other.wall_ms)
            .then_with(|| self.counter.cmp(&other.counter))
    }
}

/// Stamp = WriteStamp + attribution.
///
/// This is what LWW compares; the participant id breaks ties deterministically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub at: WriteStamp,
    pub by: ParticipantId,
}

impl Stamp {
    pub fn new(at: WriteStamp, by: ParticipantId) -> Self {
        Self { at, by }
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then_with(|| self.by.cmp(&other.by))
    }
}

/// Hybrid Logical Clock.
///
/// Combines wall time with a logical counter so stamps stay monotonic when
/// the wall clock stalls or steps backward.
#[derive(Clone)]
pub struct Clock {
    source: Arc<dyn TimeSource>,
    wall_ms: u64,
    counter: u32,
}

impl Clock {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        let wall_ms = source.now_ms();
        Self {
            source,
            wall_ms,
            counter: 0,
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemTimeSource))
    }

    /// Generate a new stamp strictly greater than any previous one from this clock.
    pub fn tick(&mut self) -> WriteStamp {
        let now = self.source.now_ms();
        if now > self.wall_ms {
            self.wall_ms = now;
            self.counter = 0;
        } else if self.counter == u32::MAX {
            // Counter exhausted: borrow the next millisecond.
            self.wall_ms = self.wall_ms.saturating_add(1);
            self.counter = 0;
        } else {
            self.counter += 1;
        }
        WriteStamp::new(self.wall_ms, self.counter)
    }

    /// Fold in a remote stamp so the next `tick()` dominates it.
    pub fn receive(&mut self, remote: &WriteStamp) {
        if remote.wall_ms > self.wall_ms {
            self.wall_ms = remote.wall_ms;
            self.counter = remote.counter;
        } else if remote.wall_ms == self.wall_ms && remote.counter > self.counter {
            self.counter = remote.counter;
        }

        let now = self.source.now_ms();
        if now > self.wall_ms {
            self.wall_ms = now;
            self.counter = 0;
        }
    }

    /// Current wall time from the underlying source (not the HLC).
    pub fn now_ms(&self) -> u64 {
        self.source.now_ms()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("wall_ms", &self.wall_ms)
            .field("counter", &self.counter)
            .finish()
    }
}
