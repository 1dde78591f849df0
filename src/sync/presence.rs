//! Participant brush properties: the local publisher and the remote roster.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{ParticipantId, Rgba};

/// A participant's current brush.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrushState {
    pub color: Rgba,
    pub size: f32,
    pub erase_mode: bool,
    pub active: bool,
}

impl BrushState {
    pub fn new(color: Rgba, size: f32) -> Self {
        Self {
            color,
            size,
            erase_mode: false,
            active: true,
        }
    }
}

/// Brush state as published, with the sender's revision.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrushProperties {
    pub revision: u64,
    pub color: Rgba,
    pub size: f32,
    pub erase_mode: bool,
    pub active: bool,
}

impl BrushProperties {
    pub fn state(&self) -> BrushState {
        BrushState {
            color: self.color,
            size: self.size,
            erase_mode: self.erase_mode,
            active: self.active,
        }
    }
}

/// Owns the local brush and stamps every change with a fresh revision.
///
/// Setters return the properties to publish, or `None` when nothing changed.
#[derive(Clone, Debug)]
pub struct PropertyPublisher {
    state: BrushState,
    revision: u64,
    min_size: f32,
    max_size: f32,
}

impl PropertyPublisher {
    pub fn new(initial: BrushState, min_size: f32, max_size: f32) -> Self {
        let mut state = initial;
        state.size = clamp_size(state.size, min_size, max_size);
        Self {
            state,
            revision: 1,
            min_size,
            max_size,
        }
    }

    pub fn state(&self) -> &BrushState {
        &self.state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn current(&self) -> BrushProperties {
        BrushProperties {
            revision: self.revision,
            color: self.state.color,
            size: self.state.size,
            erase_mode: self.state.erase_mode,
            active: self.state.active,
        }
    }

    pub fn set_color(&mut self, color: Rgba) -> Option<BrushProperties> {
        self.update(|state| state.color = color)
    }

    /// Clamped to `[min_size, max_size]`.
    pub fn set_size(&mut self, size: f32) -> Option<BrushProperties> {
        let size = clamp_size(size, self.min_size, self.max_size);
        self.update(|state| state.size = size)
    }

    pub fn set_erase_mode(&mut self, erase_mode: bool) -> Option<BrushProperties> {
        self.update(|state| state.erase_mode = erase_mode)
    }

    pub fn set_active(&mut self, active: bool) -> Option<BrushProperties> {
        self.update(|state| state.active = active)
    }

    fn update(&mut self, apply: impl FnOnce(&mut BrushState)) -> Option<BrushProperties> {
        let before = self.state;
        apply(&mut self.state);
        if self.state == before {
            return None;
        }
        self.revision += 1;
        Some(self.current())
    }
}

// NaN input lands on `min`; never panics on inverted bounds.
fn clamp_size(size: f32, min: f32, max: f32) -> f32 {
    size.max(min).min(max)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RosterUpdate {
    /// Visible properties changed; `previous` is `None` for a first sighting.
    Changed { previous: Option<BrushState> },
    /// Newer revision with the same visible state.
    Unchanged,
    /// Revision not newer than the one held.
    Stale,
}

/// Latest known brush of every remote participant.
#[derive(Clone, Debug, Default)]
pub struct PeerRoster {
    peers: BTreeMap<ParticipantId, BrushProperties>,
}

impl PeerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, peer: ParticipantId, props: BrushProperties) -> RosterUpdate {
        match self.peers.get_mut(&peer) {
            Some(held) if held.revision >= props.revision => RosterUpdate::Stale,
            Some(held) => {
                let previous = held.state();
                *held = props;
                if previous == props.state() {
                    RosterUpdate::Unchanged
                } else {
                    RosterUpdate::Changed {
                        previous: Some(previous),
                    }
                }
            }
            None => {
                self.peers.insert(peer, props);
                RosterUpdate::Changed { previous: None }
            }
        }
    }

    pub fn remove(&mut self, peer: &ParticipantId) -> Option<BrushProperties> {
        self.peers.remove(peer)
    }

    pub fn get(&self, peer: &ParticipantId) -> Option<&BrushProperties> {
        self.peers.get(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &BrushProperties)> {
        self.peers.iter()
    }
}
