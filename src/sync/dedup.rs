//! Bounded window of recently seen message ids.

use std::collections::{HashSet, VecDeque};

use crate::core::MessageId;

pub const DEFAULT_DEDUP_WINDOW: usize = 4096;

/// Remembers the last `window` message ids, oldest forgotten first.
///
/// A window of 0 remembers nothing, so every id looks fresh.
#[derive(Clone, Debug)]
pub struct SeenLog {
    window: usize,
    order: VecDeque<MessageId>,
    seen: HashSet<MessageId>,
}

impl SeenLog {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            order: VecDeque::with_capacity(window.min(DEFAULT_DEDUP_WINDOW)),
            seen: HashSet::with_capacity(window.min(DEFAULT_DEDUP_WINDOW)),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// Record `id`. Returns false if it was already in the window.
    pub fn insert(&mut self, id: MessageId) -> bool {
        if self.window == 0 {
            return true;
        }
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.window {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

impl Default for SeenLog {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}
