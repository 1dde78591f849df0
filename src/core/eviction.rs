//! FIFO eviction queue with O(1) removal from the middle.
//!
//! Nodes live in a slab (`Vec<Slot>`) linked by index; a key -> slot map makes
//! `remove` constant time. Freed slots are reused.

use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

#[derive(Clone, Debug)]
enum Slot<K> {
    Occupied { key: K, prev: usize, next: usize },
    Free { next_free: usize },
}

#[derive(Clone, Debug)]
pub struct EvictionQueue<K> {
    slots: Vec<Slot<K>>,
    index: HashMap<K, usize>,
    head: usize,
    tail: usize,
    free_head: usize,
}

impl<K: Copy + Eq + Hash> EvictionQueue<K> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            free_head: NIL,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Append `key` as the newest entry. Returns false if it was already queued.
    pub fn push(&mut self, key: K) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        let slot = Slot::Occupied {
            key,
            prev: self.tail,
            next: NIL,
        };
        let idx = if self.free_head != NIL {
            let idx = self.free_head;
            if let Slot::Free { next_free } = self.slots[idx] {
                self.free_head = next_free;
            }
            self.slots[idx] = slot;
            idx
        } else {
            self.slots.push(slot);
            self.slots.len() - 1
        };

        if self.tail != NIL {
            self.set_next(self.tail, idx);
        } else {
            self.head = idx;
        }
        self.tail = idx;
        self.index.insert(key, idx);
        true
    }

    pub fn peek_oldest(&self) -> Option<K> {
        match self.slots.get(self.head) {
            Some(Slot::Occupied { key, .. }) => Some(*key),
            _ => None,
        }
    }

    pub fn pop_oldest(&mut self) -> Option<K> {
        let key = self.peek_oldest()?;
        self.remove(&key);
        Some(key)
    }

    /// Unlink `key` wherever it sits. Returns false if it was not queued.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(idx) = self.index.remove(key) else {
            return false;
        };
        let (prev, next) = match self.slots[idx] {
            Slot::Occupied { prev, next, .. } => (prev, next),
            Slot::Free { .. } => {
                debug_assert!(false, "index pointed at a free slot");
                return false;
            }
        };

        if prev != NIL {
            self.set_next(prev, next);
        } else {
            self.head = next;
        }
        if next != NIL {
            self.set_prev(next, prev);
        } else {
            self.tail = prev;
        }

        self.slots[idx] = Slot::Free {
            next_free: self.free_head,
        };
        self.free_head = idx;
        true
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.head = NIL;
        self.tail = NIL;
        self.free_head = NIL;
    }

    /// Keys from oldest to newest.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            queue: self,
            cursor: self.head,
        }
    }

    fn set_next(&mut self, idx: usize, value: usize) {
        if let Slot::Occupied { next, .. } = &mut self.slots[idx] {
            *next = value;
        }
    }

    fn set_prev(&mut self, idx: usize, value: usize) {
        if let Slot::Occupied { prev, .. } = &mut self.slots[idx] {
            *prev = value;
        }
    }
}

impl<K: Copy + Eq + Hash> Default for EvictionQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, K> {
    queue: &'a EvictionQueue<K>,
    cursor: usize,
}

impl<K: Copy> Iterator for Iter<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        match self.queue.slots.get(self.cursor) {
            Some(Slot::Occupied { key, next, .. }) => {
                self.cursor = *next;
                Some(*key)
            }
            _ => None,
        }
    }
}
