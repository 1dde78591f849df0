//! Pixelroom: Stateright models.
//!
//! Each example in `examples/` checks one small machine: cell convergence
//! under unordered, duplicated delivery, and FIFO eviction order against the
//! production canvas store.

pub mod drift_guard;
pub mod toy;
