//! Model: bounded FIFO eviction on a single replica.
//!
//! A reference list tracks cells oldest-first. Every reachable history is
//! replayed on the production `CanvasStore`, whose order and colors must match
//! the reference. Overwrites keep their position; a new cell past capacity
//! evicts the oldest.

use pixelroom_stateright_models::toy::{self, StoreOp};
use stateright::{Checker, Model, Property, report::WriteReporter};
use std::time::Duration;

pub const CAPACITY: usize = 2;
const CELLS: u8 = 3;
const COLORS: u8 = 2;
const MAX_OPS: usize = 4;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct State {
    pub ops: Vec<StoreOp>,
    /// (cell, color), oldest first.
    pub reference: Vec<(u8, u8)>,
}

#[derive(Clone, Debug)]
pub struct EvictionQueueModel;

impl Model for EvictionQueueModel {
    type State = State;
    type Action = StoreOp;

    fn init_states(&self) -> Vec<Self::State> {
        vec![State {
            ops: Vec::new(),
            reference: Vec::new(),
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        if state.ops.len() >= MAX_OPS {
            return;
        }
        for cell in 0..CELLS {
            for color in 0..COLORS {
                actions.push(StoreOp::Place { cell, color });
            }
            actions.push(StoreOp::Erase(cell));
        }
        actions.push(StoreOp::Clear);
    }

    fn next_state(&self, state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut next = state.clone();
        match action {
            StoreOp::Place { cell, color } => {
                if let Some(entry) = next.reference.iter_mut().find(|(c, _)| *c == cell) {
                    entry.1 = color;
                } else {
                    next.reference.push((cell, color));
                    if next.reference.len() > CAPACITY {
                        next.reference.remove(0);
                    }
                }
            }
            StoreOp::Erase(cell) => next.reference.retain(|(c, _)| *c != cell),
            StoreOp::Clear => next.reference.clear(),
        }
        next.ops.push(action);
        Some(next)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("store order matches reference", |_, s: &State| {
                toy::replay(CAPACITY, &s.ops).is_some_and(|store| {
                    let order: Vec<_> = store.handles().collect();
                    let expected: Vec<_> =
                        s.reference.iter().map(|(c, _)| toy::handle(*c)).collect();
                    order == expected
                })
            }),
            Property::always("store colors match reference", |_, s: &State| {
                toy::replay(CAPACITY, &s.ops).is_some_and(|store| {
                    s.reference.iter().all(|(cell, color)| {
                        let held = store.get(&toy::handle(*cell)).map(|c| c.color());
                        held == Some(toy::color(*color))
                    })
                })
            }),
            Property::always("store stays bounded and consistent", |_, s: &State| {
                toy::replay(CAPACITY, &s.ops)
                    .is_some_and(|store| store.len() <= CAPACITY && store.is_consistent())
            }),
            Property::sometimes("overwritten oldest cell is still evicted first", |_, s: &State| {
                let [
                    StoreOp::Place { cell: a, .. },
                    StoreOp::Place { cell: b, .. },
                    StoreOp::Place { cell: c, .. },
                    StoreOp::Place { cell: d, .. },
                ] = s.ops.as_slice()
                else {
                    return false;
                };
                a != b
                    && c == a
                    && d != a
                    && d != b
                    && s.reference.iter().map(|(cell, _)| cell).eq([b, d])
            }),
        ]
    }
}

fn main() -> Result<(), pico_args::Error> {
    env_logger::init();

    let mut args = pico_args::Arguments::from_env();
    match args.subcommand()?.as_deref() {
        Some("explore") => {
            let address = args
                .opt_free_from_str()?
                .unwrap_or("localhost:3000".to_string());
            println!("Exploring eviction queue state space on {address}.");
            EvictionQueueModel
                .checker()
                .threads(num_cpus::get())
                .timeout(Duration::from_secs(60))
                .serve(address);
        }
        Some("check") | None => {
            println!("Model checking FIFO eviction order.");
            EvictionQueueModel
                .checker()
                .threads(num_cpus::get())
                .timeout(Duration::from_secs(60))
                .spawn_dfs()
                .report(&mut WriteReporter::new(&mut std::io::stdout()));
        }
        _ => {
            println!("USAGE:");
            println!("  eviction_queue_machine check");
            println!("  eviction_queue_machine explore [ADDRESS]");
        }
    }

    Ok(())
}
