//! Model: one cell written by two participants over an unordered,
//! duplicating network.
//!
//! Each place is applied locally, then broadcast to the other replica.
//! Deliveries arrive in any order and may repeat. Replicas dedup on
//! (writer, seq) and keep the write with the highest production `Stamp`.

use pixelroom_stateright_models::toy;
use stateright::{Checker, Model, Property, report::WriteReporter};
use std::collections::BTreeSet;
use std::time::Duration;

const MAX_WRITES: u8 = 2;
const COLORS: u8 = 2;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Replica {
    A,
    B,
}

impl Replica {
    const ALL: [Replica; 2] = [Replica::A, Replica::B];

    fn index(self) -> usize {
        match self {
            Replica::A => 0,
            Replica::B => 1,
        }
    }

    fn writer(self) -> u8 {
        self.index() as u8
    }

    fn peer(self) -> Replica {
        match self {
            Replica::A => Replica::B,
            Replica::B => Replica::A,
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Write {
    pub time: u8,
    pub writer: u8,
    pub color: u8,
}

impl Write {
    fn beats(&self, other: &Write) -> bool {
        toy::stamp(self.time, self.writer) > toy::stamp(other.time, other.writer)
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Msg {
    pub to: Replica,
    pub seq: u8,
    pub write: Write,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReplicaState {
    pub cell: Option<Write>,
    pub clock: u8,
    pub writes: u8,
    pub seen: BTreeSet<(u8, u8)>,
    pub accepted: BTreeSet<Write>,
}

impl ReplicaState {
    fn new() -> Self {
        Self {
            cell: None,
            clock: 0,
            writes: 0,
            seen: BTreeSet::new(),
            accepted: BTreeSet::new(),
        }
    }

    fn apply(&mut self, write: Write) {
        self.accepted.insert(write);
        match self.cell {
            Some(held) if !write.beats(&held) => {}
            _ => self.cell = Some(write),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct State {
    pub replicas: [ReplicaState; 2],
    pub network: BTreeSet<Msg>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Action {
    Place { by: Replica, color: u8 },
    Deliver { msg: Msg, duplicate: bool },
}

#[derive(Clone, Debug)]
pub struct CellLwwModel;

impl Model for CellLwwModel {
    type State = State;
    type Action = Action;

    fn init_states(&self) -> Vec<Self::State> {
        vec![State {
            replicas: [ReplicaState::new(), ReplicaState::new()],
            network: BTreeSet::new(),
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for by in Replica::ALL {
            if state.replicas[by.index()].writes < MAX_WRITES {
                for color in 0..COLORS {
                    actions.push(Action::Place { by, color });
                }
            }
        }
        for msg in &state.network {
            for duplicate in [false, true] {
                actions.push(Action::Deliver {
                    msg: *msg,
                    duplicate,
                });
            }
        }
    }

    fn next_state(&self, state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut next = state.clone();
        match action {
            Action::Place { by, color } => {
                let replica = &mut next.replicas[by.index()];
                replica.clock += 1;
                replica.writes += 1;
                let seq = replica.writes;
                let write = Write {
                    time: replica.clock,
                    writer: by.writer(),
                    color,
                };
                replica.seen.insert((write.writer, seq));
                replica.apply(write);
                next.network.insert(Msg {
                    to: by.peer(),
                    seq,
                    write,
                });
            }
            Action::Deliver { msg, duplicate } => {
                if !duplicate {
                    next.network.remove(&msg);
                }
                let replica = &mut next.replicas[msg.to.index()];
                if !replica.seen.insert((msg.write.writer, msg.seq)) {
                    return Some(next);
                }
                replica.clock = replica.clock.max(msg.write.time);
                replica.apply(msg.write);
            }
        }
        Some(next)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("quiescent replicas agree", |_, s: &State| {
                !s.network.is_empty() || s.replicas[0].cell == s.replicas[1].cell
            }),
            Property::always("cell holds the highest accepted stamp", |_, s: &State| {
                s.replicas.iter().all(|replica| {
                    let best = replica
                        .accepted
                        .iter()
                        .copied()
                        .reduce(|best, w| if w.beats(&best) { w } else { best });
                    replica.cell == best
                })
            }),
            Property::always("clock dominates the held write", |_, s: &State| {
                s.replicas
                    .iter()
                    .all(|replica| replica.cell.is_none_or(|w| w.time <= replica.clock))
            }),
            Property::sometimes("equal clocks tie-break on writer", |_, s: &State| {
                s.replicas.iter().any(|replica| {
                    replica.accepted.iter().any(|a| {
                        replica
                            .accepted
                            .iter()
                            .any(|b| a.time == b.time && a.writer != b.writer)
                    })
                })
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
            println!("Exploring cell LWW state space on {address}.");
            CellLwwModel
                .checker()
                .threads(num_cpus::get())
                .timeout(Duration::from_secs(60))
                .serve(address);
        }
        Some("check") | None => {
            println!("Model checking cell LWW convergence.");
            CellLwwModel
                .checker()
                .threads(num_cpus::get())
                .timeout(Duration::from_secs(60))
                .spawn_dfs()
                .report(&mut WriteReporter::new(&mut std::io::stdout()));
        }
        _ => {
            println!("USAGE:");
            println!("  cell_lww_machine check");
            println!("  cell_lww_machine explore [ADDRESS]");
        }
    }

    Ok(())
}
