use thiserror::Error;

use crate::config::ConfigError;
use crate::core::CoreError;
use crate::sync::{BusError, DeliverError, RequestError, TransportError};

pub use crate::core::{Effect, Transience};

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over canonical capability errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Deliver(#[from] DeliverError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Core(e) => e.transience(),
            Error::Request(e) => e.transience(),
            Error::Deliver(e) => e.transience(),
            Error::Transport(e) => e.transience(),
            Error::Bus(e) => e.transience(),
            Error::Config(e) => e.transience(),
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Core(e) => e.effect(),
            Error::Request(e) => e.effect(),
            Error::Deliver(e) => e.effect(),
            Error::Transport(e) => e.effect(),
            Error::Bus(e) => e.effect(),
            Error::Config(e) => e.effect(),
        }
    }
}
