//! Replication error types.
//!
//! Nothing here is fatal. Request errors tell the caller whether local state
//! already changed; delivery errors always leave the store untouched.

use thiserror::Error;

use crate::core::{CoreError, Effect, ParticipantId, RangeError, Transience};

use super::frame::FrameError;
use super::proto::{MessageType, ProtoDecodeError, ProtoEncodeError};
use super::transport::TransportError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("invalid request: {0}")]
    Invalid(#[from] CoreError),
    #[error("encode {op} message: {source}")]
    Encode {
        op: MessageType,
        #[source]
        source: ProtoEncodeError,
    },
    #[error("frame {op} message: {source}")]
    Frame {
        op: MessageType,
        #[source]
        source: FrameError,
    },
    #[error("broadcast {op} message: {source}")]
    Broadcast {
        op: MessageType,
        effect: Effect,
        #[source]
        source: TransportError,
    },
}

impl RequestError {
    pub fn transience(&self) -> Transience {
        match self {
            RequestError::Invalid(e) => e.transience(),
            RequestError::Encode { .. } | RequestError::Frame { .. } => Transience::Permanent,
            RequestError::Broadcast { source, .. } => source.transience(),
        }
    }

    /// `Some` when a Place was applied locally before its broadcast failed.
    pub fn effect(&self) -> Effect {
        match self {
            RequestError::Broadcast { effect, .. } => *effect,
            RequestError::Invalid(_) => Effect::None,
            // Place encodes after its optimistic apply.
            RequestError::Encode { op, .. } | RequestError::Frame { op, .. } => {
                if *op == MessageType::Place {
                    Effect::Some
                } else {
                    Effect::None
                }
            }
        }
    }
}

/// Why an inbound frame was rejected.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeliverError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Decode(#[from] ProtoDecodeError),
    #[error("envelope origin {envelope} does not match sender {sender}")]
    OriginMismatch {
        sender: ParticipantId,
        envelope: ParticipantId,
    },
    #[error("place origin {place} does not match envelope origin {envelope}")]
    PlaceOriginMismatch {
        envelope: ParticipantId,
        place: ParticipantId,
    },
    #[error("invalid {op} message: {source}")]
    Invalid {
        op: MessageType,
        #[source]
        source: CoreError,
    },
}

impl DeliverError {
    pub(crate) fn invalid(op: MessageType, source: impl Into<CoreError>) -> Self {
        DeliverError::Invalid {
            op,
            source: source.into(),
        }
    }

    pub(crate) fn size_out_of_range(op: MessageType, size: f32, min: f32, max: f32) -> Self {
        Self::invalid(
            op,
            RangeError {
                field: "size",
                value: f64::from(size),
                min: f64::from(min),
                max: f64::from(max),
            },
        )
    }

    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
