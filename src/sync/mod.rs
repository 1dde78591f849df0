//! Canvas replication: wire format, transport seam, and the per-participant
//! session that applies local and remote operations.

pub mod dedup;
pub mod error;
pub mod frame;
pub mod observer;
pub mod presence;
pub mod proto;
pub mod session;
pub mod throttle;
pub mod transport;

pub use dedup::SeenLog;
pub use error::{DeliverError, RequestError};
pub use frame::{FrameError, decode_frame, encode_frame};
pub use observer::{CanvasObserver, NoopObserver, PeerObserver};
pub use presence::{BrushProperties, BrushState, PeerRoster, PropertyPublisher, RosterUpdate};
pub use proto::{
    ClearOp, Envelope, EraseOp, Message, MessageType, PROTOCOL_VERSION_V1, PlaceOp, ProtoDecodeError,
    ProtoEncodeError, decode_envelope, encode_envelope,
};
pub use session::{
    DeliverOutcome, RequestOutcome, Session, SessionSettings, SessionStats, SkipReason,
};
pub use throttle::{StrokeThrottle, Throttled};
pub use transport::{
    BusEndpoint, BusError, BusLimits, Delivery, DropReason, LocalBus, Target, Transport,
    TransportError,
};
