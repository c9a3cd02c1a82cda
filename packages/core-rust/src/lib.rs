//! `Callwire` Core: message registry, command lifecycle, and protocol events.

pub mod command;
pub mod element;
pub mod error;
pub mod event;
pub mod headers;
pub mod lifecycle;
pub mod messages;

pub use command::{Command, CommandOutcome, CommandResponse, CommandTarget};
pub use element::Element;
pub use error::{CommandError, ProtocolError, TransportError};
pub use event::{CommandLookup, Event};
pub use headers::{Header, Headers};
pub use lifecycle::{CommandState, InvalidActionError, Transition};
pub use messages::{
    registry, CommandPayload, CompleteReason, EndReason, EventPayload, ImportError, Message,
    ProtocolNode, RejectReason, Registry, Variant,
};
