//! Error taxonomy shared by the correlation engine, translators and applications.

use std::time::Duration;

use serde::Serialize;

use crate::lifecycle::InvalidActionError;

/// Well-known protocol error names produced by routing.
pub mod names {
    pub const CALL_NOT_FOUND: &str = "call-not-found";
    pub const COMPONENT_NOT_FOUND: &str = "component-not-found";
    pub const COMMAND_NOT_ACCEPTABLE: &str = "command-not-acceptable";
    pub const ERROR: &str = "error";
}

/// A well-formed but semantically invalid backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{name}: {}", .text.as_deref().unwrap_or("no details"))]
pub struct ProtocolError {
    pub name: String,
    pub text: Option<String>,
    pub call_id: Option<String>,
    pub component_id: Option<String>,
}

impl ProtocolError {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        text: Option<String>,
        call_id: Option<String>,
        component_id: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            text,
            call_id,
            component_id,
        }
    }

    #[must_use]
    pub fn call_not_found(call_id: &str) -> Self {
        Self::new(
            names::CALL_NOT_FOUND,
            Some(format!("Could not find a call with ID {call_id}")),
            Some(call_id.to_string()),
            None,
        )
    }

    #[must_use]
    pub fn component_not_found(component_id: &str) -> Self {
        Self::new(
            names::COMPONENT_NOT_FOUND,
            Some(format!("Could not find a component with ID {component_id}")),
            None,
            Some(component_id.to_string()),
        )
    }

    #[must_use]
    pub fn command_not_acceptable() -> Self {
        Self::new(
            names::COMMAND_NOT_ACCEPTABLE,
            Some("Did not understand command".to_string()),
            None,
            None,
        )
    }
}

/// Failure of the underlying connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum TransportError {
    #[error("no reply after {}ms", .after.as_millis())]
    Timeout { after: Duration },
    #[error("transport closed")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
    #[error("unattributed fault for id {id}: {reason}")]
    Unattributed { id: String, reason: String },
}

/// Everything a command's response can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    InvalidAction(#[from] InvalidActionError),
}

impl CommandError {
    /// Returns the protocol error name when this is a protocol error.
    #[must_use]
    pub fn protocol_name(&self) -> Option<&str> {
        match self {
            Self::Protocol(err) => Some(&err.name),
            _ => None,
        }
    }
}
