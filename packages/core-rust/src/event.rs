//! Events: things that happened to a call or component.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::command::Command;
use crate::messages::{EventPayload, Message, ProtocolNode, Variant};

/// Resolves a component id to the command that created it.
///
/// Implemented by connections so events can find their source lazily.
pub trait CommandLookup: Send + Sync {
    fn original_command_from_id(&self, component_id: &str) -> Option<Arc<Command>>;
}

/// An event bound to its correlation ids.
///
/// Back-references are weak: an event never keeps its command or connection alive.
#[derive(Clone)]
pub struct Event {
    payload: EventPayload,
    call_id: Option<String>,
    component_id: Option<String>,
    original_command: Option<Weak<Command>>,
    connection: Option<Weak<dyn CommandLookup>>,
}

impl Event {
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            call_id: None,
            component_id: None,
            original_command: None,
            connection: None,
        }
    }

    #[must_use]
    pub fn with_call_id(mut self, call_id: Option<String>) -> Self {
        self.call_id = call_id;
        self
    }

    #[must_use]
    pub fn with_component_id(mut self, component_id: Option<String>) -> Self {
        self.component_id = component_id;
        self
    }

    #[must_use]
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    #[must_use]
    pub fn variant(&self) -> Variant {
        self.payload.variant()
    }

    #[must_use]
    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    #[must_use]
    pub fn component_id(&self) -> Option<&str> {
        self.component_id.as_deref()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.payload.is_complete()
    }

    pub fn set_original_command(&mut self, command: &Arc<Command>) {
        self.original_command = Some(Arc::downgrade(command));
    }

    pub fn set_connection(&mut self, connection: Weak<dyn CommandLookup>) {
        self.connection = Some(connection);
    }

    /// The command this event belongs to.
    ///
    /// Uses the directly attached command when there is one, otherwise asks the
    /// owning connection to resolve `component_id`.
    #[must_use]
    pub fn source(&self) -> Option<Arc<Command>> {
        if let Some(command) = self.original_command.as_ref().and_then(Weak::upgrade) {
            return Some(command);
        }
        let connection = self.connection.as_ref()?.upgrade()?;
        connection.original_command_from_id(self.component_id.as_deref()?)
    }

    #[must_use]
    pub fn to_node(&self) -> ProtocolNode {
        ProtocolNode {
            message: Message::Event(self.payload.clone()),
            call_id: self.call_id.clone(),
            component_id: self.component_id.clone(),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
            && self.call_id == other.call_id
            && self.component_id == other.component_id
    }
}

impl Eq for Event {}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("payload", &self.payload)
            .field("call_id", &self.call_id)
            .field("component_id", &self.component_id)
            .finish_non_exhaustive()
    }
}
