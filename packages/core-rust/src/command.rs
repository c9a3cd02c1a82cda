//! Outgoing commands and their lifecycle.
//!
//! A [`Command`] is shared between the application that issued it, the
//! connection that sent it and the actor executing it, so it lives behind an
//! `Arc` and keeps its mutable parts under a lock. The response is published
//! through a `watch` channel so any holder can await it.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{CommandError, TransportError};
use crate::event::Event;
use crate::lifecycle::{CommandState, InvalidActionError, Transition};
use crate::messages::{CommandPayload, Message, ProtocolNode, Variant};

/// Successful command response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Accepted,
    /// The command created something addressable under `id`.
    Ref { id: String },
}

pub type CommandResponse = Result<CommandOutcome, CommandError>;

/// Where a command is addressed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CommandTarget {
    pub call_id: Option<String>,
    pub component_id: Option<String>,
}

impl CommandTarget {
    #[must_use]
    pub fn call(call_id: impl Into<String>) -> Self {
        Self {
            call_id: Some(call_id.into()),
            component_id: None,
        }
    }

    #[must_use]
    pub fn component(component_id: impl Into<String>) -> Self {
        Self {
            call_id: None,
            component_id: Some(component_id.into()),
        }
    }

    /// Targets the translator itself.
    #[must_use]
    pub fn global() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.call_id.is_none() && self.component_id.is_none()
    }
}

struct Inner {
    payload: CommandPayload,
    state: CommandState,
    call_id: Option<String>,
    component_id: Option<String>,
    events: Vec<Event>,
}

/// A command with lifecycle state, received events and a set-once response.
pub struct Command {
    inner: Mutex<Inner>,
    response: watch::Sender<Option<CommandResponse>>,
}

impl Command {
    #[must_use]
    pub fn new(payload: CommandPayload) -> Arc<Self> {
        let (response, _) = watch::channel(None);
        Arc::new(Self {
            inner: Mutex::new(Inner {
                payload,
                state: CommandState::New,
                call_id: None,
                component_id: None,
                events: Vec::new(),
            }),
            response,
        })
    }

    #[must_use]
    pub fn payload(&self) -> CommandPayload {
        self.inner.lock().payload.clone()
    }

    #[must_use]
    pub fn variant(&self) -> Variant {
        self.inner.lock().payload.variant()
    }

    #[must_use]
    pub fn state(&self) -> CommandState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn call_id(&self) -> Option<String> {
        self.inner.lock().call_id.clone()
    }

    #[must_use]
    pub fn component_id(&self) -> Option<String> {
        self.inner.lock().component_id.clone()
    }

    pub fn set_call_id(&self, call_id: Option<String>) {
        self.inner.lock().call_id = call_id;
    }

    pub fn set_component_id(&self, component_id: Option<String>) {
        self.inner.lock().component_id = component_id;
    }

    /// Mutates the payload.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidActionError::Immutable`] once the command has been requested.
    pub fn update(&self, f: impl FnOnce(&mut CommandPayload)) -> Result<(), InvalidActionError> {
        let mut inner = self.inner.lock();
        if !inner.state.is_mutable() {
            return Err(InvalidActionError::Immutable { state: inner.state });
        }
        f(&mut inner.payload);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless the command is `new`.
    pub fn request(&self) -> Result<(), InvalidActionError> {
        self.transition(Transition::Request)
    }

    /// # Errors
    ///
    /// Fails unless the command is `requested`.
    pub fn execute(&self) -> Result<(), InvalidActionError> {
        self.transition(Transition::Execute)
    }

    /// # Errors
    ///
    /// Fails unless the command is `executing`.
    pub fn complete(&self) -> Result<(), InvalidActionError> {
        self.transition(Transition::Complete)
    }

    fn transition(&self, transition: Transition) -> Result<(), InvalidActionError> {
        let mut inner = self.inner.lock();
        inner.state = inner.state.apply(transition)?;
        Ok(())
    }

    /// Appends `event` and returns it with its source set to this command.
    ///
    /// A completion event drives the command to `complete`; one arriving for an
    /// already complete command is recorded but changes nothing.
    ///
    /// # Errors
    ///
    /// Returns the lifecycle error when a completion event arrives before the
    /// command is executing. The event is still recorded.
    pub fn add_event(self: &Arc<Self>, mut event: Event) -> Result<Event, InvalidActionError> {
        event.set_original_command(self);
        let mut inner = self.inner.lock();
        inner.events.push(event.clone());
        if event.is_complete() {
            if inner.state == CommandState::Complete {
                debug!(variant = ?inner.payload.variant(), "ignoring repeated completion");
            } else {
                inner.state = inner.state.apply(Transition::Complete)?;
            }
        }
        Ok(event)
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events.clone()
    }

    /// Sets the response once. Later calls are no-ops and return `false`.
    ///
    /// The first response drives a `new` or `requested` command to `executing`.
    /// A `Ref` outcome binds the command's component id.
    pub fn set_response(&self, response: CommandResponse) -> bool {
        let mut inner = self.inner.lock();
        if self.response.borrow().is_some() {
            return false;
        }
        if inner.state == CommandState::New {
            inner.state = CommandState::Requested;
        }
        if inner.state == CommandState::Requested {
            inner.state = CommandState::Executing;
        }
        if let Ok(CommandOutcome::Ref { id }) = &response {
            inner.component_id = Some(id.clone());
        }
        self.response.send_replace(Some(response));
        true
    }

    /// The response, if one has been set.
    #[must_use]
    pub fn response(&self) -> Option<CommandResponse> {
        self.response.borrow().clone()
    }

    /// Waits until a response is set.
    pub async fn wait_response(&self) -> CommandResponse {
        let mut rx = self.response.subscribe();
        let result = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot
                .clone()
                .unwrap_or(Err(CommandError::Transport(TransportError::Closed))),
            Err(_) => Err(CommandError::Transport(TransportError::Closed)),
        };
        result
    }

    #[must_use]
    pub fn to_node(&self) -> ProtocolNode {
        let inner = self.inner.lock();
        ProtocolNode {
            message: Message::Command(inner.payload.clone()),
            call_id: inner.call_id.clone(),
            component_id: inner.component_id.clone(),
        }
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.to_node() == other.to_node()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Command")
            .field("payload", &inner.payload)
            .field("state", &inner.state)
            .field("call_id", &inner.call_id)
            .field("component_id", &inner.component_id)
            .finish_non_exhaustive()
    }
}
