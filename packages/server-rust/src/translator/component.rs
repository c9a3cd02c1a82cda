//! Component actors: long-running operations addressed by their own id.

use std::sync::Arc;

use async_trait::async_trait;
use callwire_core::error::names;
use callwire_core::{
    Command, CommandError, CommandOutcome, CommandPayload, CompleteReason, Event, EventPayload,
    ProtocolError,
};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::agi::AgiResult;
use super::TranslatorHandle;
use crate::actor::{self, Actor, Flow};
use crate::ami::{AmiAction, AmiClient};
use crate::network::ConnectionEvent;

/// Inbox of a [`Component`].
pub enum ComponentMessage {
    Execute(Arc<Command>),
    Start(Arc<Command>),
    AgiComplete(AgiResult),
    Hangup,
}

/// Address of a running component.
#[derive(Clone)]
pub struct ComponentHandle {
    id: String,
    tx: mpsc::UnboundedSender<ComponentMessage>,
}

impl ComponentHandle {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hands a component command (e.g. `stop`) to the component.
    ///
    /// Answers `component-not-found` if the component has gone away.
    pub fn execute_command(&self, command: Arc<Command>) {
        if let Err(mpsc::error::SendError(ComponentMessage::Execute(command))) =
            self.tx.send(ComponentMessage::Execute(command))
        {
            command.set_response(Err(ProtocolError::component_not_found(&self.id).into()));
        }
    }

    pub(crate) fn start(&self, command: Arc<Command>) {
        if let Err(mpsc::error::SendError(ComponentMessage::Start(command))) =
            self.tx.send(ComponentMessage::Start(command))
        {
            command.set_response(Err(ProtocolError::component_not_found(&self.id).into()));
        }
    }

    pub(crate) fn agi_complete(&self, result: AgiResult) {
        let _ = self.tx.send(ComponentMessage::AgiComplete(result));
    }

    pub(crate) fn hangup(&self) {
        let _ = self.tx.send(ComponentMessage::Hangup);
    }
}

impl std::fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentHandle").field("id", &self.id).finish()
    }
}

/// What the component does once started.
#[derive(Debug, Clone)]
pub enum ComponentKind {
    /// A raw manager action, not tied to a call.
    AmiAction { name: String, params: Vec<(String, String)> },
    /// An AGI command on a call's channel whose `Exec` completes the component.
    Output { channel: String, agi: String },
}

pub struct Component {
    id: String,
    call_id: Option<String>,
    kind: ComponentKind,
    done: bool,
    translator: TranslatorHandle,
    ami: Arc<dyn AmiClient>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl Component {
    /// Spawns a component actor and returns its handle. Nothing happens until
    /// the handle is started.
    pub fn spawn(
        id: String,
        call_id: Option<String>,
        kind: ComponentKind,
        translator: TranslatorHandle,
        ami: Arc<dyn AmiClient>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> ComponentHandle {
        let (tx, rx) = actor::mailbox();
        let component = Self {
            id: id.clone(),
            call_id,
            kind,
            done: false,
            translator,
            ami,
            events,
        };
        actor::spawn(component, rx);
        ComponentHandle { id, tx }
    }

    async fn start(&mut self, command: Arc<Command>) {
        match self.kind.clone() {
            ComponentKind::AmiAction { name, params } => {
                command.set_response(Ok(CommandOutcome::Ref {
                    id: self.id.clone(),
                }));
                let action = params
                    .into_iter()
                    .fold(AmiAction::new(name), |action, (k, v)| action.with(k, v));
                let reason = match self.ami.send_action(action).await {
                    Ok(response) if response.success => CompleteReason::AmiSuccess {
                        message: response.message.unwrap_or_default(),
                        attributes: response.fields,
                    },
                    Ok(response) => CompleteReason::Error {
                        details: response.message,
                    },
                    Err(err) => CompleteReason::Error {
                        details: Some(err.to_string()),
                    },
                };
                self.complete(reason);
            }
            ComponentKind::Output { channel, agi } => {
                let action = AmiAction::new("AGI")
                    .with("Channel", channel)
                    .with("Command", agi)
                    .with("CommandID", self.id.clone());
                match self.ami.send_action(action).await {
                    Ok(response) if response.success => {
                        command.set_response(Ok(CommandOutcome::Ref {
                            id: self.id.clone(),
                        }));
                    }
                    Ok(response) => {
                        let error = ProtocolError::new(
                            names::ERROR,
                            response.message,
                            self.call_id.clone(),
                            Some(self.id.clone()),
                        );
                        self.fail_start(&command, error.into());
                    }
                    Err(err) => self.fail_start(&command, err.into()),
                }
            }
        }
    }

    /// The component never ran: no `complete` event follows.
    fn fail_start(&mut self, command: &Command, error: CommandError) {
        self.done = true;
        self.translator.deregister_component(&self.id);
        command.set_response(Err(error));
    }

    fn execute(&mut self, command: &Command) {
        if self.done {
            command.set_response(Err(ProtocolError::component_not_found(&self.id).into()));
            return;
        }
        match command.payload() {
            CommandPayload::Stop => {
                command.set_response(Ok(CommandOutcome::Accepted));
                self.complete(CompleteReason::Stop);
            }
            _ => {
                command.set_response(Err(ProtocolError::command_not_acceptable().into()));
            }
        }
    }

    /// Emits `complete` and deregisters. Later completions are ignored.
    fn complete(&mut self, reason: CompleteReason) {
        if self.done {
            return;
        }
        self.done = true;
        debug!(component_id = %self.id, ?reason, "component complete");
        let event = Event::new(EventPayload::complete(reason))
            .with_call_id(self.call_id.clone())
            .with_component_id(Some(self.id.clone()));
        if self.events.send(ConnectionEvent::Event(event)).is_err() {
            trace!(component_id = %self.id, "event feed closed");
        }
        self.translator.deregister_component(&self.id);
    }
}

#[async_trait]
impl Actor for Component {
    type Message = ComponentMessage;

    fn name(&self) -> &'static str {
        "component"
    }

    async fn handle(&mut self, message: ComponentMessage) -> Flow {
        match message {
            ComponentMessage::Start(command) => self.start(command).await,
            ComponentMessage::Execute(command) => self.execute(&command),
            ComponentMessage::AgiComplete(result) => {
                let reason = if result.is_success() {
                    CompleteReason::OutputSuccess
                } else {
                    CompleteReason::Error {
                        details: result.data.or(result.result),
                    }
                };
                self.complete(reason);
            }
            ComponentMessage::Hangup => self.complete(CompleteReason::Hangup),
        }
        Flow::Continue
    }
}
