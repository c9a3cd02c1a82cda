//! Call actor: one per live channel.
//!
//! Translates call commands into AGI and manager actions and manager events on
//! its channel into protocol events.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use callwire_core::error::names;
use callwire_core::{
    Command, CommandError, CommandOutcome, CommandPayload, EndReason, Event, EventPayload, Headers,
    ProtocolError, RejectReason,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::agi::{format_command, AgiEnv, AgiResult};
use super::component::{Component, ComponentHandle, ComponentKind};
use super::TranslatorHandle;
use crate::actor::{self, Actor, Flow};
use crate::ami::{AmiAction, AmiClient, AmiEvent};
use crate::config::{MediaEngine, TranslatorConfig};
use crate::network::ConnectionEvent;

/// Stable id and current channel of a call. Only the translator changes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallIdentity {
    pub id: String,
    pub channel: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Arrived through async AGI.
    Inbound,
    /// Created by a `dial`.
    Outbound,
}

/// Inbox of a [`Call`].
pub enum CallMessage {
    Execute(Arc<Command>),
    AmiEvent(AmiEvent),
    SendOffer(AgiEnv),
    Dial(Arc<Command>),
    AgiEnv(oneshot::Sender<AgiEnv>),
    Shutdown,
}

/// Address of a running call.
#[derive(Clone)]
pub struct CallHandle {
    identity: Arc<ArcSwap<CallIdentity>>,
    tx: mpsc::UnboundedSender<CallMessage>,
}

impl CallHandle {
    #[must_use]
    pub fn id(&self) -> String {
        self.identity.load().id.clone()
    }

    #[must_use]
    pub fn channel(&self) -> String {
        self.identity.load().channel.clone()
    }

    #[must_use]
    pub fn identity(&self) -> CallIdentity {
        CallIdentity::clone(&self.identity.load())
    }

    /// Whether both handles address the same actor.
    #[must_use]
    pub fn same_call(&self, other: &CallHandle) -> bool {
        Arc::ptr_eq(&self.identity, &other.identity)
    }

    pub(crate) fn rebind(&self, identity: CallIdentity) {
        self.identity.store(Arc::new(identity));
    }

    /// Hands a call command to the call.
    ///
    /// Answers `call-not-found` if the call has gone away.
    pub fn execute_command(&self, command: Arc<Command>) {
        if let Err(mpsc::error::SendError(CallMessage::Execute(command))) =
            self.tx.send(CallMessage::Execute(command))
        {
            command.set_response(Err(ProtocolError::call_not_found(&self.id()).into()));
        }
    }

    pub fn process_ami_event(&self, event: AmiEvent) {
        let _ = self.tx.send(CallMessage::AmiEvent(event));
    }

    pub fn send_offer(&self, env: AgiEnv) {
        let _ = self.tx.send(CallMessage::SendOffer(env));
    }

    pub fn dial(&self, command: Arc<Command>) {
        if let Err(mpsc::error::SendError(CallMessage::Dial(command))) =
            self.tx.send(CallMessage::Dial(command))
        {
            command.set_response(Err(ProtocolError::call_not_found(&self.id()).into()));
        }
    }

    /// The async AGI environment the call started with. Empty for a dialed
    /// call that has not entered async AGI yet.
    pub async fn agi_env(&self) -> Option<AgiEnv> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(CallMessage::AgiEnv(tx)).ok()?;
        rx.await.ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(CallMessage::Shutdown);
    }
}

impl std::fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandle")
            .field("identity", &self.identity())
            .finish()
    }
}

pub struct Call {
    identity: Arc<ArcSwap<CallIdentity>>,
    direction: Direction,
    env: AgiEnv,
    translator: TranslatorHandle,
    ami: Arc<dyn AmiClient>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    /// AGI commands awaiting their `Exec`, by `CommandID`.
    executing: HashMap<String, Arc<Command>>,
    components: HashMap<String, ComponentHandle>,
    config: Arc<TranslatorConfig>,
}

impl Call {
    /// Spawns a call actor and returns its handle.
    pub fn spawn(
        identity: CallIdentity,
        direction: Direction,
        translator: TranslatorHandle,
        ami: Arc<dyn AmiClient>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
        config: Arc<TranslatorConfig>,
    ) -> CallHandle {
        let identity = Arc::new(ArcSwap::from_pointee(identity));
        let (tx, rx) = actor::mailbox();
        let call = Self {
            identity: Arc::clone(&identity),
            direction,
            env: AgiEnv::default(),
            translator,
            ami,
            events,
            executing: HashMap::new(),
            components: HashMap::new(),
            config,
        };
        actor::spawn(call, rx);
        CallHandle { identity, tx }
    }

    fn id(&self) -> String {
        self.identity.load().id.clone()
    }

    fn channel(&self) -> String {
        self.identity.load().channel.clone()
    }

    fn send_event(&self, payload: EventPayload) {
        let event = Event::new(payload).with_call_id(Some(self.id()));
        if self.events.send(ConnectionEvent::Event(event)).is_err() {
            trace!(call_id = %self.id(), "event feed closed");
        }
    }

    fn send_offer(&mut self, env: AgiEnv) {
        self.env = env;
        if self.direction == Direction::Outbound {
            debug!(call_id = %self.id(), "dialed call entered async AGI");
            return;
        }
        self.send_event(EventPayload::Offer {
            to: self.env.to(),
            from: self.env.from(),
            headers: self.env.headers(),
        });
    }

    async fn execute_command(&mut self, command: Arc<Command>) {
        if let Some(component_id) = command.component_id() {
            match self.components.get(&component_id) {
                Some(component) => component.execute_command(command),
                None => {
                    command.set_response(Err(
                        ProtocolError::component_not_found(&component_id).into()
                    ));
                }
            }
            return;
        }

        match command.payload() {
            CommandPayload::Answer { .. } => self.execute_agi(command, "ANSWER".into()).await,
            CommandPayload::Accept { .. } => {
                self.execute_agi(command, format_command("EXECUTE", &["RINGING"]))
                    .await;
            }
            CommandPayload::Redirect { to, .. } => {
                self.execute_agi(command, format_command("EXECUTE", &["Transfer", &to]))
                    .await;
            }
            CommandPayload::Join {
                mixer_name: Some(mixer),
                ..
            } => {
                self.execute_agi(command, format_command("EXECUTE", &["ConfBridge", &mixer]))
                    .await;
            }
            CommandPayload::Join {
                other_call_id: Some(other),
                ..
            } => match self.translator.call_with_id(&other).await {
                Some(peer) => {
                    let channel = peer.channel();
                    self.execute_agi(command, format_command("EXECUTE", &["Bridge", &channel]))
                        .await;
                }
                None => {
                    command.set_response(Err(ProtocolError::call_not_found(&other).into()));
                }
            },
            CommandPayload::Hangup { .. } => self.hangup(&command, 16).await,
            CommandPayload::Reject { reason, .. } => {
                let cause = match reason {
                    RejectReason::Busy => 17,
                    RejectReason::Decline => 21,
                    RejectReason::Error => 127,
                };
                self.hangup(&command, cause).await;
            }
            CommandPayload::Output { voice, prompts } => self.output(command, voice, &prompts),
            _ => {
                command.set_response(Err(ProtocolError::command_not_acceptable().into()));
            }
        }
    }

    /// Sends an AGI command. The command answers when its `Exec` arrives.
    async fn execute_agi(&mut self, command: Arc<Command>, agi: String) {
        let command_id = Uuid::new_v4().to_string();
        let action = AmiAction::new("AGI")
            .with("Channel", self.channel())
            .with("Command", agi)
            .with("CommandID", command_id.clone());
        match self.ami.send_action(action).await {
            Ok(response) if response.success => {
                self.executing.insert(command_id, command);
            }
            Ok(response) => {
                command.set_response(Err(self.error(response.message)));
            }
            Err(err) => {
                command.set_response(Err(err.into()));
            }
        }
    }

    async fn hangup(&mut self, command: &Command, cause: u16) {
        let action = AmiAction::new("Hangup")
            .with("Channel", self.channel())
            .with("Cause", cause.to_string());
        let response = match self.ami.send_action(action).await {
            Ok(response) if response.success => Ok(CommandOutcome::Accepted),
            Ok(response) => Err(self.error(response.message)),
            Err(err) => Err(err.into()),
        };
        command.set_response(response);
    }

    fn output(&mut self, command: Arc<Command>, voice: Option<String>, prompts: &[String]) {
        let agi = match self.config.media_engine {
            MediaEngine::Asterisk => format_command("EXECUTE", &["Playback", &prompts.join("&")]),
            MediaEngine::Unimrcp => {
                let text = prompts.join(" ");
                match voice {
                    Some(voice) => {
                        let options = format!("v={voice}");
                        format_command("EXECUTE", &["MRCPSynth", &text, &options])
                    }
                    None => format_command("EXECUTE", &["MRCPSynth", &text]),
                }
            }
        };
        let id = Uuid::new_v4().to_string();
        let component = Component::spawn(
            id.clone(),
            Some(self.id()),
            ComponentKind::Output {
                channel: self.channel(),
                agi,
            },
            self.translator.clone(),
            Arc::clone(&self.ami),
            self.events.clone(),
        );
        self.components.insert(id, component.clone());
        self.translator.register_component(component.clone());
        component.start(command);
    }

    async fn dial(&mut self, command: Arc<Command>) {
        let CommandPayload::Dial { to, from, .. } = command.payload() else {
            command.set_response(Err(ProtocolError::command_not_acceptable().into()));
            return;
        };
        let id = self.id();
        let mut action = AmiAction::new("Originate")
            .with("Async", "true")
            .with("Channel", to)
            .with("Application", "AGI")
            .with("Data", "agi:async")
            .with("Variable", format!("{}={id}", self.config.call_id_variable));
        if let Some(from) = from {
            action = action.with("CallerID", from);
        }
        let response = match self.ami.send_action(action).await {
            Ok(response) if response.success => Ok(CommandOutcome::Ref { id }),
            Ok(response) => Err(self.error(response.message)),
            Err(err) => Err(err.into()),
        };
        command.set_response(response);
    }

    fn error(&self, message: Option<String>) -> CommandError {
        ProtocolError::new(names::ERROR, message, Some(self.id()), None).into()
    }

    /// Forwards the manager event to the application, then any protocol event
    /// derived from it, so both keep the channel's arrival order.
    fn process_ami_event(&mut self, event: &AmiEvent) {
        self.send_event(event.to_protocol());

        if event.is("Hangup") {
            let reason = match event.get("Cause").and_then(|c| c.parse::<u16>().ok()) {
                Some(16) => EndReason::Hangup,
                Some(17) => EndReason::Busy,
                Some(18 | 19) => EndReason::Timeout,
                Some(21) => EndReason::Reject,
                _ => EndReason::Error,
            };
            self.fail_executing("channel hung up");
            for component in self.components.values() {
                component.hangup();
            }
            self.components.clear();
            self.send_event(EventPayload::end(reason));
            return;
        }

        if event.is("Newstate") && self.direction == Direction::Outbound {
            match event.get("ChannelStateDesc") {
                Some("Ringing") => self.send_event(EventPayload::Ringing {
                    headers: Headers::new(),
                }),
                Some("Up") => self.send_event(EventPayload::Answered {
                    headers: Headers::new(),
                }),
                _ => {}
            }
            return;
        }

        if event.is("AsyncAGI") {
            match event.sub_event() {
                Some(sub) if sub.eq_ignore_ascii_case("Exec") => self.agi_exec(event),
                Some(sub) if sub.eq_ignore_ascii_case("End") => {
                    self.fail_executing("AGI session ended");
                }
                _ => {}
            }
        }
    }

    /// Answers every AGI command still waiting for its `Exec`.
    fn fail_executing(&mut self, reason: &str) {
        if self.executing.is_empty() {
            return;
        }
        let error = self.error(Some(reason.to_string()));
        for (_, command) in self.executing.drain() {
            command.set_response(Err(error.clone()));
        }
    }

    fn agi_exec(&mut self, event: &AmiEvent) {
        let Some(command_id) = event.get("CommandID") else {
            return;
        };
        let result = match AgiResult::parse(event.get("Result").unwrap_or_default()) {
            Ok(result) => result,
            Err(err) => {
                warn!(%err, command_id, "unparseable AGI result");
                AgiResult {
                    code: 500,
                    result: None,
                    data: None,
                }
            }
        };

        if let Some(command) = self.executing.remove(command_id) {
            let response = if result.is_success() {
                Ok(CommandOutcome::Accepted)
            } else {
                Err(self.error(Some(format!("AGI command failed with code {}", result.code))))
            };
            command.set_response(response);
        } else if let Some(component) = self.components.remove(command_id) {
            component.agi_complete(result);
        } else {
            trace!(command_id, "AGI exec for nothing pending");
        }
    }
}

#[async_trait]
impl Actor for Call {
    type Message = CallMessage;

    fn name(&self) -> &'static str {
        "call"
    }

    async fn handle(&mut self, message: CallMessage) -> Flow {
        match message {
            CallMessage::Execute(command) => self.execute_command(command).await,
            CallMessage::AmiEvent(event) => self.process_ami_event(&event),
            CallMessage::SendOffer(env) => self.send_offer(env),
            CallMessage::Dial(command) => self.dial(command).await,
            CallMessage::AgiEnv(reply) => {
                let _ = reply.send(self.env.clone());
            }
            CallMessage::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    async fn stopped(&mut self) {
        debug!(
            call_id = %self.id(),
            channel = %self.channel(),
            pending = self.executing.len(),
            components = self.components.len(),
            "call stopped"
        );
    }
}
