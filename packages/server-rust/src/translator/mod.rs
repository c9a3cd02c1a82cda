//! Asterisk translator.
//!
//! The translator actor owns the call and component registries. Every
//! registry read and write goes through its inbox, so command routing and
//! event-driven re-keying never race.

pub mod agi;
pub mod call;
pub mod component;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use callwire_core::{Command, CommandPayload, CommandTarget, Event, ProtocolError, TransportError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

pub use agi::{AgiEnv, AgiParseError, AgiResult};
pub use call::{Call, CallHandle, CallIdentity, Direction};
pub use component::{Component, ComponentHandle, ComponentKind};
pub use transport::TranslatorTransport;

use crate::actor::{self, Actor, Flow};
use crate::ami::{AmiClient, AmiEvent};
use crate::config::TranslatorConfig;
use crate::network::ConnectionEvent;

/// Inbox of the [`Translator`].
pub enum TranslatorMessage {
    Execute {
        command: Arc<Command>,
        target: CommandTarget,
    },
    AmiEvent(AmiEvent),
    RegisterComponent(ComponentHandle),
    DeregisterComponent(String),
    CallWithId {
        id: String,
        reply: oneshot::Sender<Option<CallHandle>>,
    },
    CallForChannel {
        channel: String,
        reply: oneshot::Sender<Option<CallHandle>>,
    },
    ComponentWithId {
        id: String,
        reply: oneshot::Sender<Option<ComponentHandle>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Address of the running translator.
#[derive(Clone)]
pub struct TranslatorHandle {
    tx: mpsc::UnboundedSender<TranslatorMessage>,
}

impl TranslatorHandle {
    /// Routes `command` to the call, component or global handler named by
    /// `target`. The outcome is delivered as the command's response.
    pub fn execute_command(&self, command: Arc<Command>, target: CommandTarget) {
        if let Err(mpsc::error::SendError(TranslatorMessage::Execute { command, .. })) =
            self.tx.send(TranslatorMessage::Execute { command, target })
        {
            command.set_response(Err(TransportError::Closed.into()));
        }
    }

    pub fn handle_ami_event(&self, event: AmiEvent) {
        if self.tx.send(TranslatorMessage::AmiEvent(event)).is_err() {
            trace!("translator stopped, dropping manager event");
        }
    }

    pub fn register_component(&self, component: ComponentHandle) {
        let _ = self.tx.send(TranslatorMessage::RegisterComponent(component));
    }

    pub fn deregister_component(&self, id: &str) {
        let _ = self
            .tx
            .send(TranslatorMessage::DeregisterComponent(id.to_string()));
    }

    pub async fn call_with_id(&self, id: &str) -> Option<CallHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TranslatorMessage::CallWithId {
                id: id.to_string(),
                reply,
            })
            .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn call_for_channel(&self, channel: &str) -> Option<CallHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TranslatorMessage::CallForChannel {
                channel: channel.to_string(),
                reply,
            })
            .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn component_with_id(&self, id: &str) -> Option<ComponentHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TranslatorMessage::ComponentWithId {
                id: id.to_string(),
                reply,
            })
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Tells every call to stop, then stops the translator. Commands still in
    /// flight get no further response.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.tx.send(TranslatorMessage::Shutdown { done }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Whether the translator has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// A handle whose inbox is returned instead of served.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<TranslatorMessage>) {
        let (tx, rx) = actor::mailbox();
        (Self { tx }, rx)
    }
}

impl std::fmt::Debug for TranslatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

pub struct Translator {
    me: TranslatorHandle,
    ami: Arc<dyn AmiClient>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    config: Arc<TranslatorConfig>,
    calls_by_id: HashMap<String, CallHandle>,
    calls_by_channel: HashMap<String, CallHandle>,
    components: HashMap<String, ComponentHandle>,
    /// The first `FullyBooted` is the backend's own startup.
    fully_booted_seen: bool,
}

impl Translator {
    /// Spawns the translator and returns its handle plus the feed of events
    /// for the application.
    pub fn spawn(
        ami: Arc<dyn AmiClient>,
        config: TranslatorConfig,
    ) -> (TranslatorHandle, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = actor::mailbox();
        let (events, events_rx) = mpsc::unbounded_channel();
        let me = TranslatorHandle { tx };
        let translator = Self {
            me: me.clone(),
            ami,
            events,
            config: Arc::new(config),
            calls_by_id: HashMap::new(),
            calls_by_channel: HashMap::new(),
            components: HashMap::new(),
            fully_booted_seen: false,
        };
        actor::spawn(translator, rx);
        info!("Translator started");
        (me, events_rx)
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            trace!("event feed closed");
        }
    }

    fn register_call(&mut self, call: CallHandle) {
        let identity = call.identity();
        self.calls_by_id.insert(identity.id, call.clone());
        self.calls_by_channel.insert(identity.channel, call);
    }

    fn spawn_call(&self, id: String, channel: String, direction: Direction) -> CallHandle {
        Call::spawn(
            CallIdentity { id, channel },
            direction,
            self.me.clone(),
            Arc::clone(&self.ami),
            self.events.clone(),
            Arc::clone(&self.config),
        )
    }

    fn execute_command(&mut self, command: Arc<Command>, target: &CommandTarget) {
        if let Some(call_id) = &target.call_id {
            match self.calls_by_id.get(call_id) {
                Some(call) => call.execute_command(command),
                None => {
                    debug!(call_id = %call_id, "command for unknown call");
                    command.set_response(Err(ProtocolError::call_not_found(call_id).into()));
                }
            }
        } else if let Some(component_id) = &target.component_id {
            match self.components.get(component_id) {
                Some(component) => component.execute_command(command),
                None => {
                    debug!(component_id = %component_id, "command for unknown component");
                    command.set_response(Err(
                        ProtocolError::component_not_found(component_id).into()
                    ));
                }
            }
        } else {
            self.execute_global_command(command);
        }
    }

    fn execute_global_command(&mut self, command: Arc<Command>) {
        match command.payload() {
            CommandPayload::Dial { to, .. } => {
                let call = self.spawn_call(Uuid::new_v4().to_string(), to, Direction::Outbound);
                self.register_call(call.clone());
                debug!(call_id = %call.id(), channel = %call.channel(), "dialing");
                call.dial(command);
            }
            CommandPayload::AmiAction { name, params } => {
                let component = Component::spawn(
                    Uuid::new_v4().to_string(),
                    None,
                    ComponentKind::AmiAction { name, params },
                    self.me.clone(),
                    Arc::clone(&self.ami),
                    self.events.clone(),
                );
                self.components
                    .insert(component.id().to_string(), component.clone());
                component.start(command);
            }
            other => {
                debug!(variant = ?other.variant(), "global command not acceptable");
                command.set_response(Err(ProtocolError::command_not_acceptable().into()));
            }
        }
    }

    fn handle_ami_event(&mut self, event: AmiEvent) {
        if event.is("FullyBooted") {
            if self.fully_booted_seen {
                info!("Manager interface reconnected");
                self.emit(ConnectionEvent::Connected);
            } else {
                self.fully_booted_seen = true;
            }
            return;
        }

        if event.is("AsyncAGI")
            && event
                .sub_event()
                .is_some_and(|sub| sub.eq_ignore_ascii_case("Start"))
        {
            self.async_agi_start(&event);
            return;
        }

        if event.is("VarSet")
            && event
                .get("Variable")
                .is_some_and(|var| var == self.config.call_id_variable)
        {
            self.bind_call_id(&event);
            return;
        }

        // The call emits the event itself, ahead of anything derived from it.
        if let Some(call) = event.channel().and_then(|c| self.calls_by_channel.get(c)) {
            call.process_ami_event(event);
            return;
        }

        if self.config.is_global_event(&event.name) {
            self.emit(ConnectionEvent::Event(Event::new(event.to_protocol())));
        } else {
            trace!(event = %event.name, "dropping manager event");
        }
    }

    fn async_agi_start(&mut self, event: &AmiEvent) {
        let Some(channel) = event.channel() else {
            warn!("AsyncAGI Start without a channel");
            return;
        };
        let env = match AgiEnv::parse(event.get("Env").unwrap_or_default()) {
            Ok(env) => env,
            Err(err) => {
                warn!(%err, channel, "unparseable AGI environment");
                return;
            }
        };
        let call = match self.calls_by_channel.get(channel) {
            Some(call) => call.clone(),
            None => {
                let call = self.spawn_call(
                    Uuid::new_v4().to_string(),
                    channel.to_string(),
                    Direction::Inbound,
                );
                self.register_call(call.clone());
                debug!(call_id = %call.id(), channel, "new inbound call");
                call
            }
        };
        call.send_offer(env);
    }

    /// Binds an external call id carried by a channel variable and re-keys the
    /// registries for the event's channel.
    fn bind_call_id(&mut self, event: &AmiEvent) {
        let (Some(channel), Some(value)) = (event.channel(), event.get("Value")) else {
            return;
        };
        let provisional = channel.rsplit_once('-').map(|(base, _)| base);
        let call = self
            .calls_by_id
            .get(value)
            .or_else(|| self.calls_by_channel.get(channel))
            .or_else(|| provisional.and_then(|p| self.calls_by_channel.get(p)))
            .cloned();
        let Some(call) = call else {
            debug!(channel, call_id = value, "call id binding for untracked channel");
            return;
        };

        let old = call.identity();
        if old.id != value {
            if self
                .calls_by_id
                .get(&old.id)
                .is_some_and(|c| c.same_call(&call))
            {
                self.calls_by_id.remove(&old.id);
            }
            self.calls_by_id.insert(value.to_string(), call.clone());
        }
        if old.channel != channel {
            if self
                .calls_by_channel
                .get(&old.channel)
                .is_some_and(|c| c.same_call(&call))
            {
                self.calls_by_channel.remove(&old.channel);
            }
            self.calls_by_channel.insert(channel.to_string(), call.clone());
        }
        debug!(
            call_id = value,
            old_channel = %old.channel,
            channel,
            "bound call id"
        );
        call.rebind(CallIdentity {
            id: value.to_string(),
            channel: channel.to_string(),
        });
    }

    fn shutdown(&mut self) {
        info!(calls = self.calls_by_id.len(), "Translator shutting down");
        for call in self.calls_by_id.values() {
            call.shutdown();
        }
        for call in self.calls_by_channel.values() {
            if !self.calls_by_id.values().any(|c| c.same_call(call)) {
                call.shutdown();
            }
        }
        self.calls_by_id.clear();
        self.calls_by_channel.clear();
        self.components.clear();
    }
}

#[async_trait]
impl Actor for Translator {
    type Message = TranslatorMessage;

    fn name(&self) -> &'static str {
        "translator"
    }

    async fn handle(&mut self, message: TranslatorMessage) -> Flow {
        match message {
            TranslatorMessage::Execute { command, target } => {
                self.execute_command(command, &target);
            }
            TranslatorMessage::AmiEvent(event) => self.handle_ami_event(event),
            TranslatorMessage::RegisterComponent(component) => {
                self.components
                    .insert(component.id().to_string(), component);
            }
            TranslatorMessage::DeregisterComponent(id) => {
                self.components.remove(&id);
            }
            TranslatorMessage::CallWithId { id, reply } => {
                let _ = reply.send(self.calls_by_id.get(&id).cloned());
            }
            TranslatorMessage::CallForChannel { channel, reply } => {
                let _ = reply.send(self.calls_by_channel.get(&channel).cloned());
            }
            TranslatorMessage::ComponentWithId { id, reply } => {
                let _ = reply.send(self.components.get(&id).cloned());
            }
            TranslatorMessage::Shutdown { done } => {
                self.shutdown();
                let _ = done.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use callwire_core::{
        CommandOutcome, CommandResponse, CompleteReason, EndReason, EventPayload,
    };

    use super::*;
    use crate::ami::AmiResponse;
    use crate::test_support::{assert_quiet, next_connection_event, next_event, MockAmiClient};

    struct Fixture {
        translator: TranslatorHandle,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
        ami: Arc<MockAmiClient>,
    }

    fn fixture() -> Fixture {
        let ami = MockAmiClient::new();
        let (translator, events) = Translator::spawn(ami.clone(), TranslatorConfig::default());
        Fixture {
            translator,
            events,
            ami,
        }
    }

    async fn response(command: &Command) -> CommandResponse {
        tokio::time::timeout(Duration::from_secs(1), command.wait_response())
            .await
            .expect("command got no response")
    }

    fn async_agi_start(channel: &str) -> AmiEvent {
        AmiEvent::new("AsyncAGI")
            .with("SubEvent", "Start")
            .with("Channel", channel)
            .with(
                "Env",
                format!(
                    "agi_request%3A%20async%0Aagi_channel%3A%20{channel}%0Aagi_language%3A%20en%0Aagi_callerid%3A%205678%0Aagi_calleridname%3A%20Jane%20Smith%0Aagi_dnid%3A%201000%0Aagi_context%3A%20default%0Aagi_extension%3A%201000%0A%0A"
                ),
            )
    }

    fn var_set(channel: &str, value: &str) -> AmiEvent {
        AmiEvent::new("VarSet")
            .with("Privilege", "dialplan,all")
            .with("Channel", channel)
            .with("Variable", "callwire_call_id")
            .with("Value", value)
            .with("Uniqueid", "1326210224.0")
    }

    /// Starts an inbound call on `channel` and consumes its offer.
    async fn inbound_call(f: &mut Fixture, channel: &str) -> CallHandle {
        f.translator.handle_ami_event(async_agi_start(channel));
        next_event(&mut f.events).await;
        f.translator.call_for_channel(channel).await.unwrap()
    }

    #[tokio::test]
    async fn fully_booted_is_debounced() {
        let mut f = fixture();

        f.translator.handle_ami_event(AmiEvent::new("FullyBooted"));
        assert_quiet(&mut f.events).await;

        f.translator.handle_ami_event(AmiEvent::new("FullyBooted"));
        assert_eq!(
            next_connection_event(&mut f.events).await,
            ConnectionEvent::Connected
        );

        f.translator.handle_ami_event(AmiEvent::new("FullyBooted"));
        assert_eq!(
            next_connection_event(&mut f.events).await,
            ConnectionEvent::Connected
        );
        assert_quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn unrecognized_global_command_is_not_acceptable() {
        let mut f = fixture();
        let command = Command::new(CommandPayload::answer());

        f.translator.execute_command(command.clone(), CommandTarget::global());

        assert_eq!(
            response(&command).await,
            Err(ProtocolError::command_not_acceptable().into())
        );
        assert!(f.ami.actions().is_empty());
        assert_quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn unknown_call_and_component_are_reported() {
        let f = fixture();

        let answer = Command::new(CommandPayload::answer());
        f.translator.execute_command(answer.clone(), CommandTarget::call("abc123"));
        assert_eq!(
            response(&answer).await,
            Err(ProtocolError::call_not_found("abc123").into())
        );

        let stop = Command::new(CommandPayload::Stop);
        f.translator.execute_command(stop.clone(), CommandTarget::component("123abc"));
        let Err(err) = response(&stop).await else {
            panic!("stop succeeded");
        };
        assert_eq!(err, ProtocolError::component_not_found("123abc").into());
    }

    #[tokio::test]
    async fn async_agi_start_creates_a_call_and_offers_it() {
        let mut f = fixture();

        f.translator.handle_ami_event(async_agi_start("SIP/1234-00000000"));

        let offer = next_event(&mut f.events).await;
        let call = f
            .translator
            .call_for_channel("SIP/1234-00000000")
            .await
            .unwrap();
        assert_eq!(offer.call_id(), Some(call.id().as_str()));
        let EventPayload::Offer { to, from, headers } = offer.payload() else {
            panic!("expected offer, got {offer:?}");
        };
        assert_eq!(to, "1000");
        assert_eq!(from, "5678");
        assert_eq!(headers.get("calleridname"), Some("Jane Smith"));

        let env = call.agi_env().await.unwrap();
        assert_eq!(env.get("agi_request"), Some("async"));
        assert!(f.translator.call_with_id(&call.id()).await.is_some());
    }

    #[tokio::test]
    async fn async_agi_start_reuses_the_call_for_its_channel() {
        let mut f = fixture();

        f.translator.handle_ami_event(async_agi_start("SIP/1234-00000000"));
        f.translator.handle_ami_event(async_agi_start("SIP/1234-00000000"));

        let first = next_event(&mut f.events).await;
        let second = next_event(&mut f.events).await;
        assert_eq!(first.call_id(), second.call_id());
    }

    #[tokio::test]
    async fn var_set_binds_external_id_and_rekeys_channel() {
        let mut f = fixture();
        let call = inbound_call(&mut f, "chan-1").await;
        let original_id = call.id();

        f.translator.handle_ami_event(var_set("chan-1-real", "ext-42"));

        let by_id = f.translator.call_with_id("ext-42").await.unwrap();
        assert!(by_id.same_call(&call));
        assert!(f.translator.call_with_id(&original_id).await.is_none());
        assert!(f.translator.call_for_channel("chan-1").await.is_none());
        let by_channel = f.translator.call_for_channel("chan-1-real").await.unwrap();
        assert!(by_channel.same_call(&call));
        assert_eq!(
            call.identity(),
            CallIdentity {
                id: "ext-42".into(),
                channel: "chan-1-real".into()
            }
        );

        // Commands for the bound id reach the call on its new channel.
        let answer = Command::new(CommandPayload::answer());
        f.translator.execute_command(answer.clone(), CommandTarget::call("ext-42"));
        let agi = f.ami.wait_for_action("AGI").await;
        assert_eq!(agi.get("Channel"), Some("chan-1-real"));

        // Events on the old handle no longer reach it.
        f.translator.handle_ami_event(
            AmiEvent::new("Hangup")
                .with("Channel", "chan-1")
                .with("Cause", "16"),
        );
        assert_quiet(&mut f.events).await;
        assert!(f.translator.call_with_id("ext-42").await.is_some());
    }

    #[tokio::test]
    async fn unmatched_var_set_is_ignored() {
        let mut f = fixture();
        f.translator.handle_ami_event(var_set("SIP/9999-00000001", "foobarbaz"));
        assert!(f.translator.call_with_id("foobarbaz").await.is_none());
        assert_quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn dial_registers_under_the_requested_channel() {
        let mut f = fixture();
        let dial = Command::new(CommandPayload::dial("SIP/1234", Some("abc123".into())));

        f.translator.execute_command(dial.clone(), CommandTarget::global());

        let Ok(CommandOutcome::Ref { id }) = response(&dial).await else {
            panic!("dial failed");
        };
        let call = f.translator.call_for_channel("SIP/1234").await.unwrap();
        assert_eq!(call.id(), id);

        let originate = f.ami.wait_for_action("Originate").await;
        assert_eq!(originate.get("Channel"), Some("SIP/1234"));
        assert_eq!(originate.get("Application"), Some("AGI"));
        assert_eq!(originate.get("Data"), Some("agi:async"));
        assert_eq!(originate.get("CallerID"), Some("abc123"));
        assert_eq!(
            originate.get("Variable"),
            Some(format!("callwire_call_id={id}").as_str())
        );

        // The real channel replaces the requested one.
        f.translator.handle_ami_event(var_set("SIP/1234-00000000", &id));
        assert!(f.translator.call_for_channel("SIP/1234").await.is_none());
        let renamed = f
            .translator
            .call_for_channel("SIP/1234-00000000")
            .await
            .unwrap();
        assert!(renamed.same_call(&call));
        assert!(f.translator.call_with_id(&id).await.unwrap().same_call(&call));

        // Entering async AGI reuses the dialed call without an offer.
        f.translator.handle_ami_event(async_agi_start("SIP/1234-00000000"));
        let reused = f
            .translator
            .call_for_channel("SIP/1234-00000000")
            .await
            .unwrap();
        assert!(reused.same_call(&call));
        let env = call.agi_env().await.unwrap();
        assert_eq!(env.channel(), Some("SIP/1234-00000000"));
        assert_quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn failed_originate_fails_the_dial() {
        let f = fixture();
        f.ami.respond_to("Originate", Ok(AmiResponse::error("Extension does not exist.")));
        let dial = Command::new(CommandPayload::dial("SIP/nowhere", None));

        f.translator.execute_command(dial.clone(), CommandTarget::global());

        let Err(err) = response(&dial).await else {
            panic!("dial succeeded");
        };
        assert_eq!(err.protocol_name(), Some("error"));
    }

    #[tokio::test]
    async fn known_channel_events_reach_the_call_and_the_application() {
        let mut f = fixture();
        let call = inbound_call(&mut f, "SIP/1234-00000000").await;

        f.translator.handle_ami_event(
            AmiEvent::new("Hangup")
                .with("Uniqueid", "1320842458.8")
                .with("Cause", "16")
                .with("Cause-txt", "Normal Clearing")
                .with("Channel", "SIP/1234-00000000"),
        );

        let raw = next_event(&mut f.events).await;
        assert_eq!(raw.call_id(), Some(call.id().as_str()));
        assert_eq!(
            raw.payload(),
            &EventPayload::AmiEvent {
                name: "Hangup".into(),
                attributes: vec![
                    ("uniqueid".into(), "1320842458.8".into()),
                    ("cause".into(), "16".into()),
                    ("cause-txt".into(), "Normal Clearing".into()),
                    ("channel".into(), "SIP/1234-00000000".into()),
                ],
            }
        );
        let end = next_event(&mut f.events).await;
        assert_eq!(end.payload(), &EventPayload::end(EndReason::Hangup));
        assert_eq!(end.call_id(), Some(call.id().as_str()));

        // The call stays registered and keeps serving commands.
        let by_id = f.translator.call_with_id(&call.id()).await.unwrap();
        assert!(by_id.same_call(&call));
        assert!(f
            .translator
            .call_for_channel("SIP/1234-00000000")
            .await
            .unwrap()
            .same_call(&call));
        let hangup = Command::new(CommandPayload::hangup());
        f.translator.execute_command(hangup.clone(), CommandTarget::call(call.id()));
        assert_eq!(response(&hangup).await, Ok(CommandOutcome::Accepted));
    }

    #[tokio::test]
    async fn unowned_events_pass_only_when_global() {
        let mut f = fixture();

        f.translator.handle_ami_event(
            AmiEvent::new("Newchannel")
                .with("Channel", "SIP/101-3f3f")
                .with("State", "Ring"),
        );
        assert_quiet(&mut f.events).await;

        f.translator.handle_ami_event(
            AmiEvent::new("PeerStatus")
                .with("Peer", "SIP/101")
                .with("PeerStatus", "Registered"),
        );
        let event = next_event(&mut f.events).await;
        assert!(event.call_id().is_none());
        assert_eq!(
            event.payload(),
            &EventPayload::AmiEvent {
                name: "PeerStatus".into(),
                attributes: vec![
                    ("peer".into(), "SIP/101".into()),
                    ("peerstatus".into(), "Registered".into()),
                ],
            }
        );
    }

    #[tokio::test]
    async fn ami_action_runs_as_a_component() {
        let mut f = fixture();
        let command = Command::new(CommandPayload::ami_action(
            "Status",
            vec![("Channel".into(), "foo".into())],
        ));

        f.translator.execute_command(command.clone(), CommandTarget::global());

        let Ok(CommandOutcome::Ref { id }) = response(&command).await else {
            panic!("action failed");
        };
        let complete = next_event(&mut f.events).await;
        assert_eq!(complete.component_id(), Some(id.as_str()));
        assert!(matches!(
            complete.payload(),
            EventPayload::Complete {
                reason: Some(CompleteReason::AmiSuccess { .. })
            }
        ));

        // Completed components are deregistered.
        assert!(f.translator.component_with_id(&id).await.is_none());
        let stop = Command::new(CommandPayload::Stop);
        f.translator.execute_command(stop.clone(), CommandTarget::component(id.clone()));
        assert_eq!(
            response(&stop).await,
            Err(ProtocolError::component_not_found(&id).into())
        );
    }

    #[tokio::test]
    async fn join_bridges_to_the_other_calls_channel() {
        let mut f = fixture();
        let first = inbound_call(&mut f, "SIP/1000-00000001").await;
        let second = inbound_call(&mut f, "SIP/2000-00000002").await;

        let join = Command::new(CommandPayload::Join {
            other_call_id: Some(second.id()),
            mixer_name: None,
        });
        f.translator.execute_command(join.clone(), CommandTarget::call(first.id()));

        let agi = f.ami.wait_for_action("AGI").await;
        assert_eq!(agi.get("Channel"), Some("SIP/1000-00000001"));
        assert_eq!(
            agi.get("Command"),
            Some(r#"EXECUTE "Bridge" "SIP/2000-00000002""#)
        );

        let missing = Command::new(CommandPayload::Join {
            other_call_id: Some("ghost".into()),
            mixer_name: None,
        });
        f.translator.execute_command(missing.clone(), CommandTarget::call(first.id()));
        assert_eq!(
            response(&missing).await,
            Err(ProtocolError::call_not_found("ghost").into())
        );
    }

    #[tokio::test]
    async fn shutdown_stops_calls_and_the_translator() {
        let mut f = fixture();
        let call = inbound_call(&mut f, "SIP/1234-00000000").await;

        f.translator.shutdown().await;

        tokio::time::timeout(Duration::from_secs(1), async {
            while call.agi_env().await.is_some() || !f.translator.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("actors did not stop");

        let answer = Command::new(CommandPayload::answer());
        call.execute_command(answer.clone());
        assert_eq!(
            answer.response(),
            Some(Err(ProtocolError::call_not_found(&call.id()).into()))
        );

        let late = Command::new(CommandPayload::answer());
        f.translator.execute_command(late.clone(), CommandTarget::call(call.id()));
        assert_eq!(late.response(), Some(Err(TransportError::Closed.into())));
    }
}
