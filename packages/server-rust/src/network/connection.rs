//! Correlation engine for the call-control connection.
//!
//! [`Connection::write`] tags a command with a fresh correlation id, registers a
//! wait point, hands the command to the [`Transport`] and waits up to the
//! configured timeout for the matching reply. Unsolicited inbound traffic is
//! attributed to the command that created its component when possible and then
//! appended to a single ordered [`EventQueue`].

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use callwire_core::{
    registry, Command, CommandError, CommandLookup, CommandOutcome, CommandResponse,
    CommandTarget, Element, Event, ProtocolError, TransportError,
};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::ConnectionConfig;
use super::correlation::{PendingReplies, ReplyTo};
use super::shutdown::{HealthState, ShutdownController};
use super::xmpp::Jid;

// ---------------------------------------------------------------------------
// Boundary types
// ---------------------------------------------------------------------------

/// Something the application should see, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The backend (re)connected.
    Connected,
    Event(Event),
    /// An inbound message nothing could be attributed to.
    Fault(CommandError),
}

/// A command handed to the transport.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Correlation id the reply must carry.
    pub id: String,
    pub target: CommandTarget,
    /// Routing address for transports that need one.
    pub address: Option<Jid>,
    pub command: Arc<Command>,
    /// Answers this write directly, for transports that know the outcome in-process.
    pub reply: ReplyTo,
}

/// Delivers outbound commands.
///
/// Replies arrive later through [`Outbound::reply`] or [`Connection::on_result`]
/// and [`Connection::on_error`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the command could not be handed off.
    async fn send(&self, outbound: Outbound) -> Result<(), TransportError>;
}

/// Single-consumer end of the application event queue.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl EventQueue {
    /// Waits for the next event. Returns `None` once the connection is gone.
    pub async fn pop(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }

    /// Waits up to `timeout` for the next event.
    pub async fn pop_timeout(&mut self, timeout: Duration) -> Option<ConnectionEvent> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Returns the next event if one is already queued.
    pub fn try_pop(&mut self) -> Option<ConnectionEvent> {
        self.rx.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// The correlation engine.
pub struct Connection {
    me: Weak<Connection>,
    transport: Arc<dyn Transport>,
    pending: Arc<PendingReplies>,
    /// Commands awaiting their reply, by correlation id.
    sent: DashMap<String, Weak<Command>>,
    /// Commands that created a component, by component id.
    by_component: DashMap<String, Weak<Command>>,
    /// Routing domain last seen for each call.
    call_domains: DashMap<String, String>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    lifecycle: ShutdownController,
    config: ConnectionConfig,
}

impl Connection {
    /// Creates a connection over `transport` and the queue its events land in.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: ConnectionConfig) -> (Arc<Self>, EventQueue) {
        let (events, rx) = mpsc::unbounded_channel();
        let connection = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            transport,
            pending: Arc::new(PendingReplies::new()),
            sent: DashMap::new(),
            by_component: DashMap::new(),
            call_domains: DashMap::new(),
            events,
            lifecycle: ShutdownController::new(),
            config,
        });
        (connection, EventQueue { rx })
    }

    /// Pumps events produced in-process (for example by a translator) through
    /// [`Connection::handle_event`]. The task ends when `feed` closes or the
    /// connection is dropped.
    pub fn attach(&self, mut feed: mpsc::UnboundedReceiver<ConnectionEvent>) -> JoinHandle<()> {
        let me = self.me.clone();
        tokio::spawn(async move {
            while let Some(event) = feed.recv().await {
                let Some(connection) = me.upgrade() else {
                    break;
                };
                connection.handle_event(event);
            }
        })
    }

    /// Sends `command` to `target` and waits for its reply.
    ///
    /// The reply, when one arrives, is also stored as the command's response.
    /// A timeout is returned to the caller only: the backend may still answer
    /// the command later.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidAction`] if the command was already requested.
    /// - [`TransportError::Closed`] while draining or if the transport dropped the reply.
    /// - [`TransportError::Timeout`] if nothing arrived within the write timeout.
    /// - Whatever error the backend replied with.
    pub async fn write(&self, command: &Arc<Command>, target: CommandTarget) -> CommandResponse {
        if matches!(
            self.lifecycle.health_state(),
            HealthState::Draining | HealthState::Stopped
        ) {
            return Err(TransportError::Closed.into());
        }
        let _guard = self.lifecycle.in_flight_guard();

        // An in-flight command keeps the ids it was sent with.
        command.request()?;
        if target.call_id.is_some() {
            command.set_call_id(target.call_id.clone());
        }
        if target.component_id.is_some() {
            command.set_component_id(target.component_id.clone());
        }

        let id = Uuid::new_v4().to_string();
        let rx = self.pending.register(&id);
        self.sent.insert(id.clone(), Arc::downgrade(command));

        let outbound = Outbound {
            id: id.clone(),
            address: self.address_for(&target),
            target,
            command: Arc::clone(command),
            reply: ReplyTo::new(id.clone(), Arc::clone(&self.pending)),
        };

        if let Err(err) = self.transport.send(outbound).await {
            self.pending.release(&id);
            self.sent.remove(&id);
            command.set_response(Err(err.clone().into()));
            return Err(err.into());
        }

        let response = match tokio::time::timeout(self.config.write_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => Err(TransportError::Closed.into()),
            Err(_) => {
                self.pending.release(&id);
                self.sent.remove(&id);
                warn!(id, timeout = ?self.config.write_timeout, "write timed out");
                return Err(TransportError::Timeout {
                    after: self.config.write_timeout,
                }
                .into());
            }
        };

        if let Ok(CommandOutcome::Ref { id: component_id }) = &response {
            self.by_component
                .insert(component_id.clone(), Arc::downgrade(command));
        }
        self.sent.remove(&id);
        command.set_response(response.clone());
        response
    }

    /// Delivers a correlated success. Returns `false` if nothing was waiting.
    pub fn on_result(&self, id: &str, outcome: CommandOutcome) -> bool {
        self.pending.resolve(id, outcome)
    }

    /// Delivers a correlated error.
    ///
    /// # Errors
    ///
    /// When no write is waiting for `id` the error is queued as a
    /// [`ConnectionEvent::Fault`] and returned as [`TransportError::Unattributed`].
    pub fn on_error(&self, id: &str, error: CommandError) -> Result<(), TransportError> {
        self.pending.reject(id, error).inspect_err(|unattributed| {
            warn!(id, %unattributed, "escalating unattributed error");
            self.push(ConnectionEvent::Fault(unattributed.clone().into()));
        })
    }

    /// Handles unsolicited traffic from `from` (`call_id@domain[/component_id]`).
    pub fn on_presence(&self, from: &str, element: &Element) {
        let jid = match from.parse::<Jid>() {
            Ok(jid) => jid,
            Err(err) => {
                self.fault(ProtocolError::new("bad-address", Some(err.to_string()), None, None));
                return;
            }
        };
        let Some(call_id) = jid.node.clone() else {
            self.fault(ProtocolError::new(
                "unattributed-presence",
                Some(format!("presence from {jid} names no call")),
                None,
                None,
            ));
            return;
        };
        self.call_domains.insert(call_id.clone(), jid.domain.clone());

        match registry().import(element, Some(call_id.clone()), jid.resource.clone()) {
            Ok(node) => {
                let variant = node.variant();
                match node.into_event() {
                    Some(event) => self.dispatch_event(event),
                    None => self.fault(ProtocolError::new(
                        "unexpected-message",
                        Some(format!("{variant:?} is not an event")),
                        Some(call_id),
                        jid.resource,
                    )),
                }
            }
            Err(err) => self.fault(ProtocolError::new(
                "bad-request",
                Some(err.to_string()),
                Some(call_id),
                jid.resource,
            )),
        }
    }

    /// Accepts an event produced in-process.
    pub fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Event(event) => self.dispatch_event(event),
            other => self.push(other),
        }
    }

    /// The routing domain last seen for `call_id`.
    #[must_use]
    pub fn call_domain(&self, call_id: &str) -> Option<String> {
        self.call_domains.get(call_id).map(|d| d.value().clone())
    }

    /// Number of writes currently waiting for a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    #[must_use]
    pub fn lifecycle(&self) -> &ShutdownController {
        &self.lifecycle
    }

    /// Stops accepting writes and waits for in-flight ones to finish.
    ///
    /// Returns `false` if writes were still outstanding after the drain timeout.
    pub async fn drain(&self) -> bool {
        self.lifecycle.trigger_shutdown();
        self.lifecycle.wait_for_drain(self.config.drain_timeout).await
    }

    fn address_for(&self, target: &CommandTarget) -> Option<Jid> {
        match &target.call_id {
            Some(call_id) => {
                let domain = self
                    .call_domain(call_id)
                    .or_else(|| self.config.service_domain.clone())?;
                Some(Jid::new(
                    Some(call_id),
                    &domain,
                    target.component_id.as_deref(),
                ))
            }
            None => {
                let domain = self.config.service_domain.as_deref()?;
                Some(Jid::new(None, domain, target.component_id.as_deref()))
            }
        }
    }

    fn command_for_component(&self, component_id: &str) -> Option<Arc<Command>> {
        if let Some(command) = self.by_component.get(component_id).and_then(|w| w.upgrade()) {
            return Some(command);
        }
        // The reply carrying the component id may still be in flight.
        let command = self
            .sent
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .find(|command| command.component_id().as_deref() == Some(component_id))?;
        self.by_component
            .insert(component_id.to_string(), Arc::downgrade(&command));
        Some(command)
    }

    fn dispatch_event(&self, mut event: Event) {
        let lookup: Weak<dyn CommandLookup> = self.me.clone();
        event.set_connection(lookup);

        if let Some(component_id) = event.component_id().map(str::to_string) {
            if let Some(command) = self.command_for_component(&component_id) {
                let complete = event.is_complete();
                match command.add_event(event.clone()) {
                    Ok(attributed) => event = attributed,
                    Err(err) => warn!(%err, component_id, "event arrived out of order"),
                }
                if complete {
                    self.by_component.remove(&component_id);
                }
            }
        }
        self.push(ConnectionEvent::Event(event));
    }

    fn fault(&self, error: ProtocolError) {
        warn!(name = %error.name, "protocol fault");
        self.push(ConnectionEvent::Fault(error.into()));
    }

    fn push(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            debug!("event queue closed, dropping event");
        }
    }
}

impl CommandLookup for Connection {
    fn original_command_from_id(&self, component_id: &str) -> Option<Arc<Command>> {
        self.command_for_component(component_id)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("pending", &self.pending.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
