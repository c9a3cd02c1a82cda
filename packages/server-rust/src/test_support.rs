//! Test doubles shared by the server's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callwire_core::{Event, TransportError};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::ami::{AmiAction, AmiClient, AmiResponse};
use crate::network::ConnectionEvent;

/// Records every action and replies from a per-action script, defaulting to
/// `Response: Success`.
#[derive(Default)]
pub(crate) struct MockAmiClient {
    actions: Mutex<Vec<AmiAction>>,
    scripted: Mutex<HashMap<String, VecDeque<Result<AmiResponse, TransportError>>>>,
}

impl MockAmiClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the reply for the next action named `name`.
    pub(crate) fn respond_to(&self, name: &str, response: Result<AmiResponse, TransportError>) {
        self.scripted
            .lock()
            .entry(name.to_string())
            .or_default()
            .push_back(response);
    }

    pub(crate) fn actions(&self) -> Vec<AmiAction> {
        self.actions.lock().clone()
    }

    pub(crate) fn actions_named(&self, name: &str) -> Vec<AmiAction> {
        self.actions
            .lock()
            .iter()
            .filter(|a| a.name == name)
            .cloned()
            .collect()
    }

    /// Waits until an action named `name` has been sent and returns the latest one.
    pub(crate) async fn wait_for_action(&self, name: &str) -> AmiAction {
        let wait = async {
            loop {
                if let Some(action) = self.actions_named(name).pop() {
                    return action;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .unwrap_or_else(|_| panic!("no {name} action was sent"))
    }
}

#[async_trait]
impl AmiClient for MockAmiClient {
    async fn send_action(&self, action: AmiAction) -> Result<AmiResponse, TransportError> {
        let scripted = self
            .scripted
            .lock()
            .get_mut(&action.name)
            .and_then(VecDeque::pop_front);
        self.actions.lock().push(action);
        scripted.unwrap_or_else(|| Ok(AmiResponse::success("Success")))
    }
}

/// Next application event, failing the test after a second.
pub(crate) async fn next_connection_event(
    rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event feed closed")
}

/// Next protocol event, failing the test on anything else.
pub(crate) async fn next_event(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> Event {
    match next_connection_event(rx).await {
        ConnectionEvent::Event(event) => event,
        other => panic!("expected an event, got {other:?}"),
    }
}

/// Asserts nothing arrives within a short grace period.
pub(crate) async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) {
    tokio::time::sleep(Duration::from_millis(20)).await;
    if let Ok(event) = rx.try_recv() {
        panic!("unexpected event {event:?}");
    }
}
