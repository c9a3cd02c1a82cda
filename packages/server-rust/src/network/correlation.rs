//! Correlation wait-point table.
//!
//! Every outstanding write owns one single-slot wait point keyed by its
//! correlation id. Inbound results and errors fulfil the slot exactly once; a
//! reply for an id with no slot (timed out, or never sent) is reported to the
//! caller instead of being delivered anywhere.

use std::sync::Arc;

use callwire_core::{CommandError, CommandOutcome, CommandResponse, TransportError};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

/// Thread-safe table of pending replies.
#[derive(Debug, Default)]
pub struct PendingReplies {
    slots: DashMap<String, oneshot::Sender<CommandResponse>>,
}

impl PendingReplies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a wait point for `id`, replacing any stale one.
    pub fn register(&self, id: &str) -> oneshot::Receiver<CommandResponse> {
        let (tx, rx) = oneshot::channel();
        self.slots.insert(id.to_string(), tx);
        rx
    }

    /// Delivers a success to `id`. Returns `false` when nothing was waiting.
    pub fn resolve(&self, id: &str, outcome: CommandOutcome) -> bool {
        self.deliver(id, Ok(outcome))
    }

    /// Delivers an error to `id`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unattributed`] when no wait point exists, so
    /// the caller can escalate it.
    pub fn reject(&self, id: &str, error: CommandError) -> Result<(), TransportError> {
        let reason = error.to_string();
        if self.deliver(id, Err(error)) {
            Ok(())
        } else {
            Err(TransportError::Unattributed {
                id: id.to_string(),
                reason,
            })
        }
    }

    fn deliver(&self, id: &str, response: CommandResponse) -> bool {
        let Some((_, slot)) = self.slots.remove(id) else {
            debug!(id, "discarding reply with no wait point");
            return false;
        };
        // The waiter may have given up between removal and send.
        slot.send(response).is_ok()
    }

    /// Drops the wait point for `id`. Returns `true` if one existed.
    pub fn release(&self, id: &str) -> bool {
        self.slots.remove(id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One-shot handle a transport uses to answer a specific write.
#[derive(Debug, Clone)]
pub struct ReplyTo {
    id: String,
    pending: Arc<PendingReplies>,
}

impl ReplyTo {
    pub(crate) fn new(id: String, pending: Arc<PendingReplies>) -> Self {
        Self { id, pending }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Answers with `response`. Returns `false` when the write already gave up.
    pub fn send(self, response: CommandResponse) -> bool {
        match response {
            Ok(outcome) => self.pending.resolve(&self.id, outcome),
            Err(error) => self.pending.reject(&self.id, error).is_ok(),
        }
    }
}
