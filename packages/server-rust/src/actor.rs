//! Mailbox actor runtime.
//!
//! Each actor owns its state and processes messages from an unbounded mpsc
//! inbox one at a time, so no two operations on the same actor overlap while
//! different actors run in parallel. Senders never block.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

// ---------------------------------------------------------------------------
// Actor trait
// ---------------------------------------------------------------------------

/// What the run loop does after a message has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Message handler driven by [`spawn`].
#[async_trait]
pub trait Actor: Send + 'static {
    /// The inbox message type.
    type Message: Send + 'static;

    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Handle a single message.
    async fn handle(&mut self, message: Self::Message) -> Flow;

    /// Called once after the loop ends, whether stopped or because every
    /// sender was dropped. Default is a no-op.
    async fn stopped(&mut self) {}
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Creates an actor inbox.
///
/// The sender is usually wrapped in a handle before the actor is spawned so
/// the actor can hold a copy of its own handle.
#[must_use]
pub fn mailbox<M>() -> (mpsc::UnboundedSender<M>, mpsc::UnboundedReceiver<M>) {
    mpsc::unbounded_channel()
}

/// Runs `actor` on its own task until it returns [`Flow::Stop`] or its inbox closes.
pub fn spawn<A: Actor>(mut actor: A, mut inbox: mpsc::UnboundedReceiver<A::Message>) -> JoinHandle<()> {
    tokio::spawn(async move {
        trace!(actor = actor.name(), "actor started");
        while let Some(message) = inbox.recv().await {
            if actor.handle(message).await == Flow::Stop {
                break;
            }
        }
        actor.stopped().await;
        trace!(actor = actor.name(), "actor stopped");
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
