//! Protocol message catalogue.
//!
//! Every wire element resolves to a [`Message`] through the [`Registry`]: a
//! command, an event, a component reference, a completion reason, or a generic
//! untyped element when nothing is registered for its name and namespace.

pub mod commands;
pub mod events;
pub mod registry;

use std::sync::Arc;

use serde::Serialize;

use crate::command::Command;
use crate::element::Element;
use crate::event::Event;

pub use commands::{CommandPayload, RejectReason};
pub use events::{CompleteReason, EndReason, EventPayload};
pub use registry::{registry, Constructor, ImportError, Registry};

/// Namespace URIs of the registered variants.
pub mod ns {
    pub const CORE: &str = "urn:xmpp:rayo:1";
    pub const EXT: &str = "urn:xmpp:rayo:ext:1";
    pub const EXT_COMPLETE: &str = "urn:xmpp:rayo:ext:complete:1";
    pub const OUTPUT: &str = "urn:xmpp:rayo:output:1";
    pub const OUTPUT_COMPLETE: &str = "urn:xmpp:rayo:output:complete:1";
    pub const AMI: &str = "urn:xmpp:rayo:asterisk:ami:1";
    pub const AMI_COMPLETE: &str = "urn:xmpp:rayo:asterisk:ami:complete:1";
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// Concrete message type a wire element resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    // Commands
    Answer,
    Accept,
    Hangup,
    Reject,
    Redirect,
    Dial,
    Join,
    Output,
    Stop,
    AmiAction,
    // Events
    Offer,
    Answered,
    Ringing,
    End,
    Info,
    Complete,
    Joined,
    Unjoined,
    AmiEvent,
    // Replies and nested reasons
    Ref,
    StopReason,
    HangupReason,
    ErrorReason,
    OutputSuccess,
    AmiSuccess,
    /// An element nothing is registered for.
    Generic,
}

impl Variant {
    /// Every variant with a wire identity, in registration order.
    pub const REGISTERED: [Variant; 25] = [
        Variant::Answer,
        Variant::Accept,
        Variant::Hangup,
        Variant::Reject,
        Variant::Redirect,
        Variant::Dial,
        Variant::Join,
        Variant::Output,
        Variant::Stop,
        Variant::AmiAction,
        Variant::Offer,
        Variant::Answered,
        Variant::Ringing,
        Variant::End,
        Variant::Info,
        Variant::Complete,
        Variant::Joined,
        Variant::Unjoined,
        Variant::AmiEvent,
        Variant::Ref,
        Variant::StopReason,
        Variant::HangupReason,
        Variant::ErrorReason,
        Variant::OutputSuccess,
        Variant::AmiSuccess,
    ];

    /// The `(local name, namespace)` this variant is registered under.
    #[must_use]
    pub fn key(self) -> Option<(&'static str, &'static str)> {
        let key = match self {
            Self::Answer => ("answer", ns::CORE),
            Self::Accept => ("accept", ns::CORE),
            Self::Hangup => ("hangup", ns::CORE),
            Self::Reject => ("reject", ns::CORE),
            Self::Redirect => ("redirect", ns::CORE),
            Self::Dial => ("dial", ns::CORE),
            Self::Join => ("join", ns::CORE),
            Self::Output => ("output", ns::OUTPUT),
            Self::Stop => ("stop", ns::EXT),
            Self::AmiAction => ("action", ns::AMI),
            Self::Offer => ("offer", ns::CORE),
            Self::Answered => ("answered", ns::CORE),
            Self::Ringing => ("ringing", ns::CORE),
            Self::End => ("end", ns::CORE),
            Self::Info => ("info", ns::CORE),
            Self::Complete => ("complete", ns::EXT),
            Self::Joined => ("joined", ns::CORE),
            Self::Unjoined => ("unjoined", ns::CORE),
            Self::AmiEvent => ("event", ns::AMI),
            Self::Ref => ("ref", ns::CORE),
            Self::StopReason => ("stop", ns::EXT_COMPLETE),
            Self::HangupReason => ("hangup", ns::EXT_COMPLETE),
            Self::ErrorReason => ("error", ns::EXT_COMPLETE),
            Self::OutputSuccess => ("success", ns::OUTPUT_COMPLETE),
            Self::AmiSuccess => ("success", ns::AMI_COMPLETE),
            Self::Generic => return None,
        };
        Some(key)
    }

    /// Creates an empty element carrying this variant's name and namespace.
    pub(crate) fn element(self) -> Element {
        let (name, namespace) = self.key().unwrap_or_default();
        Element::new(name, namespace)
    }
}

// ---------------------------------------------------------------------------
// Message / ProtocolNode
// ---------------------------------------------------------------------------

/// Typed payload of a protocol node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Message {
    Command(CommandPayload),
    Event(EventPayload),
    /// Reply to a component-creating command.
    Ref { id: String },
    /// A completion reason nested inside a `complete` event.
    Reason(CompleteReason),
    Generic(Element),
}

impl Message {
    #[must_use]
    pub fn variant(&self) -> Variant {
        match self {
            Self::Command(payload) => payload.variant(),
            Self::Event(payload) => payload.variant(),
            Self::Ref { .. } => Variant::Ref,
            Self::Reason(reason) => reason.variant(),
            Self::Generic(_) => Variant::Generic,
        }
    }

    #[must_use]
    pub fn to_element(&self) -> Element {
        match self {
            Self::Command(payload) => payload.to_element(),
            Self::Event(payload) => payload.to_element(),
            Self::Ref { id } => Variant::Ref.element().with_attr("id", id.clone()),
            Self::Reason(reason) => reason.to_element(),
            Self::Generic(element) => element.clone(),
        }
    }
}

/// The universal message unit: a typed payload bound to its correlation ids.
///
/// Equality covers the payload and both ids; back-references never take part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolNode {
    pub message: Message,
    pub call_id: Option<String>,
    pub component_id: Option<String>,
}

impl ProtocolNode {
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self {
            message,
            call_id: None,
            component_id: None,
        }
    }

    #[must_use]
    pub fn variant(&self) -> Variant {
        self.message.variant()
    }

    #[must_use]
    pub fn to_element(&self) -> Element {
        self.message.to_element()
    }

    /// Converts an event node into an [`Event`], or `None` for any other payload.
    #[must_use]
    pub fn into_event(self) -> Option<Event> {
        match self.message {
            Message::Event(payload) => Some(
                Event::new(payload)
                    .with_call_id(self.call_id)
                    .with_component_id(self.component_id),
            ),
            _ => None,
        }
    }

    /// Converts a command node into a fresh [`Command`], or `None` for any other payload.
    #[must_use]
    pub fn into_command(self) -> Option<Arc<Command>> {
        match self.message {
            Message::Command(payload) => {
                let command = Command::new(payload);
                command.set_call_id(self.call_id);
                command.set_component_id(self.component_id);
                Some(command)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_variant_has_a_key() {
        for variant in Variant::REGISTERED {
            assert!(variant.key().is_some(), "{variant:?} has no key");
        }
        assert!(Variant::Generic.key().is_none());
    }

    #[test]
    fn equality_ignores_identity_but_not_ids() {
        let a = ProtocolNode {
            message: Message::Command(CommandPayload::answer()),
            call_id: Some("abc".into()),
            component_id: None,
        };
        let b = a.clone();
        assert_eq!(a, b);

        let mut c = a.clone();
        c.call_id = Some("other".into());
        assert_ne!(a, c);

        let mut d = a.clone();
        d.component_id = Some("x".into());
        assert_ne!(a, d);
    }

    #[test]
    fn into_event_keeps_ids() {
        let node = ProtocolNode {
            message: Message::Event(EventPayload::Info {
                event_name: "foo".into(),
            }),
            call_id: Some("abc".into()),
            component_id: Some("c1".into()),
        };
        let event = node.into_event().unwrap();
        assert_eq!(event.call_id(), Some("abc"));
        assert_eq!(event.component_id(), Some("c1"));
    }

    #[test]
    fn into_command_rejects_events() {
        let node = ProtocolNode::new(Message::Ref { id: "x".into() });
        assert!(node.into_command().is_none());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(Message::Ref { id: "abc".into() }).unwrap();
        assert_eq!(json["kind"], "ref");
        assert_eq!(json["payload"]["id"], "abc");
    }

    #[test]
    fn ref_exports_id() {
        let el = Message::Ref { id: "abc".into() }.to_element();
        assert_eq!(el.name, "ref");
        assert_eq!(el.namespace, ns::CORE);
        assert_eq!(el.attr("id"), Some("abc"));
    }
}
