//! Event payloads and the completion reasons nested inside `complete`.

use serde::{Deserialize, Serialize};

use super::registry::{optional_attr, ImportError, Registry};
use super::{Message, Variant};
use crate::element::Element;
use crate::headers::{Headers, HEADER_ELEMENT};

/// Why a call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Hangup,
    HangupCommand,
    Timeout,
    Busy,
    Reject,
    Error,
    /// Any reason name not listed above, kept verbatim.
    Other(String),
}

impl EndReason {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "hangup" => Self::Hangup,
            "hangup-command" => Self::HangupCommand,
            "timeout" => Self::Timeout,
            "busy" => Self::Busy,
            "reject" => Self::Reject,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Hangup => "hangup",
            Self::HangupCommand => "hangup-command",
            Self::Timeout => "timeout",
            Self::Busy => "busy",
            Self::Reject => "reject",
            Self::Error => "error",
            Self::Other(name) => name,
        }
    }
}

/// Why a command or component completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CompleteReason {
    Stop,
    Hangup,
    Error {
        details: Option<String>,
    },
    OutputSuccess,
    AmiSuccess {
        message: String,
        attributes: Vec<(String, String)>,
    },
    /// A nested element no reason is registered for.
    Unknown {
        name: String,
        namespace: String,
    },
}

impl CompleteReason {
    #[must_use]
    pub fn variant(&self) -> Variant {
        match self {
            Self::Stop => Variant::StopReason,
            Self::Hangup => Variant::HangupReason,
            Self::Error { .. } => Variant::ErrorReason,
            Self::OutputSuccess => Variant::OutputSuccess,
            Self::AmiSuccess { .. } => Variant::AmiSuccess,
            Self::Unknown { .. } => Variant::Generic,
        }
    }

    #[must_use]
    pub fn to_element(&self) -> Element {
        match self {
            Self::Stop | Self::Hangup | Self::OutputSuccess => self.variant().element(),
            Self::Error { details } => {
                let el = self.variant().element();
                match details {
                    Some(details) => el.with_text(details.clone()),
                    None => el,
                }
            }
            Self::AmiSuccess {
                message,
                attributes,
            } => {
                let mut el = self.variant().element();
                el.children
                    .push(Element::new("message", "").with_text(message.clone()));
                push_attributes(&mut el, attributes);
                el
            }
            Self::Unknown { name, namespace } => Element::new(name.clone(), namespace.clone()),
        }
    }
}

/// Typed event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventPayload {
    Offer {
        to: String,
        from: String,
        headers: Headers,
    },
    Answered {
        headers: Headers,
    },
    Ringing {
        headers: Headers,
    },
    End {
        reason: EndReason,
        headers: Headers,
    },
    Info {
        event_name: String,
    },
    Complete {
        reason: Option<CompleteReason>,
    },
    Joined {
        other_call_id: Option<String>,
        mixer_name: Option<String>,
    },
    Unjoined {
        other_call_id: Option<String>,
        mixer_name: Option<String>,
    },
    /// A manager-interface event passed through to the application.
    AmiEvent {
        name: String,
        attributes: Vec<(String, String)>,
    },
}

impl EventPayload {
    #[must_use]
    pub fn complete(reason: CompleteReason) -> Self {
        Self::Complete {
            reason: Some(reason),
        }
    }

    #[must_use]
    pub fn end(reason: EndReason) -> Self {
        Self::End {
            reason,
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn variant(&self) -> Variant {
        match self {
            Self::Offer { .. } => Variant::Offer,
            Self::Answered { .. } => Variant::Answered,
            Self::Ringing { .. } => Variant::Ringing,
            Self::End { .. } => Variant::End,
            Self::Info { .. } => Variant::Info,
            Self::Complete { .. } => Variant::Complete,
            Self::Joined { .. } => Variant::Joined,
            Self::Unjoined { .. } => Variant::Unjoined,
            Self::AmiEvent { .. } => Variant::AmiEvent,
        }
    }

    /// Whether receiving this event completes the command it belongs to.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut el = self.variant().element();
        match self {
            Self::Offer { to, from, headers } => {
                el.set_attr("to", to.clone());
                el.set_attr("from", from.clone());
                headers.append_to(&mut el);
            }
            Self::Answered { headers } | Self::Ringing { headers } => headers.append_to(&mut el),
            Self::End { reason, headers } => {
                el.children.push(Element::new(reason.name(), ""));
                headers.append_to(&mut el);
            }
            Self::Info { event_name } => el.set_attr("event-name", event_name.clone()),
            Self::Complete { reason } => {
                if let Some(reason) = reason {
                    el.children.push(reason.to_element());
                }
            }
            Self::Joined {
                other_call_id,
                mixer_name,
            }
            | Self::Unjoined {
                other_call_id,
                mixer_name,
            } => {
                el = el
                    .with_opt_attr("call-id", other_call_id.as_deref())
                    .with_opt_attr("mixer-name", mixer_name.as_deref());
            }
            Self::AmiEvent { name, attributes } => {
                el.set_attr("name", name.clone());
                push_attributes(&mut el, attributes);
            }
        }
        el
    }
}

fn push_attributes(el: &mut Element, attributes: &[(String, String)]) {
    for (name, value) in attributes {
        el.children.push(
            Element::new("attribute", "")
                .with_attr("name", name.clone())
                .with_attr("value", value.clone()),
        );
    }
}

fn read_attributes(el: &Element) -> Vec<(String, String)> {
    el.children_named("attribute")
        .filter_map(|attr| {
            Some((
                attr.attr("name")?.to_string(),
                attr.attr("value").unwrap_or_default().to_string(),
            ))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

fn event(payload: EventPayload) -> Result<Message, ImportError> {
    Ok(Message::Event(payload))
}

fn import_offer(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    event(EventPayload::Offer {
        to: el.attr("to").unwrap_or_default().to_string(),
        from: el.attr("from").unwrap_or_default().to_string(),
        headers: Headers::from_element(el),
    })
}

fn import_answered(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    event(EventPayload::Answered {
        headers: Headers::from_element(el),
    })
}

fn import_ringing(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    event(EventPayload::Ringing {
        headers: Headers::from_element(el),
    })
}

fn import_end(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    let reason = el
        .children
        .iter()
        .find(|c| c.name != HEADER_ELEMENT)
        .map_or(EndReason::Hangup, |c| EndReason::from_name(&c.name));
    event(EventPayload::End {
        reason,
        headers: Headers::from_element(el),
    })
}

fn import_info(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    event(EventPayload::Info {
        event_name: el.attr("event-name").unwrap_or_default().to_string(),
    })
}

fn import_complete(registry: &Registry, el: &Element) -> Result<Message, ImportError> {
    let reason = match el.first_child() {
        Some(child) => {
            let mut child = child.clone();
            if child.namespace.is_empty() {
                child.namespace.clone_from(&el.namespace);
            }
            match registry.import_message(&child)? {
                Message::Reason(reason) => Some(reason),
                _ => Some(CompleteReason::Unknown {
                    name: child.name,
                    namespace: child.namespace,
                }),
            }
        }
        None => None,
    };
    event(EventPayload::Complete { reason })
}

fn import_joined(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    event(EventPayload::Joined {
        other_call_id: optional_attr(el, "call-id"),
        mixer_name: optional_attr(el, "mixer-name"),
    })
}

fn import_unjoined(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    event(EventPayload::Unjoined {
        other_call_id: optional_attr(el, "call-id"),
        mixer_name: optional_attr(el, "mixer-name"),
    })
}

fn import_ami_event(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    event(EventPayload::AmiEvent {
        name: el.attr("name").unwrap_or_default().to_string(),
        attributes: read_attributes(el),
    })
}

fn import_ref(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    Ok(Message::Ref {
        id: super::registry::required_attr(el, "id")?,
    })
}

fn reason(reason: CompleteReason) -> Result<Message, ImportError> {
    Ok(Message::Reason(reason))
}

fn import_stop_reason(_: &Registry, _: &Element) -> Result<Message, ImportError> {
    reason(CompleteReason::Stop)
}

fn import_hangup_reason(_: &Registry, _: &Element) -> Result<Message, ImportError> {
    reason(CompleteReason::Hangup)
}

fn import_error_reason(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    let details = el.text.trim();
    reason(CompleteReason::Error {
        details: (!details.is_empty()).then(|| details.to_string()),
    })
}

fn import_output_success(_: &Registry, _: &Element) -> Result<Message, ImportError> {
    reason(CompleteReason::OutputSuccess)
}

fn import_ami_success(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    let message = el
        .children_named("message")
        .next()
        .map(|m| m.text.clone())
        .unwrap_or_default();
    reason(CompleteReason::AmiSuccess {
        message,
        attributes: read_attributes(el),
    })
}

/// Registers every event, reply and reason variant.
pub(crate) fn register(registry: &mut Registry) {
    let table: [(Variant, super::Constructor); 15] = [
        (Variant::Offer, import_offer),
        (Variant::Answered, import_answered),
        (Variant::Ringing, import_ringing),
        (Variant::End, import_end),
        (Variant::Info, import_info),
        (Variant::Complete, import_complete),
        (Variant::Joined, import_joined),
        (Variant::Unjoined, import_unjoined),
        (Variant::AmiEvent, import_ami_event),
        (Variant::Ref, import_ref),
        (Variant::StopReason, import_stop_reason),
        (Variant::HangupReason, import_hangup_reason),
        (Variant::ErrorReason, import_error_reason),
        (Variant::OutputSuccess, import_output_success),
        (Variant::AmiSuccess, import_ami_success),
    ];
    for (variant, constructor) in table {
        registry.register_variant(variant, constructor);
    }
}
