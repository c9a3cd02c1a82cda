//! Command payloads: what an application asks a call, a component or the
//! translator itself to do.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::registry::{optional_attr, required_attr, ImportError, Registry};
use super::{Message, Variant};
use crate::element::Element;
use crate::headers::{Headers, HEADER_ELEMENT};

/// Reason given when rejecting an offered call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Busy,
    #[default]
    Decline,
    Error,
}

impl RejectReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Decline => "decline",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "busy" => Ok(Self::Busy),
            "decline" => Ok(Self::Decline),
            "error" => Ok(Self::Error),
            other => Err(other.to_string()),
        }
    }
}

/// Typed command payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandPayload {
    Answer {
        headers: Headers,
    },
    Accept {
        headers: Headers,
    },
    Hangup {
        headers: Headers,
    },
    Reject {
        reason: RejectReason,
        headers: Headers,
    },
    Redirect {
        to: String,
        headers: Headers,
    },
    /// Originate a new outbound call. Global.
    Dial {
        to: String,
        from: Option<String>,
        headers: Headers,
    },
    /// Bridge to another call or enter a named mixer.
    Join {
        other_call_id: Option<String>,
        mixer_name: Option<String>,
    },
    /// Play one or more prompts. Creates a component.
    Output {
        voice: Option<String>,
        prompts: Vec<String>,
    },
    /// Stop a running component.
    Stop,
    /// Raw manager action. Global.
    AmiAction {
        name: String,
        params: Vec<(String, String)>,
    },
}

impl CommandPayload {
    #[must_use]
    pub fn answer() -> Self {
        Self::Answer {
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn accept() -> Self {
        Self::Accept {
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn hangup() -> Self {
        Self::Hangup {
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn reject(reason: RejectReason) -> Self {
        Self::Reject {
            reason,
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn redirect(to: impl Into<String>) -> Self {
        Self::Redirect {
            to: to.into(),
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn dial(to: impl Into<String>, from: Option<String>) -> Self {
        Self::Dial {
            to: to.into(),
            from,
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn output(prompts: Vec<String>) -> Self {
        Self::Output {
            voice: None,
            prompts,
        }
    }

    #[must_use]
    pub fn ami_action(name: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self::AmiAction {
            name: name.into(),
            params,
        }
    }

    #[must_use]
    pub fn variant(&self) -> Variant {
        match self {
            Self::Answer { .. } => Variant::Answer,
            Self::Accept { .. } => Variant::Accept,
            Self::Hangup { .. } => Variant::Hangup,
            Self::Reject { .. } => Variant::Reject,
            Self::Redirect { .. } => Variant::Redirect,
            Self::Dial { .. } => Variant::Dial,
            Self::Join { .. } => Variant::Join,
            Self::Output { .. } => Variant::Output,
            Self::Stop => Variant::Stop,
            Self::AmiAction { .. } => Variant::AmiAction,
        }
    }

    /// Mutable access to the header set, for variants that carry one.
    pub fn headers_mut(&mut self) -> Option<&mut Headers> {
        match self {
            Self::Answer { headers }
            | Self::Accept { headers }
            | Self::Hangup { headers }
            | Self::Reject { headers, .. }
            | Self::Redirect { headers, .. }
            | Self::Dial { headers, .. } => Some(headers),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut el = self.variant().element();
        match self {
            Self::Answer { headers } | Self::Accept { headers } | Self::Hangup { headers } => {
                headers.append_to(&mut el);
            }
            Self::Reject { reason, headers } => {
                el.children.push(Element::new(reason.as_str(), ""));
                headers.append_to(&mut el);
            }
            Self::Redirect { to, headers } => {
                el.set_attr("to", to.clone());
                headers.append_to(&mut el);
            }
            Self::Dial { to, from, headers } => {
                el.set_attr("to", to.clone());
                if let Some(from) = from {
                    el.set_attr("from", from.clone());
                }
                headers.append_to(&mut el);
            }
            Self::Join {
                other_call_id,
                mixer_name,
            } => {
                el = el
                    .with_opt_attr("call-id", other_call_id.as_deref())
                    .with_opt_attr("mixer-name", mixer_name.as_deref());
            }
            Self::Output { voice, prompts } => {
                el = el.with_opt_attr("voice", voice.as_deref());
                for prompt in prompts {
                    el.children
                        .push(Element::new("audio", "").with_attr("url", prompt.clone()));
                }
            }
            Self::Stop => {}
            Self::AmiAction { name, params } => {
                el.set_attr("name", name.clone());
                for (key, value) in params {
                    el.children.push(
                        Element::new("param", "")
                            .with_attr("name", key.clone())
                            .with_attr("value", value.clone()),
                    );
                }
            }
        }
        el
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

fn command(payload: CommandPayload) -> Result<Message, ImportError> {
    Ok(Message::Command(payload))
}

fn import_answer(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    command(CommandPayload::Answer {
        headers: Headers::from_element(el),
    })
}

fn import_accept(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    command(CommandPayload::Accept {
        headers: Headers::from_element(el),
    })
}

fn import_hangup(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    command(CommandPayload::Hangup {
        headers: Headers::from_element(el),
    })
}

fn import_reject(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    let reason = match el.children.iter().find(|c| c.name != HEADER_ELEMENT) {
        Some(child) => child
            .name
            .parse()
            .map_err(|value| ImportError::InvalidValue {
                element: el.name.clone(),
                field: "reason",
                value,
            })?,
        None => RejectReason::default(),
    };
    command(CommandPayload::Reject {
        reason,
        headers: Headers::from_element(el),
    })
}

fn import_redirect(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    command(CommandPayload::Redirect {
        to: required_attr(el, "to")?,
        headers: Headers::from_element(el),
    })
}

fn import_dial(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    command(CommandPayload::Dial {
        to: required_attr(el, "to")?,
        from: optional_attr(el, "from"),
        headers: Headers::from_element(el),
    })
}

fn import_join(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    command(CommandPayload::Join {
        other_call_id: optional_attr(el, "call-id"),
        mixer_name: optional_attr(el, "mixer-name"),
    })
}

fn import_output(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    let mut prompts: Vec<String> = el
        .children_named("audio")
        .filter_map(|audio| audio.attr("url"))
        .map(str::to_string)
        .collect();
    if prompts.is_empty() && !el.text.trim().is_empty() {
        prompts.push(el.text.trim().to_string());
    }
    command(CommandPayload::Output {
        voice: optional_attr(el, "voice"),
        prompts,
    })
}

fn import_stop(_: &Registry, _: &Element) -> Result<Message, ImportError> {
    command(CommandPayload::Stop)
}

fn import_ami_action(_: &Registry, el: &Element) -> Result<Message, ImportError> {
    let params = el
        .children_named("param")
        .filter_map(|param| {
            let name = param.attr("name")?;
            Some((name.to_string(), param.attr("value").unwrap_or_default().to_string()))
        })
        .collect();
    command(CommandPayload::AmiAction {
        name: required_attr(el, "name")?,
        params,
    })
}

/// Registers every command variant.
pub(crate) fn register(registry: &mut Registry) {
    let table: [(Variant, super::Constructor); 10] = [
        (Variant::Answer, import_answer),
        (Variant::Accept, import_accept),
        (Variant::Hangup, import_hangup),
        (Variant::Reject, import_reject),
        (Variant::Redirect, import_redirect),
        (Variant::Dial, import_dial),
        (Variant::Join, import_join),
        (Variant::Output, import_output),
        (Variant::Stop, import_stop),
        (Variant::AmiAction, import_ami_action),
    ];
    for (variant, constructor) in table {
        registry.register_variant(variant, constructor);
    }
}
