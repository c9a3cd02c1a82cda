//! Asterisk Manager Interface boundary.
//!
//! Manager events are flat field maps. Actions are sent through an
//! [`AmiClient`] and answered with an [`AmiResponse`].

pub mod client;
pub mod codec;

use async_trait::async_trait;
use callwire_core::{EventPayload, TransportError};

pub use client::TcpAmiClient;
pub use codec::{AmiCodec, AmiMessage};

/// A manager event: a name plus ordered fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmiEvent {
    pub name: String,
    pub fields: Vec<(String, String)>,
}

impl AmiEvent {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Field lookup, case-insensitive on the key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.get("Channel")
    }

    #[must_use]
    pub fn sub_event(&self) -> Option<&str> {
        self.get("SubEvent")
    }

    /// The protocol-level pass-through event, with lowercased attribute names.
    #[must_use]
    pub fn to_protocol(&self) -> EventPayload {
        EventPayload::AmiEvent {
            name: self.name.clone(),
            attributes: self
                .fields
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
        }
    }
}

/// A manager action. `ActionID` is assigned by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmiAction {
    pub name: String,
    pub headers: Vec<(String, String)>,
}

impl AmiAction {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Reply to a manager action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmiResponse {
    /// `Response: Success` (or `Follows`).
    pub success: bool,
    pub message: Option<String>,
    /// Every other field of the reply, excluding `Response`, `Message` and `ActionID`.
    pub fields: Vec<(String, String)>,
}

impl AmiResponse {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            fields: Vec::new(),
        }
    }
}

/// Sends manager actions and waits for their replies.
#[async_trait]
pub trait AmiClient: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the action cannot be sent or no reply
    /// arrives in time.
    async fn send_action(&self, action: AmiAction) -> Result<AmiResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup_ignores_key_case() {
        let event = AmiEvent::new("Newchannel")
            .with("Channel", "SIP/101-3f3f")
            .with("Uniqueid", "1094154427.10");
        assert_eq!(event.get("channel"), Some("SIP/101-3f3f"));
        assert_eq!(event.channel(), Some("SIP/101-3f3f"));
        assert!(event.is("newchannel"));
        assert!(event.sub_event().is_none());
    }

    #[test]
    fn protocol_event_lowercases_attribute_names() {
        let event = AmiEvent::new("Newchannel")
            .with("Channel", "SIP/101-3f3f")
            .with("State", "Ring")
            .with("CallerID", "101")
            .with("Uniqueid", "1094154427.10");

        assert_eq!(
            event.to_protocol(),
            EventPayload::AmiEvent {
                name: "Newchannel".into(),
                attributes: vec![
                    ("channel".into(), "SIP/101-3f3f".into()),
                    ("state".into(), "Ring".into()),
                    ("callerid".into(), "101".into()),
                    ("uniqueid".into(), "1094154427.10".into()),
                ],
            }
        );
    }
}
