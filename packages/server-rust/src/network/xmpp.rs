//! XMPP addressing for call-control transports.
//!
//! Calls are addressed as `call_id@domain`, components as
//! `call_id@domain/component_id`. Error stanzas become [`ProtocolError`]s
//! attributed to the sender's call and component.

use std::fmt;
use std::str::FromStr;

use callwire_core::ProtocolError;

/// A parsed `node@domain/resource` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jid {
    pub node: Option<String>,
    pub domain: String,
    pub resource: Option<String>,
}

impl Jid {
    #[must_use]
    pub fn new(node: Option<&str>, domain: &str, resource: Option<&str>) -> Self {
        Self {
            node: node.map(str::to_string),
            domain: domain.to_string(),
            resource: resource.map(str::to_string),
        }
    }
}

/// The address string did not contain a domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address `{0}`")]
pub struct JidError(pub String);

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bare, resource) = match s.split_once('/') {
            Some((bare, resource)) => (bare, Some(resource)),
            None => (s, None),
        };
        let (node, domain) = match bare.split_once('@') {
            Some((node, domain)) => (Some(node), domain),
            None => (None, bare),
        };
        if domain.is_empty() || node.is_some_and(str::is_empty) {
            return Err(JidError(s.to_string()));
        }
        Ok(Self::new(node, domain, resource.filter(|r| !r.is_empty())))
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(node) = &self.node {
            write!(f, "{node}@")?;
        }
        f.write_str(&self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

/// An error stanza as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StanzaError {
    /// Defined condition, e.g. `item-not-found`.
    pub condition: String,
    pub text: Option<String>,
}

impl StanzaError {
    /// Converts to a [`ProtocolError`] attributed to the sender.
    #[must_use]
    pub fn into_protocol_error(self, from: Option<&Jid>) -> ProtocolError {
        ProtocolError::new(
            self.condition.replace('-', "_"),
            self.text,
            from.and_then(|jid| jid.node.clone()),
            from.and_then(|jid| jid.resource.clone()),
        )
    }
}
