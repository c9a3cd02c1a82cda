//! Header extension shared by every protocol variant.
//!
//! On the wire header names use `-` (`X-Reason-Internal`); in memory they use
//! `_` and lowercase (`x_reason_internal`). Conversion happens at the element
//! boundary only.

use serde::{Deserialize, Serialize};

use crate::element::Element;

/// Local name of a header child element.
pub const HEADER_ELEMENT: &str = "header";

/// Converts a wire header name to its in-memory form.
#[must_use]
pub fn from_wire_name(name: &str) -> String {
    name.replace('-', "_").to_lowercase()
}

/// Converts an in-memory header name to its wire form.
#[must_use]
pub fn to_wire_name(name: &str) -> String {
    name.replace('_', "-")
}

/// A single header in in-memory form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    /// Creates a header, normalizing the name to in-memory form.
    #[must_use]
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: from_wire_name(name),
            value: value.into(),
        }
    }
}

/// Ordered header set. Names are unique; inserting an existing name replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<Header>);

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a header. `name` may be given in either form.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let header = Header::new(name, value);
        match self.0.iter_mut().find(|h| h.name == header.name) {
            Some(existing) => existing.value = header.value,
            None => self.0.push(header),
        }
    }

    /// Looks up a header by name in either form.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = from_wire_name(name);
        self.0
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads every `<header name value>` child of `element`.
    #[must_use]
    pub fn from_element(element: &Element) -> Self {
        let mut headers = Self::new();
        for child in element.children_named(HEADER_ELEMENT) {
            if let Some(name) = child.attr("name") {
                headers.insert(name, child.attr("value").unwrap_or_default());
            }
        }
        headers
    }

    /// Appends the headers to `element` as wire-form `<header>` children.
    pub fn append_to(&self, element: &mut Element) {
        for header in &self.0 {
            element.children.push(
                Element::new(HEADER_ELEMENT, "")
                    .with_attr("name", to_wire_name(&header.name))
                    .with_attr("value", header.value.clone()),
            );
        }
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_normalized() {
        assert_eq!(from_wire_name("X-Reason-Internal"), "x_reason_internal");
        assert_eq!(to_wire_name("x_reason_internal"), "x-reason-internal");
    }

    #[test]
    fn insert_replaces_existing_name() {
        let mut headers = Headers::new();
        headers.insert("Max-Forwards", "70");
        headers.insert("max_forwards", "69");

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Max-Forwards"), Some("69"));
    }

    #[test]
    fn reads_and_writes_header_children() {
        let element = Element::new("offer", "urn:xmpp:rayo:1")
            .with_child(
                Element::new("header", "")
                    .with_attr("name", "X-skill")
                    .with_attr("value", "agent"),
            )
            .with_child(Element::new("other", ""));

        let headers = Headers::from_element(&element);
        assert_eq!(headers.get("x_skill"), Some("agent"));

        let mut out = Element::new("offer", "urn:xmpp:rayo:1");
        headers.append_to(&mut out);
        assert_eq!(out.children.len(), 1);
        assert_eq!(out.children[0].attr("name"), Some("x-skill"));
    }

    #[test]
    fn collects_from_pairs_in_order() {
        let headers: Headers = [("b", "2"), ("a", "1")].into_iter().collect();
        let names: Vec<&str> = headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
