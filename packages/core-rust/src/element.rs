//! Generic wire element exchanged with stanza codecs.
//!
//! An [`Element`] is the codec-neutral shape of an inbound or outbound message:
//! a local name, a namespace, ordered attributes, child elements and text. The
//! registry turns elements into typed nodes and every variant can be turned back
//! into an element for outbound transports.

use serde::{Deserialize, Serialize};

/// A codec-neutral wire element.
///
/// Attribute order is preserved. Child elements with an empty namespace are
/// treated as belonging to their parent's namespace by the codec that built them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Local element name, e.g. `"offer"`.
    pub name: String,
    /// Namespace URI. May be empty.
    pub namespace: String,
    /// Ordered attribute name/value pairs.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<Element>,
    /// Concatenated text content.
    pub text: String,
}

impl Element {
    /// Creates an empty element with the given name and namespace.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Builder form of [`Element::set_attr`].
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder form that only sets the attribute when a value is present.
    #[must_use]
    pub fn with_opt_attr(self, name: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.with_attr(name, value),
            None => self,
        }
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Replaces the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Returns the value of the named attribute.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute, replacing an existing value in place so order is kept.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Returns the first child element, if any.
    #[must_use]
    pub fn first_child(&self) -> Option<&Element> {
        self.children.first()
    }

    /// Iterates the children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Returns the namespace of a child, inheriting this element's namespace when empty.
    #[must_use]
    pub fn child_namespace<'a>(&'a self, child: &'a Element) -> &'a str {
        if child.namespace.is_empty() {
            &self.namespace
        } else {
            &child.namespace
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_attr_replaces_in_place() {
        let mut el = Element::new("dial", "urn:test")
            .with_attr("to", "a")
            .with_attr("from", "b");
        el.set_attr("to", "c");

        assert_eq!(el.attr("to"), Some("c"));
        assert_eq!(el.attributes[0].0, "to");
        assert_eq!(el.attributes.len(), 2);
    }

    #[test]
    fn opt_attr_skips_none() {
        let el = Element::new("dial", "").with_opt_attr("from", None);
        assert!(el.attributes.is_empty());
    }

    #[test]
    fn child_namespace_inherits_parent() {
        let child = Element::new("busy", "");
        let parent = Element::new("reject", "urn:parent").with_child(child.clone());
        assert_eq!(parent.child_namespace(&child), "urn:parent");

        let explicit = Element::new("stop", "urn:child");
        assert_eq!(parent.child_namespace(&explicit), "urn:child");
    }
}
