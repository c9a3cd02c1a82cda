//! Message registry: `(local name, namespace)` to variant constructor.
//!
//! The standard registry is built once on first use and is read-only
//! afterwards, so lookups need no locking.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::{commands, events, Message, ProtocolNode, Variant};
use crate::element::Element;

/// Builds a typed message from a wire element. Receives the registry so nested
/// elements can be imported recursively.
pub type Constructor = fn(&Registry, &Element) -> Result<Message, ImportError>;

/// A registered element that could not be turned into its variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImportError {
    #[error("<{element}> is missing required attribute `{attribute}`")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    #[error("<{element}> has invalid {field} `{value}`")]
    InvalidValue {
        element: String,
        field: &'static str,
        value: String,
    },
}

pub(crate) fn required_attr(el: &Element, attribute: &'static str) -> Result<String, ImportError> {
    el.attr(attribute)
        .map(str::to_string)
        .ok_or_else(|| ImportError::MissingAttribute {
            element: el.name.clone(),
            attribute,
        })
}

pub(crate) fn optional_attr(el: &Element, attribute: &str) -> Option<String> {
    el.attr(attribute).map(str::to_string)
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    variant: Variant,
    constructor: Constructor,
}

/// Lookup table from namespace, then local name, to a variant constructor.
#[derive(Debug, Default)]
pub struct Registry {
    namespaces: HashMap<String, HashMap<String, Entry>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in variant.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        commands::register(&mut registry);
        events::register(&mut registry);
        registry
    }

    /// Associates `variant` and its constructor with `(local_name, namespace)`.
    ///
    /// Registering the same key twice replaces the earlier entry.
    pub fn register(
        &mut self,
        variant: Variant,
        local_name: &str,
        namespace: &str,
        constructor: Constructor,
    ) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(
                local_name.to_string(),
                Entry {
                    variant,
                    constructor,
                },
            );
    }

    /// Registers `variant` under its own wire key. Variants without one are ignored.
    pub fn register_variant(&mut self, variant: Variant, constructor: Constructor) {
        if let Some((name, namespace)) = variant.key() {
            self.register(variant, name, namespace, constructor);
        }
    }

    fn entry(&self, local_name: &str, namespace: &str) -> Option<Entry> {
        self.namespaces.get(namespace)?.get(local_name).copied()
    }

    #[must_use]
    pub fn resolve(&self, local_name: &str, namespace: &str) -> Option<Variant> {
        self.entry(local_name, namespace).map(|entry| entry.variant)
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.namespaces.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Imports an element without binding correlation ids.
    ///
    /// # Errors
    ///
    /// Returns an [`ImportError`] when the element resolves to a variant but
    /// lacks data that variant requires.
    pub fn import_message(&self, element: &Element) -> Result<Message, ImportError> {
        match self.entry(&element.name, &element.namespace) {
            Some(entry) => (entry.constructor)(self, element),
            None => Ok(Message::Generic(element.clone())),
        }
    }

    /// Imports an element as a node bound to the given correlation ids.
    ///
    /// Unregistered elements become [`Message::Generic`].
    ///
    /// # Errors
    ///
    /// See [`Registry::import_message`].
    pub fn import(
        &self,
        element: &Element,
        call_id: Option<String>,
        component_id: Option<String>,
    ) -> Result<ProtocolNode, ImportError> {
        Ok(ProtocolNode {
            message: self.import_message(element)?,
            call_id,
            component_id,
        })
    }
}

/// Returns the process-wide standard registry.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::standard)
}
