//! `Callwire` Server: correlation engine, Asterisk translator, and AMI client.

pub mod actor;
pub mod ami;
pub mod config;
pub mod network;
pub mod translator;

pub use config::{AmiConfig, ConfigError, MediaEngine, ServerConfig, TranslatorConfig};
pub use network::{Connection, ConnectionEvent, EventQueue, Transport};
pub use translator::{Translator, TranslatorHandle, TranslatorTransport};

#[cfg(test)]
mod test_support;
