//! Correlation engine, addressing, configuration, and shutdown control.

pub mod config;
pub mod connection;
pub mod correlation;
pub mod shutdown;
pub mod xmpp;

pub use config::*;
pub use connection::*;
pub use correlation::{PendingReplies, ReplyTo};
pub use shutdown::*;
pub use xmpp::{Jid, StanzaError};
