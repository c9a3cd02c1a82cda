//! Server-level configuration: AMI connection, translator behaviour, and the
//! correlation engine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::network::ConnectionConfig;

/// Errors raised while validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("You must supply a username for Asterisk AMI")]
    MissingUsername,
    #[error("You must supply a password for Asterisk AMI")]
    MissingPassword,
    #[error("unknown media engine `{0}` (expected asterisk or unimrcp)")]
    UnknownMediaEngine(String),
}

/// Asterisk Manager Interface connection settings.
#[derive(Debug, Clone)]
pub struct AmiConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// How long a single manager action may wait for its response.
    pub action_timeout: Duration,
}

impl AmiConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingUsername`] or [`ConfigError::MissingPassword`]
    /// when credentials are absent or empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingUsername);
        }
        if self.password.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingPassword);
        }
        Ok(())
    }
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            host: "::1".to_string(),
            port: 5038,
            username: None,
            password: None,
            action_timeout: Duration::from_secs(10),
        }
    }
}

/// Engine used to render output prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaEngine {
    /// Native file playback.
    #[default]
    Asterisk,
    /// Speech synthesis through `UniMRCP`.
    Unimrcp,
}

impl fmt::Display for MediaEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asterisk => "asterisk",
            Self::Unimrcp => "unimrcp",
        })
    }
}

impl FromStr for MediaEngine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asterisk" => Ok(Self::Asterisk),
            "unimrcp" => Ok(Self::Unimrcp),
            _ => Err(ConfigError::UnknownMediaEngine(s.to_string())),
        }
    }
}

/// Translator behaviour.
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// Channel variable carrying the external call id on originated calls.
    pub call_id_variable: String,
    pub media_engine: MediaEngine,
    /// Manager events forwarded to the application even when no call owns them.
    pub global_events: Vec<String>,
}

impl TranslatorConfig {
    /// Whether `name` is a recognized global event. Case-insensitive.
    #[must_use]
    pub fn is_global_event(&self, name: &str) -> bool {
        self.global_events
            .iter()
            .any(|global| global.eq_ignore_ascii_case(name))
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            call_id_variable: "callwire_call_id".to_string(),
            media_engine: MediaEngine::default(),
            global_events: ["PeerStatus", "Registry", "Reload", "Shutdown", "ContactStatus"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Everything the server needs to run.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub ami: AmiConfig,
    pub translator: TranslatorConfig,
    pub connection: ConnectionConfig,
}

impl ServerConfig {
    /// # Errors
    ///
    /// Propagates [`AmiConfig::validate`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ami.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ami_config_defaults() {
        let config = AmiConfig::default();
        assert_eq!(config.host, "::1");
        assert_eq!(config.port, 5038);
        assert!(config.username.is_none());
        assert!(config.password.is_none());
        assert_eq!(config.action_timeout, Duration::from_secs(10));
    }

    #[test]
    fn ami_config_requires_credentials() {
        let mut config = AmiConfig::default();
        assert_eq!(config.validate(), Err(ConfigError::MissingUsername));
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "You must supply a username for Asterisk AMI"
        );

        config.username = Some("admin".into());
        assert_eq!(config.validate(), Err(ConfigError::MissingPassword));

        config.password = Some(String::new());
        assert_eq!(config.validate(), Err(ConfigError::MissingPassword));

        config.password = Some("secret".into());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn translator_config_defaults() {
        let config = TranslatorConfig::default();
        assert_eq!(config.call_id_variable, "callwire_call_id");
        assert_eq!(config.media_engine, MediaEngine::Asterisk);
        assert!(config.is_global_event("peerstatus"));
        assert!(!config.is_global_event("Newchannel"));
    }

    #[test]
    fn media_engine_parses() {
        assert_eq!("UniMRCP".parse::<MediaEngine>(), Ok(MediaEngine::Unimrcp));
        assert_eq!(
            "festival".parse::<MediaEngine>(),
            Err(ConfigError::UnknownMediaEngine("festival".into()))
        );
        assert_eq!(MediaEngine::Asterisk.to_string(), "asterisk");
    }
}
