//! Connection configuration for the correlation engine.

use std::time::Duration;

/// Per-connection settings controlling write timeouts and addressing.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long `write` waits for a correlated reply before giving up.
    pub write_timeout: Duration,
    /// Address of the call-control service, used for global commands on
    /// transports that route by address.
    pub service_domain: Option<String>,
    /// How long shutdown waits for in-flight writes to finish.
    pub drain_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(3),
            service_domain: None,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.write_timeout, Duration::from_secs(3));
        assert!(config.service_domain.is_none());
        assert_eq!(config.drain_timeout, Duration::from_secs(5));
    }
}
