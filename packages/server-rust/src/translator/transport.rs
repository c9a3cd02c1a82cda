//! In-process [`Transport`] that hands commands straight to the translator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callwire_core::TransportError;
use tracing::debug;

use super::TranslatorHandle;
use crate::network::{Outbound, Transport};

/// Routes each outbound command to the translator and answers the write once
/// the command's response is set.
#[derive(Debug, Clone)]
pub struct TranslatorTransport {
    translator: TranslatorHandle,
    /// Bounds the wait for a response; usually the connection's write timeout.
    reply_timeout: Duration,
}

impl TranslatorTransport {
    #[must_use]
    pub fn new(translator: TranslatorHandle, reply_timeout: Duration) -> Self {
        Self {
            translator,
            reply_timeout,
        }
    }
}

#[async_trait]
impl Transport for TranslatorTransport {
    async fn send(&self, outbound: Outbound) -> Result<(), TransportError> {
        if self.translator.is_closed() {
            return Err(TransportError::Closed);
        }
        let Outbound {
            target,
            command,
            reply,
            ..
        } = outbound;
        self.translator.execute_command(Arc::clone(&command), target);

        let timeout = self.reply_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, command.wait_response()).await {
                Ok(response) => {
                    let id = reply.id().to_string();
                    if !reply.send(response) {
                        debug!(id, "response arrived after the write gave up");
                    }
                }
                Err(_) => debug!(id = reply.id(), "no response from translator"),
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use callwire_core::{Command, CommandOutcome, CommandPayload, CommandTarget, ProtocolError};

    use super::*;
    use crate::config::TranslatorConfig;
    use crate::network::{Connection, ConnectionConfig};
    use crate::test_support::MockAmiClient;
    use crate::translator::Translator;

    fn connection() -> (Arc<Connection>, TranslatorHandle, Arc<MockAmiClient>) {
        let ami = MockAmiClient::new();
        let (translator, feed) = Translator::spawn(ami.clone(), TranslatorConfig::default());
        let config = ConnectionConfig::default();
        let transport = Arc::new(TranslatorTransport::new(
            translator.clone(),
            config.write_timeout,
        ));
        let (connection, _queue) = Connection::new(transport, config);
        connection.attach(feed);
        (connection, translator, ami)
    }

    #[tokio::test]
    async fn routing_errors_come_back_through_the_write() {
        let (connection, _translator, _ami) = connection();
        let command = Command::new(CommandPayload::answer());

        let result = connection.write(&command, CommandTarget::call("nope")).await;

        assert_eq!(result, Err(ProtocolError::call_not_found("nope").into()));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn dial_reference_comes_back_through_the_write() {
        let (connection, translator, ami) = connection();
        let command = Command::new(CommandPayload::dial("SIP/1234", Some("abc123".into())));

        let result = connection.write(&command, CommandTarget::global()).await;

        let Ok(CommandOutcome::Ref { id }) = &result else {
            panic!("unexpected {result:?}");
        };
        let call = translator.call_with_id(id).await.unwrap();
        assert_eq!(call.channel(), "SIP/1234");
        assert_eq!(ami.actions_named("Originate").len(), 1);
    }

    #[tokio::test]
    async fn stopped_translator_refuses_sends() {
        let (connection, translator, _ami) = connection();
        translator.shutdown().await;
        while !translator.is_closed() {
            tokio::task::yield_now().await;
        }

        let command = Command::new(CommandPayload::answer());
        let result = connection.write(&command, CommandTarget::call("abc")).await;
        assert_eq!(result, Err(TransportError::Closed.into()));
    }
}
