//! Manager interface client over TCP.
//!
//! One writer task owns the sink half of the framed socket and one reader task
//! owns the stream half. Replies are matched to waiting callers by `ActionID`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callwire_core::TransportError;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::codec::{AmiCodec, AmiMessage};
use super::{AmiAction, AmiClient, AmiEvent, AmiResponse};
use crate::config::AmiConfig;

type Pending = Arc<DashMap<String, oneshot::Sender<AmiResponse>>>;

/// Manager client backed by a TCP connection.
pub struct TcpAmiClient {
    outbound: mpsc::UnboundedSender<AmiAction>,
    pending: Pending,
    next_id: AtomicU64,
    action_timeout: Duration,
}

impl TcpAmiClient {
    /// Connects, logs in, and returns the client plus the stream of manager events.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be opened or the login is rejected.
    pub async fn connect(
        config: &AmiConfig,
    ) -> anyhow::Result<(Arc<Self>, mpsc::UnboundedReceiver<AmiEvent>)> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        info!("Connected to manager interface at {}:{}", config.host, config.port);

        let (mut sink, mut frames) = Framed::new(stream, AmiCodec::new()).split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<AmiAction>();
        let (events, events_rx) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(DashMap::new());

        tokio::spawn(async move {
            while let Some(action) = outbound_rx.recv().await {
                if let Err(err) = sink.send(action).await {
                    warn!(%err, "manager write failed");
                    break;
                }
            }
        });

        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(AmiMessage::Banner(banner)) => debug!(banner, "manager banner"),
                    Ok(AmiMessage::Response {
                        action_id,
                        response,
                    }) => {
                        let waiter = action_id.and_then(|id| reader_pending.remove(&id));
                        match waiter {
                            Some((_, tx)) => {
                                let _ = tx.send(response);
                            }
                            None => debug!(?response, "unmatched manager response"),
                        }
                    }
                    Ok(AmiMessage::Event(event)) => {
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(AmiMessage::Other(fields)) => debug!(?fields, "ignoring manager block"),
                    Err(err) => {
                        warn!(%err, "manager read failed");
                        break;
                    }
                }
            }
            // Closing the senders fails every waiting action.
            reader_pending.clear();
            info!("Manager connection closed");
        });

        let client = Arc::new(Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            action_timeout: config.action_timeout,
        });

        let login = AmiAction::new("Login")
            .with("Username", config.username.clone().unwrap_or_default())
            .with("Secret", config.password.clone().unwrap_or_default())
            .with("Events", "on");
        let response = client.send_action(login).await?;
        if !response.success {
            anyhow::bail!(
                "manager login rejected: {}",
                response.message.unwrap_or_default()
            );
        }

        Ok((client, events_rx))
    }
}

#[async_trait]
impl AmiClient for TcpAmiClient {
    async fn send_action(&self, action: AmiAction) -> Result<AmiResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        let mut action = action;
        action.headers.insert(0, ("ActionID".to_string(), id.clone()));
        debug!(action = %action.name, id, "sending manager action");
        if self.outbound.send(action).is_err() {
            self.pending.remove(&id);
            return Err(TransportError::Closed);
        }

        match tokio::time::timeout(self.action_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                Err(TransportError::Timeout {
                    after: self.action_timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;

    /// Reads one action block and returns its lines.
    async fn read_block<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let line = line.trim_end().to_string();
            if line.is_empty() {
                return lines;
            }
            lines.push(line);
        }
    }

    fn action_id(lines: &[String]) -> String {
        lines
            .iter()
            .find_map(|l| l.strip_prefix("ActionID: "))
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn logs_in_sends_actions_and_streams_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut reader = BufReader::new(read);
            write.write_all(b"Asterisk Call Manager/1.1\r\n").await.unwrap();

            let login = read_block(&mut reader).await;
            assert_eq!(login[0], "Action: Login");
            let id = action_id(&login);
            write
                .write_all(
                    format!("Response: Success\r\nActionID: {id}\r\nMessage: Authentication accepted\r\n\r\n")
                        .as_bytes(),
                )
                .await
                .unwrap();

            let ping = read_block(&mut reader).await;
            assert_eq!(ping[0], "Action: Ping");
            let id = action_id(&ping);
            write
                .write_all(b"Event: FullyBooted\r\nStatus: Fully Booted\r\n\r\n")
                .await
                .unwrap();
            write
                .write_all(format!("Response: Success\r\nActionID: {id}\r\nPing: Pong\r\n\r\n").as_bytes())
                .await
                .unwrap();
        });

        let config = AmiConfig {
            host: "127.0.0.1".into(),
            port,
            username: Some("callwire".into()),
            password: Some("secret".into()),
            ..AmiConfig::default()
        };
        let (client, mut events) = TcpAmiClient::connect(&config).await.unwrap();

        let response = client.send_action(AmiAction::new("Ping")).await.unwrap();
        assert!(response.success);
        assert_eq!(response.fields, vec![("Ping".to_string(), "Pong".to_string())]);

        let event = events.recv().await.unwrap();
        assert!(event.is("FullyBooted"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rejected_login_fails_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut reader = BufReader::new(read);
            write.write_all(b"Asterisk Call Manager/1.1\r\n").await.unwrap();
            let id = action_id(&read_block(&mut reader).await);
            write
                .write_all(
                    format!("Response: Error\r\nActionID: {id}\r\nMessage: Authentication failed\r\n\r\n")
                        .as_bytes(),
                )
                .await
                .unwrap();
            // Keep the socket open until the client gives up.
            let _ = read_block(&mut reader).await;
        });

        let config = AmiConfig {
            host: "127.0.0.1".into(),
            port,
            username: Some("callwire".into()),
            password: Some("wrong".into()),
            ..AmiConfig::default()
        };
        let err = TcpAmiClient::connect(&config).await.err().unwrap();
        assert!(err.to_string().contains("Authentication failed"));
    }
}
