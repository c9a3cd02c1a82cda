//! Runs the Asterisk translator against a live manager interface and logs
//! every event it produces.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use callwire_core::Event;
use callwire_server::ami::TcpAmiClient;
use callwire_server::{
    AmiConfig, Connection, ConnectionEvent, MediaEngine, ServerConfig, Translator,
    TranslatorConfig, TranslatorTransport,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "callwire")]
#[command(about = "Call-control bridge for Asterisk", long_about = None)]
struct Args {
    /// Manager interface host
    #[arg(long, env = "AMI_HOST", default_value = "::1")]
    host: String,

    /// Manager interface port
    #[arg(long, env = "AMI_PORT", default_value_t = 5038)]
    port: u16,

    #[arg(long, env = "AMI_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "AMI_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// asterisk or unimrcp
    #[arg(long, env = "CALLWIRE_MEDIA_ENGINE", default_value = "asterisk")]
    media_engine: MediaEngine,

    /// Channel variable carrying the call id on dialed calls
    #[arg(long, env = "CALLWIRE_CALL_ID_VARIABLE")]
    call_id_variable: Option<String>,

    /// Seconds a command waits for its response
    #[arg(long, env = "CALLWIRE_WRITE_TIMEOUT", default_value_t = 3)]
    write_timeout: u64,

    /// Emit logs as JSON
    #[arg(long, env = "CALLWIRE_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig {
            ami: AmiConfig {
                host: self.host,
                port: self.port,
                username: self.username,
                password: self.password,
                ..AmiConfig::default()
            },
            translator: TranslatorConfig {
                media_engine: self.media_engine,
                ..TranslatorConfig::default()
            },
            ..ServerConfig::default()
        };
        if let Some(variable) = self.call_id_variable {
            config.translator.call_id_variable = variable;
        }
        config.connection.write_timeout = Duration::from_secs(self.write_timeout);
        config
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn log_event(event: &Event) {
    match serde_json::to_string(event.payload()) {
        Ok(payload) => info!(
            call_id = ?event.call_id(),
            component_id = ?event.component_id(),
            %payload,
            "event"
        ),
        Err(err) => warn!(%err, payload = ?event.payload(), "event not serializable"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = args.into_config();
    config.validate().context("invalid configuration")?;

    let (ami, mut ami_events) = TcpAmiClient::connect(&config.ami)
        .await
        .context("failed to connect to the manager interface")?;

    let (translator, feed) = Translator::spawn(ami, config.translator.clone());
    let pump = translator.clone();
    tokio::spawn(async move {
        while let Some(event) = ami_events.recv().await {
            pump.handle_ami_event(event);
        }
        warn!("manager interface connection closed");
    });

    let transport = Arc::new(TranslatorTransport::new(
        translator.clone(),
        config.connection.write_timeout,
    ));
    let (connection, mut queue) = Connection::new(transport, config.connection.clone());
    connection.attach(feed);
    connection.lifecycle().set_ready();
    info!(media_engine = %config.translator.media_engine, "callwire ready");

    loop {
        tokio::select! {
            event = queue.pop() => match event {
                Some(ConnectionEvent::Event(event)) => log_event(&event),
                Some(ConnectionEvent::Connected) => info!("backend connected"),
                Some(ConnectionEvent::Fault(error)) => warn!(%error, "unattributed fault"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    if !connection.drain().await {
        warn!("commands still in flight at shutdown");
    }
    translator.shutdown().await;
    Ok(())
}
