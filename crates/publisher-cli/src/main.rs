//! Command-line probe for a BFO Publisher service.
//!
//! Usage:
//!   bfo-publisher --url https://bfo.example.com/publisher/ status
//!   bfo-publisher --config publisher.toml send convert --params '{"put": []}'
//!
//! Env vars:
//!   BFO_PUBLISHER_CONFIG         path to a TOML config file
//!   BFO_PUBLISHER_URL            service URL (overrides the file)
//!   BFO_PUBLISHER_AUTHORIZATION  credential (overrides the file)
//!   RUST_LOG                     log filter (default: "info")

use std::path::{Path, PathBuf};

use anyhow::Context;
use bfo_cbor::Value;
use bfo_publisher::{envelope, Publisher, PublisherConfig, RequestEvent};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Talk to a BFO Publisher service over its WebSocket endpoint.
#[derive(Debug, Parser)]
#[command(name = "bfo-publisher", version, about)]
struct Cli {
    /// TOML file holding a publisher config.
    #[arg(long, global = true, env = "BFO_PUBLISHER_CONFIG")]
    config: Option<PathBuf>,
    /// Service URL.
    #[arg(long, global = true, env = "BFO_PUBLISHER_URL")]
    url: Option<String>,
    /// Credential sent with every connection.
    #[arg(long, global = true, env = "BFO_PUBLISHER_AUTHORIZATION", hide_env_values = true)]
    authorization: Option<String>,
    /// Log every frame at debug level.
    #[arg(long, global = true)]
    debug_wire: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect, complete the handshake and print the status reply.
    Status,
    /// Send one request and print its replies as they arrive.
    Send {
        /// Request type, e.g. "convert".
        kind: String,
        /// Extra request fields as a JSON object.
        #[arg(long)]
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let publisher = Publisher::from_config(config).context("invalid publisher config")?;
    tracing::info!(endpoint = %publisher.endpoint(), "connecting");

    let result = match cli.command {
        Command::Status => status(&publisher).await,
        Command::Send { kind, params } => send(&publisher, &kind, params.as_deref()).await,
    };
    publisher.disconnect();
    result
}

async fn status(publisher: &Publisher) -> anyhow::Result<()> {
    publisher.connect();
    publisher
        .wait_connected()
        .await
        .context("session closed before the handshake completed")?;
    let status = publisher.status().unwrap_or(Value::Null);
    print_json(&status)
}

async fn send(publisher: &Publisher, kind: &str, params: Option<&str>) -> anyhow::Result<()> {
    let params = match params {
        Some(json) => Value::from_json_str(json).context("--params is not valid JSON")?,
        None => Value::Null,
    };
    let message = envelope(kind, params)?;
    let mut request = publisher.request(message).await?;
    tracing::info!(message_id = request.id(), kind = %request.kind(), "request sent");

    while let Some(event) = request.next_event().await {
        match event {
            RequestEvent::Log(line) => match line.as_str() {
                Some(text) => tracing::info!(message_id = request.id(), "{text}"),
                None => tracing::info!(message_id = request.id(), log = %line.to_json(), "log"),
            },
            RequestEvent::Update(update) => {
                tracing::info!(message_id = request.id(), "update");
                print_json(&update)?;
            }
            RequestEvent::Complete(response) => return print_json(&response),
            RequestEvent::Failed(response) => {
                print_json(&response)?;
                let message = response
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Failed");
                anyhow::bail!("request rejected: {message}");
            }
        }
    }
    anyhow::bail!("connection closed before the request completed")
}

/// File config first, then env vars and flags on top.
fn resolve_config(cli: &Cli) -> anyhow::Result<PublisherConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PublisherConfig::default(),
    };
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(token) = &cli.authorization {
        config.authorization = Some(token.clone());
    }
    config.debug_wire |= cli.debug_wire;
    if config.url.is_empty() {
        anyhow::bail!("no service URL: pass --url, set BFO_PUBLISHER_URL or use --config");
    }
    Ok(config)
}

fn load_config(path: &Path) -> anyhow::Result<PublisherConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value.to_json())?);
    Ok(())
}
