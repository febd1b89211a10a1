mod client;
mod common;
mod events;
mod serve;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use common::transport_config;
use skein_protocol::ClientId;

#[derive(Parser)]
#[command(name = "skein-relay", about = "Skein pub/sub relay over QUIC")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Settings both ends must agree on.
#[derive(Args)]
struct Shared {
    /// Relay address (bind address for `serve`).
    #[arg(long, env = "SKEIN_ADDR", default_value = "127.0.0.1:9000")]
    addr: SocketAddr,
    /// Shared password.
    #[arg(long, env = "SKEIN_PASSWORD", hide_env_values = true)]
    password: String,
    /// Key derivation salt.
    #[arg(long, env = "SKEIN_SALT", hide_env_values = true)]
    salt: String,
    /// Drop the session after this many idle seconds.
    #[arg(long)]
    accept_timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay until Ctrl+C.
    Serve {
        #[command(flatten)]
        shared: Shared,
    },

    /// Connect, print every received message, optionally send one.
    Client {
        #[command(flatten)]
        shared: Shared,
        /// Only print messages with this event name (default: all).
        #[arg(long, default_value = "")]
        event: String,
        /// Event name for messages sent with --send-all / --send-to.
        #[arg(long, default_value = "chat")]
        send_event: String,
        /// Send TEXT to every connected client.
        #[arg(long, value_name = "TEXT")]
        send_all: Option<String>,
        /// Send --text to this client id.
        #[arg(long, value_name = "ID", requires = "text")]
        send_to: Option<u32>,
        /// Text for --send-to.
        #[arg(long)]
        text: Option<String>,
        /// Print the connected client ids.
        #[arg(long)]
        list: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    eprintln!("skein-relay v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve { shared } => {
            serve::run(
                serve::ServeConfig {
                    transport: transport_config(shared.addr, &shared.password, &shared.salt),
                    accept_timeout: shared.accept_timeout_secs.map(Duration::from_secs),
                },
                start,
            )
            .await?;
        }

        Command::Client {
            shared,
            event,
            send_event,
            send_all,
            send_to,
            text,
            list,
        } => {
            let mut actions = Vec::new();
            if let Some(text) = send_all {
                actions.push(client::Action::SendAll { text });
            }
            if let (Some(target), Some(text)) = (send_to, text) {
                actions.push(client::Action::SendTo {
                    target: ClientId::new(target),
                    text,
                });
            }
            if list {
                actions.push(client::Action::List);
            }

            client::run(
                client::ClientRunConfig {
                    transport: transport_config(shared.addr, &shared.password, &shared.salt),
                    event,
                    send_event,
                    actions,
                    accept_timeout: shared.accept_timeout_secs.map(Duration::from_secs),
                },
                start,
            )
            .await?;
        }
    }

    Ok(())
}
