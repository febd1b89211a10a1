use std::time::{Duration, Instant};

use skein_protocol::{Client, ClientConfig, ClientId, Requester};
use skein_transport::{QuicConnector, TransportConfig};

use crate::common::{elapsed_s, on_ctrlc};
use crate::events::{emit, EventClient, EventClients, EventMessage, EventStarted};

/// One request to issue after the handshake.
#[derive(Debug, Clone)]
pub enum Action {
    SendAll { text: String },
    SendTo { target: ClientId, text: String },
    List,
}

pub struct ClientRunConfig {
    pub transport: TransportConfig,
    /// Event to subscribe to; empty subscribes to everything.
    pub event: String,
    /// Event name for outgoing messages.
    pub send_event: String,
    pub actions: Vec<Action>,
    pub accept_timeout: Option<Duration>,
}

async fn perform(requester: &Requester, send_event: &str, action: Action) -> anyhow::Result<()> {
    match action {
        Action::SendAll { text } => requester.send_all(send_event, text).await?,
        Action::SendTo { target, text } => requester.send_to(send_event, target, text).await?,
        Action::List => {
            let ids = requester.list_clients().await?;
            emit(&EventClients::new(&ids));
        }
    }
    Ok(())
}

pub async fn run(config: ClientRunConfig, start: Instant) -> anyhow::Result<()> {
    let session = QuicConnector::connect(&config.transport).await?;
    emit(&EventStarted::new("client", config.transport.addr()));

    let mut client_config = ClientConfig::default();
    if let Some(timeout) = config.accept_timeout {
        client_config = client_config.accept_timeout(timeout);
    }

    let ClientRunConfig {
        event,
        send_event,
        actions,
        ..
    } = config;

    let client = Client::new(session, client_config)
        .on(event, |_, message| emit(&EventMessage::received(message)))
        .on_connect(move |requester| {
            let my_id = requester.id();
            emit(&EventClient::connected(my_id, elapsed_s(start)));
            eprintln!("Connected as client {my_id}");
            eprintln!("Press Ctrl+C to stop.\n");

            let requester = requester.clone();
            let send_event = send_event.clone();
            let actions = actions.clone();
            tokio::spawn(async move {
                for action in actions {
                    if let Err(e) = perform(&requester, &send_event, action).await {
                        eprintln!("request failed: {e}");
                    }
                }
            });
        })
        .on_disconnect(move |requester| {
            emit(&EventClient::disconnected(requester.id(), elapsed_s(start)));
        });

    let requester = client.requester();
    on_ctrlc(move || requester.disconnect());

    client.run().await?;
    Ok(())
}
