use std::time::{Duration, Instant};

use skein_protocol::{Server, ServerConfig};
use skein_transport::{QuicListener, TransportConfig};

use crate::common::{elapsed_s, on_ctrlc};
use crate::events::{emit, EventClient, EventStarted, EventSummary};

pub struct ServeConfig {
    pub transport: TransportConfig,
    pub accept_timeout: Option<Duration>,
}

pub async fn run(config: ServeConfig, start: Instant) -> anyhow::Result<()> {
    let listener = QuicListener::bind(&config.transport)?;

    let mut server_config = ServerConfig::default();
    if let Some(timeout) = config.accept_timeout {
        server_config = server_config.accept_timeout(timeout);
    }

    let server = Server::new(server_config)
        .on_start(|addr| {
            emit(&EventStarted::new("serve", addr));
            eprintln!("Relay listening on {addr}");
            eprintln!("Press Ctrl+C to stop.\n");
        })
        .on_connect(move |id| emit(&EventClient::connected(id, elapsed_s(start))))
        .on_disconnect(move |id| emit(&EventClient::disconnected(id, elapsed_s(start))));

    let handle = server.handle();
    on_ctrlc(move || handle.stop());

    let result = server.listen(listener).await;

    let snapshot = server.metrics().snapshot();
    eprintln!(
        "\nrelay: {} connects, {} pushes delivered, {} failed.",
        snapshot.connects, snapshot.pushes_delivered, snapshot.push_failures
    );
    emit(&EventSummary::new(snapshot, elapsed_s(start)));

    result?;
    Ok(())
}
