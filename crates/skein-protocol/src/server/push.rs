use std::sync::Arc;

use skein_metrics::RelayMetrics;
use tokio::task::JoinSet;

use super::registry::Connection;
use super::ServerHooks;
use crate::error::ProtocolError;
use crate::types::Message;

/// Push and account for the outcome. Failures are logged, never retried.
pub(crate) async fn deliver(
    target: &Connection,
    message: &Message,
    metrics: &RelayMetrics,
    hooks: &ServerHooks,
) -> Result<(), ProtocolError> {
    match target.send(message).await {
        Ok(()) => {
            metrics.pushes_delivered.inc();
            tracing::debug!(
                "pushed '{}' from {} to {}",
                message.event,
                message.sender,
                target.id()
            );
            if let Some(hook) = &hooks.on_message {
                hook(target.id(), message);
            }
            Ok(())
        }
        Err(e) => {
            metrics.push_failures.inc();
            tracing::warn!("push to client {} failed: {e}", target.id());
            Err(e)
        }
    }
}

/// Push `message` to every connection in `targets`, each on its own task.
/// Returns how many pushes succeeded.
pub(crate) async fn fan_out(
    targets: Vec<Arc<Connection>>,
    message: Arc<Message>,
    metrics: Arc<RelayMetrics>,
    hooks: Arc<ServerHooks>,
) -> usize {
    let mut pushes = JoinSet::new();
    for target in targets {
        let message = message.clone();
        let metrics = metrics.clone();
        let hooks = hooks.clone();
        pushes.spawn(async move { deliver(&target, &message, &metrics, &hooks).await.is_ok() });
    }

    let mut delivered = 0;
    while let Some(joined) = pushes.join_next().await {
        match joined {
            Ok(true) => delivered += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!("fan-out push task failed: {e}"),
        }
    }
    delivered
}
