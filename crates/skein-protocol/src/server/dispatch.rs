//! Per-connection request loop.
//!
//! Each inbound stream carries exactly one request. Streams on a
//! connection are handled strictly one after another.
use std::sync::Arc;

use skein_metrics::RequestKind;
use skein_transport::Stream;
use tokio::io::BufWriter;

use super::registry::Connection;
use super::{push, ServerContext};
use crate::error::ProtocolError;
use crate::types::Message;
use crate::wire::{self, Request};

/// Serve `conn` until its session closes, the idle deadline passes or the
/// server stops. The connection is removed from the registry on exit.
pub(crate) async fn serve_connection(conn: Arc<Connection>, ctx: Arc<ServerContext>) {
    let id = conn.id();
    tracing::debug!("serving client {id}");

    loop {
        if conn.session().is_closed() {
            tracing::debug!("client {id}: session closed");
            break;
        }

        let stream = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            next = crate::accept_next(conn.session().as_ref(), ctx.config.accept_timeout) => {
                match next {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::debug!("client {id}: {e}");
                        break;
                    }
                }
            }
        };

        if let Err(e) = dispatch(&conn, stream, &ctx).await {
            if matches!(e, ProtocolError::Wire(_)) {
                ctx.metrics.decode_errors.inc();
            }
            tracing::warn!("client {id}: request failed: {e}");
        }
    }

    ctx.disconnect(id).await;
}

fn request_kind(request: &Request) -> RequestKind {
    match request {
        Request::GetId => RequestKind::GetId,
        Request::SendTo { .. } => RequestKind::SendTo,
        Request::SendAll { .. } => RequestKind::SendAll,
        Request::GetClients => RequestKind::GetClients,
    }
}

/// Decode one request from `stream` and act on it.
pub(crate) async fn dispatch(
    conn: &Arc<Connection>,
    stream: Stream,
    ctx: &Arc<ServerContext>,
) -> Result<(), ProtocolError> {
    let Stream { send, mut recv } = stream;
    let request = Request::read_from(&mut recv, &ctx.config.limits).await?;
    ctx.metrics.record_request(request_kind(&request));

    match request {
        Request::GetId => {
            let mut send = BufWriter::new(send);
            wire::write_u32(&mut send, conn.id().get()).await?;
            wire::finish(&mut send).await?;
            if conn.mark_greeted() {
                ctx.connected(conn.id());
            }
        }

        Request::SendTo {
            event,
            target,
            payload,
        } => match ctx.registry.lookup(target).await {
            Some(target) => {
                let message = Message {
                    event,
                    sender: conn.id(),
                    payload,
                };
                // Failures are counted and logged by `deliver`.
                let _ = push::deliver(&target, &message, &ctx.metrics, &ctx.hooks).await;
            }
            None => {
                ctx.metrics.unknown_targets.inc();
                tracing::debug!(
                    "client {}: '{event}' for unknown client {target} dropped",
                    conn.id()
                );
            }
        },

        Request::SendAll { event, payload } => {
            let message = Arc::new(Message {
                event,
                sender: conn.id(),
                payload,
            });
            let targets = ctx.registry.connections().await;
            push::fan_out(targets, message, ctx.metrics.clone(), ctx.hooks.clone()).await;
        }

        Request::GetClients => {
            let ids = ctx.registry.snapshot().await;
            let mut send = BufWriter::new(send);
            wire::write_u32(&mut send, ids.len() as u32).await?;
            for id in ids {
                wire::write_u32(&mut send, id.get()).await?;
            }
            wire::finish(&mut send).await?;
        }
    }

    Ok(())
}
