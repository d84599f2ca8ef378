//! Per-connection read loop

use crate::engine::{IncomingMessage, MessageKind};
use crate::foundation::{ClientId, ServerId};
use crate::server::ServerRegistry;
use crate::websocket::Outbound;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drive one upgraded connection until it ends.
///
/// Data frames are delivered to the engine one at a time in arrival order.
/// Outbound frames queued through the client handle are written in between.
/// A terminate order from the handle ends the loop at once, including while
/// a write to a peer that stopped reading is pending. When the loop ends for
/// any reason the client is detached from the instance-wide and path-scoped
/// registries under one write lock, and only after that is the socket
/// released.
pub async fn run_connection(
    registry: Arc<ServerRegistry>,
    server_id: ServerId,
    client_id: ClientId,
    path: String,
    mut socket: WebSocket,
    outbound: Outbound,
) {
    debug!(%server_id, %client_id, %path, "Starting WebSocket read loop");

    let Outbound { mut frames, terminate } = outbound;
    let terminated = terminate.notified();
    tokio::pin!(terminated);

    loop {
        tokio::select! {
            biased;

            _ = &mut terminated => {
                warn!(%server_id, %client_id, "Connection terminated");
                break;
            }

            incoming = socket.recv() => {
                let (kind, payload) = match incoming {
                    Some(Ok(Message::Text(text))) => (MessageKind::Text, Bytes::from(text)),
                    Some(Ok(Message::Binary(data))) => (MessageKind::Binary, Bytes::from(data)),
                    Some(Ok(Message::Close(_))) => {
                        info!(%server_id, %client_id, "Received close frame");
                        break;
                    }
                    // ping/pong are answered by the protocol layer
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(%server_id, %client_id, "WebSocket read error: {}", e);
                        break;
                    }
                    None => {
                        debug!(%server_id, %client_id, "WebSocket stream ended");
                        break;
                    }
                };

                let message = IncomingMessage { client_id, kind, payload };
                registry.deliver_message(server_id, &path, message).await;
            }

            queued = frames.recv() => {
                let Some(frame) = queued else {
                    break;
                };
                let closing = matches!(frame, Message::Close(_));
                let written = tokio::select! {
                    result = socket.send(frame) => Some(result),
                    _ = &mut terminated => None,
                };
                match written {
                    Some(Ok(())) if closing => {
                        debug!(%server_id, %client_id, "Close frame written");
                        break;
                    }
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        warn!(%server_id, %client_id, "Failed to write to client: {}", e);
                        break;
                    }
                    None => {
                        warn!(%server_id, %client_id, "Connection terminated during write");
                        break;
                    }
                }
            }
        }
    }

    registry.detach_client(server_id, &client_id).await;
    drop(frames);
    drop(socket);
    info!(%server_id, %client_id, "WebSocket connection released");
}
