//! Handle on one live WebSocket connection

use super::types::WebSocketMessage;
use crate::errors::{HubError, HubResult};
use crate::foundation::{ClientId, OUTBOUND_QUEUE_CAPACITY};
use axum::extract::ws::Message;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

/// Registry-side handle of one upgraded connection.
///
/// The socket itself is owned by the connection task; the handle queues
/// frames for that task to write and can order it to drop the socket. The
/// queue is bounded: a peer that stops reading fills it and further sends
/// fail instead of piling up. Once the task exits every send fails.
#[derive(Debug, Clone)]
pub struct WebSocketClient {
    pub id: ClientId,
    /// Registered path the client is attached to
    pub path: String,
    sender: mpsc::Sender<Message>,
    terminate: Arc<Notify>,
}

/// Connection-task side of a [`WebSocketClient`]
#[derive(Debug)]
pub struct Outbound {
    pub frames: mpsc::Receiver<Message>,
    pub terminate: Arc<Notify>,
}

impl WebSocketClient {
    /// Create a client together with the queue its connection task drains
    pub fn channel(id: ClientId, path: String) -> (Self, Outbound) {
        Self::with_capacity(id, path, OUTBOUND_QUEUE_CAPACITY)
    }

    pub fn with_capacity(id: ClientId, path: String, capacity: usize) -> (Self, Outbound) {
        let (sender, frames) = mpsc::channel(capacity);
        let terminate = Arc::new(Notify::new());
        let client = Self {
            id,
            path,
            sender,
            terminate: Arc::clone(&terminate),
        };
        (client, Outbound { frames, terminate })
    }

    /// Queue a frame for the connection task without waiting
    pub fn send(&self, message: WebSocketMessage) -> HubResult<()> {
        self.sender.try_send(message.into()).map_err(|e| {
            let reason = match e {
                TrySendError::Full(_) => "send queue full, peer is not reading",
                TrySendError::Closed(_) => "connection closed",
            };
            HubError::WriteError {
                client_id: self.id,
                reason: reason.to_string(),
            }
        })
    }

    /// Order the connection task to drop the socket, even mid-write
    pub fn terminate(&self) {
        self.terminate.notify_one();
    }

    /// True once the connection task has released the socket
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Resolves once the connection task has released the socket
    pub async fn closed(&self) {
        self.sender.closed().await
    }

    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            client_id: self.id,
            path: self.path.clone(),
        }
    }
}

/// Point-in-time description of one attached client
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_queues_frame() {
        let (client, mut outbound) = WebSocketClient::channel(ClientId::new(), "/ws".into());

        client.send(WebSocketMessage::text("hello")).unwrap();
        assert_eq!(outbound.frames.recv().await, Some(Message::Text("hello".into())));
    }

    #[tokio::test]
    async fn test_send_after_release_is_write_error() {
        let (client, outbound) = WebSocketClient::channel(ClientId::new(), "/ws".into());
        drop(outbound);

        assert!(client.is_closed());
        let err = client.send(WebSocketMessage::text("late")).unwrap_err();
        assert!(matches!(err, HubError::WriteError { client_id, .. } if client_id == client.id));
        client.closed().await;
    }

    #[test]
    fn test_full_queue_is_write_error() {
        let (client, _outbound) = WebSocketClient::with_capacity(ClientId::new(), "/ws".into(), 2);

        client.send(WebSocketMessage::text("one")).unwrap();
        client.send(WebSocketMessage::text("two")).unwrap();
        let err = client.send(WebSocketMessage::text("three")).unwrap_err();
        match err {
            HubError::WriteError { reason, .. } => assert!(reason.contains("queue full")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_terminate_wakes_connection_task() {
        let (client, outbound) = WebSocketClient::channel(ClientId::new(), "/ws".into());

        // a signal sent before the task waits is not lost
        client.terminate();
        tokio::time::timeout(Duration::from_secs(1), outbound.terminate.notified())
            .await
            .expect("terminate signal lost");
    }
}
