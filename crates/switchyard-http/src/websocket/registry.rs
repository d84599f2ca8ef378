//! Instance-wide registry of WebSocket clients

use super::client::{ClientInfo, WebSocketClient};
use super::types::WebSocketMessage;
use crate::errors::{BroadcastFailure, HubError, HubResult};
use crate::foundation::ClientId;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Clients of one server instance, across all of its paths.
///
/// Plain data guarded by the registry-wide lock; callers hold exclusive
/// access for every mutation.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: HashMap<ClientId, WebSocketClient>,
}

/// Result of writing one message to a set of clients
#[derive(Debug, Default)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub failures: Vec<BroadcastFailure>,
}

impl BroadcastOutcome {
    pub fn total_attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, client: WebSocketClient) {
        debug!(client_id = %client.id, path = %client.path, "Client registered");
        self.clients.insert(client.id, client);
    }

    pub fn remove(&mut self, id: &ClientId) -> Option<WebSocketClient> {
        self.clients.remove(id)
    }

    pub fn get(&self, id: &ClientId) -> Option<&WebSocketClient> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Write to one client; a failure is reported and the client stays registered
    pub fn send_to(&self, id: &ClientId, message: WebSocketMessage) -> HubResult<()> {
        let client = self.get(id).ok_or_else(|| HubError::client_not_found(id))?;
        client.send(message)
    }

    /// Write to every listed client, collecting per-client failures
    pub fn send_many<'a, I>(&self, ids: I, message: &WebSocketMessage) -> BroadcastOutcome
    where
        I: IntoIterator<Item = &'a ClientId>,
    {
        let mut outcome = BroadcastOutcome::default();
        for id in ids {
            let result = match self.get(id) {
                Some(client) => client.send(message.clone()),
                None => Err(HubError::client_not_found(id)),
            };
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(e) => outcome.failures.push(BroadcastFailure {
                    client_id: *id,
                    reason: e.to_string(),
                }),
            }
        }
        outcome
    }

    /// Queue a close frame to every client and return their handles so the
    /// caller can wait for the connections to be released.
    ///
    /// A client whose close frame cannot be queued is terminated on the spot.
    pub fn close_all(&self, code: u16, reason: &str) -> Vec<WebSocketClient> {
        self.clients
            .values()
            .map(|client| {
                if let Err(e) = client.send(WebSocketMessage::close_with_reason(code, reason)) {
                    warn!(client_id = %client.id, "Failed to write close message to client: {}", e);
                    client.terminate();
                }
                client.clone()
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<ClientInfo> {
        self.clients.values().map(WebSocketClient::info).collect()
    }
}
