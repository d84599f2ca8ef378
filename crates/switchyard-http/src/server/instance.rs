use crate::config::ServerConfig;
use crate::errors::{HubError, HubResult};
use crate::foundation::{ClientId, ServerId};
use crate::routing::PathRouter;
use crate::websocket::{ClientInfo, ConnectionRegistry, WebSocketClient, WebSocketMessage};
use axum_server::Handle;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::debug;

/// Certificate and key files of a TLS listener, in PEM format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsMaterial {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

/// Lifecycle of one server instance.
///
/// `Running -> Draining -> Stopped`, or `Running -> CrashExited` when the
/// listener dies on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
    CrashExited,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
            LifecycleState::CrashExited => "crash_exited",
        };
        f.write_str(name)
    }
}

/// One listener with its routes and WebSocket clients
#[derive(Debug)]
pub struct ServerInstance {
    pub id: ServerId,
    pub address: SocketAddr,
    pub tls: Option<TlsMaterial>,
    pub config: ServerConfig,
    pub router: PathRouter,
    pub clients: ConnectionRegistry,
    pub(crate) lifecycle: LifecycleState,
    pub(crate) handle: Handle,
    /// Serve task; taken by the stop that is in flight
    pub(crate) task: Option<JoinHandle<()>>,
}

impl ServerInstance {
    pub fn new(id: ServerId, address: SocketAddr, tls: Option<TlsMaterial>, config: ServerConfig) -> Self {
        Self {
            id,
            address,
            tls,
            config,
            router: PathRouter::new(),
            clients: ConnectionRegistry::new(),
            lifecycle: LifecycleState::Running,
            handle: Handle::new(),
            task: None,
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == LifecycleState::Running
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Register an upgraded client on the instance and on its path
    pub fn attach_client(&mut self, client: WebSocketClient) -> HubResult<()> {
        if !self.is_running() {
            return Err(HubError::UpgradeFailed {
                reason: format!("server {} is {}", self.id, self.lifecycle),
            });
        }
        if !self.router.attach_client(&client.path, client.id) {
            return Err(HubError::UpgradeFailed {
                reason: format!("{} is not a WebSocket path", client.path),
            });
        }
        self.clients.insert(client);
        Ok(())
    }

    /// Remove a client from the instance-wide and path-scoped registries together
    pub fn detach_client(&mut self, client_id: &ClientId) -> Option<WebSocketClient> {
        let client = self.clients.remove(client_id)?;
        self.router.detach_client(&client.path, client_id);
        debug!(server_id = %self.id, %client_id, path = %client.path, "Client detached");
        Some(client)
    }

    pub fn send_to_client(&self, client_id: &ClientId, message: WebSocketMessage) -> HubResult<()> {
        self.clients.send_to(client_id, message)
    }

    /// Write to every client on `path`; returns how many were written to
    pub fn broadcast(&self, path: &str, message: WebSocketMessage) -> HubResult<usize> {
        let ids = match self.router.clients_at(path) {
            Some(ids) if !ids.is_empty() => ids,
            _ => {
                return Err(HubError::NoPathOrNoClients {
                    path: path.to_string(),
                })
            }
        };

        let outcome = self.clients.send_many(ids.iter(), &message);
        if outcome.has_failures() {
            return Err(HubError::PartialBroadcastFailure {
                path: path.to_string(),
                delivered: outcome.delivered,
                failures: outcome.failures,
            });
        }
        Ok(outcome.delivered)
    }

    /// Point-in-time list of attached clients, ordered by path then id
    pub fn list_clients(&self) -> Vec<ClientInfo> {
        let mut clients = self.clients.snapshot();
        clients.sort_by(|a, b| a.path.cmp(&b.path).then(a.client_id.cmp(&b.client_id)));
        clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CallbackHandle, CallbackRef, EngineHandle};
    use axum::extract::ws::Message;

    fn instance() -> ServerInstance {
        let mut instance = ServerInstance::new(
            ServerId(0),
            "127.0.0.1:0".parse().unwrap(),
            None,
            ServerConfig::default(),
        );
        instance
            .router
            .register_websocket("/ws", CallbackHandle::new(EngineHandle(1), CallbackRef(1)))
            .unwrap();
        instance
    }

    #[test]
    fn test_attach_and_detach_touch_both_registries() {
        let mut instance = instance();
        let (client, _rx) = WebSocketClient::channel(ClientId::new(), "/ws".into());
        let id = client.id;

        instance.attach_client(client).unwrap();
        assert_eq!(instance.clients.len(), 1);
        assert!(instance.router.clients_at("/ws").unwrap().contains(&id));

        assert!(instance.detach_client(&id).is_some());
        assert!(instance.clients.is_empty());
        assert!(instance.router.clients_at("/ws").unwrap().is_empty());
        assert!(instance.detach_client(&id).is_none());
    }

    #[test]
    fn test_attach_refused_while_draining() {
        let mut instance = instance();
        instance.lifecycle = LifecycleState::Draining;
        let (client, _rx) = WebSocketClient::channel(ClientId::new(), "/ws".into());

        assert!(matches!(
            instance.attach_client(client),
            Err(HubError::UpgradeFailed { .. })
        ));
        assert!(instance.clients.is_empty());
    }

    #[test]
    fn test_broadcast_to_empty_path_is_failure() {
        let instance = instance();
        assert!(matches!(
            instance.broadcast("/ws", WebSocketMessage::text("x")),
            Err(HubError::NoPathOrNoClients { .. })
        ));
        assert!(matches!(
            instance.broadcast("/nowhere", WebSocketMessage::text("x")),
            Err(HubError::NoPathOrNoClients { .. })
        ));
    }

    #[tokio::test]
    async fn test_broadcast_partial_failure() {
        let mut instance = instance();
        let mut receivers = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let (client, rx) = WebSocketClient::channel(ClientId::new(), "/ws".into());
            ids.push(client.id);
            instance.attach_client(client).unwrap();
            receivers.push(rx);
        }
        let broken = receivers.remove(1);
        drop(broken);

        match instance.broadcast("/ws", WebSocketMessage::text("hello")) {
            Err(HubError::PartialBroadcastFailure { delivered, failures, .. }) => {
                assert_eq!(delivered, 2);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].client_id, ids[1]);
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
        for rx in receivers.iter_mut() {
            assert_eq!(rx.frames.recv().await, Some(Message::Text("hello".into())));
        }
    }

    #[test]
    fn test_list_clients_is_sorted_snapshot() {
        let mut instance = instance();
        for _ in 0..3 {
            let (client, _rx) = WebSocketClient::channel(ClientId::new(), "/ws".into());
            instance.attach_client(client).unwrap();
        }
        let clients = instance.list_clients();
        assert_eq!(clients.len(), 3);
        assert!(clients.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
