//! Management surface for the embedding caller
//!
//! Every operation returns a [`ManagementResult`]: a success flag, a message
//! and an optional payload. Failures carry the error's message; nothing here
//! panics across the boundary.

use crate::engine::{CallbackHandle, EngineHandle};
use crate::errors::{HubError, HubResult};
use crate::foundation::{ClientId, ServerId};
use crate::server::{ServerRegistry, TlsMaterial};
use crate::websocket::{ClientInfo, WebSocketMessage};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Uniform result of one management call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagementResult<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T> ManagementResult<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            message: String::new(),
            payload: Some(payload),
        }
    }

    pub fn failed(error: &HubError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            payload: None,
        }
    }

    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.payload)
        } else {
            Err(self.message)
        }
    }
}

impl<T> From<HubResult<T>> for ManagementResult<T> {
    fn from(result: HubResult<T>) -> Self {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(e) => {
                warn!(code = e.error_code(), "{}", e);
                Self::failed(&e)
            }
        }
    }
}

/// Management operations over one registry
#[derive(Debug, Clone)]
pub struct Management {
    registry: Arc<ServerRegistry>,
}

impl Management {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self { registry }
    }

    /// Management over the process-wide registry, once installed
    pub fn global() -> Option<Self> {
        ServerRegistry::global().map(Self::new)
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Start a server. TLS is used only when both a certificate and a key are given.
    pub async fn start_server(&self, address: &str, cert_file: Option<&str>, key_file: Option<&str>) -> ManagementResult<ServerId> {
        let tls = match (cert_file, key_file) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some(TlsMaterial::new(cert, key)),
            _ => None,
        };
        self.registry.create_server(address, tls).await.into()
    }

    pub async fn serve(&self, id: ServerId, path: &str, callback: CallbackHandle) -> ManagementResult<()> {
        self.registry
            .register_handler(id, path, callback)
            .await
            .map(drop)
            .into()
    }

    pub async fn serve_websocket(&self, id: ServerId, path: &str, callback: CallbackHandle) -> ManagementResult<()> {
        self.registry
            .register_websocket(id, path, callback)
            .await
            .map(drop)
            .into()
    }

    pub async fn serve_files(&self, id: ServerId, path: &str, directory: impl Into<PathBuf>) -> ManagementResult<()> {
        self.registry
            .register_static(id, path, directory)
            .await
            .map(drop)
            .into()
    }

    /// Send a text message to one client; the client id is given as text
    pub async fn write_to_client(&self, id: ServerId, client_id: &str, message: &str) -> ManagementResult<()> {
        let Some(parsed) = ClientId::parse(client_id) else {
            let error = if self.registry.contains(id).await {
                HubError::client_not_found(client_id)
            } else {
                HubError::server_not_found(id)
            };
            return ManagementResult::from(Err(error));
        };
        self.registry
            .send_to_client(id, &parsed, WebSocketMessage::text(message))
            .await
            .into()
    }

    /// Send a text message to every client on `path`; the payload is how many were written to
    pub async fn broadcast(&self, id: ServerId, path: &str, message: &str) -> ManagementResult<usize> {
        self.registry
            .broadcast(id, path, WebSocketMessage::text(message))
            .await
            .into()
    }

    pub async fn list_clients(&self, id: ServerId) -> ManagementResult<Vec<ClientInfo>> {
        self.registry.list_clients(id).await.into()
    }

    /// Stop one server using its configured shutdown timeout
    pub async fn stop_server(&self, id: ServerId) -> ManagementResult<()> {
        let timeout = match self
            .registry
            .lookup(id, |instance| instance.config.shutdown_timeout())
            .await
        {
            Ok(timeout) => timeout,
            Err(e) => return ManagementResult::from(Err(e)),
        };
        self.stop_server_within(id, timeout).await
    }

    pub async fn stop_server_within(&self, id: ServerId, drain_timeout: Duration) -> ManagementResult<()> {
        self.registry.stop(id, drain_timeout).await.into()
    }

    /// Stop every server; the payload lists the ids that stopped cleanly
    pub async fn stop_all_servers(&self) -> ManagementResult<Vec<ServerId>> {
        let results = self.registry.stop_all().await;
        let mut stopped = Vec::new();
        let mut failures = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => stopped.push(id),
                Err(e) => failures.push(e.to_string()),
            }
        }

        ManagementResult {
            success: failures.is_empty(),
            message: failures.join("\n"),
            payload: Some(stopped),
        }
    }

    /// Make every route of `engine` inert; the payload is how many routes were cleared
    pub async fn invalidate_engine(&self, engine: EngineHandle) -> ManagementResult<usize> {
        ManagementResult::ok(self.registry.invalidate_engine(engine).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CallbackRef;
    use crate::testing::{wait_for_listener, RecordingEngine};

    fn management() -> Management {
        Management::new(ServerRegistry::new(Arc::new(RecordingEngine::new())))
    }

    fn handle(callback: i64) -> CallbackHandle {
        CallbackHandle::new(EngineHandle(1), CallbackRef(callback))
    }

    #[tokio::test]
    async fn test_failures_carry_messages() {
        let management = management();

        let result = management.serve(ServerId(3), "/x", handle(1)).await;
        assert!(!result.success);
        assert_eq!(result.message, "Server with ID 3 not found");

        let result = management.stop_server(ServerId(3)).await;
        assert!(!result.success);
        assert_eq!(result.message, "Server with ID 3 not found");

        let result = management.write_to_client(ServerId(3), "not-a-uuid", "hi").await;
        assert_eq!(result.message, "Server with ID 3 not found");
    }

    #[tokio::test]
    async fn test_server_round_trip() {
        let management = management();
        let started = management.start_server("127.0.0.1:0", None, None).await;
        assert!(started.success, "{}", started.message);
        let id = started.payload.unwrap();
        wait_for_listener(management.registry(), id).await;

        assert!(management.serve(id, "/a", handle(1)).await.success);
        let duplicate = management.serve_websocket(id, "/a", handle(2)).await;
        assert!(!duplicate.success);
        assert_eq!(duplicate.message, "Path /a exists already!");

        let unknown = management.write_to_client(id, "not-a-uuid", "hi").await;
        assert_eq!(unknown.message, "Client with ID not-a-uuid not found");

        let broadcast = management.broadcast(id, "/ws", "hi").await;
        assert_eq!(broadcast.message, "No path or no clients at '/ws'");

        assert_eq!(management.list_clients(id).await.payload, Some(Vec::new()));
        assert_eq!(management.invalidate_engine(EngineHandle(1)).await.payload, Some(1));

        let stopped = management.stop_all_servers().await;
        assert!(stopped.success);
        assert_eq!(stopped.payload, Some(vec![id]));
    }

    #[test]
    fn test_result_serialization() {
        let ok = serde_json::to_value(ManagementResult::ok(ServerId(4))).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "message": "", "payload": 4}));

        let failed: ManagementResult<ServerId> = ManagementResult::failed(&HubError::server_not_found(ServerId(4)));
        let failed = serde_json::to_value(failed).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({"success": false, "message": "Server with ID 4 not found"})
        );
    }
}
