//! Starting, draining and stopping server instances

use super::dispatch::{build_router, DispatchContext};
use super::instance::{LifecycleState, ServerInstance, TlsMaterial};
use super::registry::{resolve_address, ServerRegistry};
use crate::config::ServerConfig;
use crate::engine::EngineHandle;
use crate::errors::{HubError, HubResult};
use crate::foundation::{ServerId, CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_WRITE_GRACE_MS};
use crate::logging::structured;
use crate::websocket::WebSocketClient;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use futures_util::future::join_all;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::AppConfigTrait;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

impl ServerRegistry {
    /// Start a server with the registry's default configuration
    pub async fn create_server(self: &Arc<Self>, address: &str, tls: Option<TlsMaterial>) -> HubResult<ServerId> {
        let config = self.default_config().clone();
        self.create_server_with_config(address, tls, config).await
    }

    /// Start a server and return its id once the accept loop is spawned.
    ///
    /// The address is probed with a bind-and-release first. The real bind
    /// happens afterwards in the serve task; if it fails there the id has
    /// already been returned, so the failure is logged and the instance is
    /// removed as crash-exited.
    pub async fn create_server_with_config(
        self: &Arc<Self>,
        address: &str,
        tls: Option<TlsMaterial>,
        config: ServerConfig,
    ) -> HubResult<ServerId> {
        config.validate()?;
        let socket_addr = resolve_address(address)?;
        if let Err(e) = probe(socket_addr) {
            warn!(%address, "Failed to create server at {}, reason {}", address, e);
            return Err(HubError::address_unavailable(address, e));
        }

        let mut state = self.write().await;
        let id = state.allocate_id();
        let instance = ServerInstance::new(id, socket_addr, tls.clone(), config.clone());
        let handle = instance.handle.clone();
        state.insert(instance);

        // the lock is held until the task is stored, so an immediate exit
        // of the serve task cannot observe the instance without it
        let task = tokio::spawn(Arc::clone(self).serve(id, socket_addr, tls, config, handle));
        if let Ok(instance) = state.instance_mut(id) {
            instance.task = Some(task);
        }
        drop(state);

        structured::log_server_event(id, "started", &socket_addr.to_string());
        Ok(id)
    }

    async fn serve(
        self: Arc<Self>,
        id: ServerId,
        address: SocketAddr,
        tls: Option<TlsMaterial>,
        config: ServerConfig,
        handle: Handle,
    ) {
        let app = build_router(DispatchContext::new(Arc::clone(&self), id, config));
        let service = app.into_make_service_with_connect_info::<SocketAddr>();

        let result = match tls {
            None => axum_server::bind(address).handle(handle).serve(service).await,
            Some(material) => match RustlsConfig::from_pem_file(&material.cert_path, &material.key_path).await {
                Ok(rustls) => {
                    axum_server::bind_rustls(address, rustls)
                        .handle(handle)
                        .serve(service)
                        .await
                }
                Err(e) => Err(e),
            },
        };

        self.on_listener_exit(id, result).await;
    }

    /// Called when a serve task ends.
    ///
    /// A listener that ends while its instance is still running has died on
    /// its own: the instance is marked crash-exited, its clients are told to
    /// go away and it is dropped from the registry.
    async fn on_listener_exit(&self, id: ServerId, result: io::Result<()>) {
        let mut state = self.write().await;
        let Ok(instance) = state.instance_mut(id) else {
            return;
        };
        if instance.lifecycle != LifecycleState::Running {
            debug!(server_id = %id, lifecycle = %instance.lifecycle, "Listener finished");
            return;
        }

        match result {
            Err(e) => error!(server_id = %id, address = %instance.address, "ListenAndServe: {}", e),
            Ok(()) => error!(server_id = %id, address = %instance.address, "Listener exited unexpectedly"),
        }
        instance.lifecycle = LifecycleState::CrashExited;
        let closing = instance.clients.close_all(CLOSE_GOING_AWAY, "server listener exited");
        let deadline = Instant::now() + instance.config.shutdown_timeout();
        let address = instance.address.to_string();
        state.remove(id);
        drop(state);
        structured::log_server_event(id, "crash_exit", &address);
        release_clients(id, &closing, deadline).await;
    }

    /// Drain and stop one server.
    ///
    /// Every WebSocket client is sent a close frame and its connection is
    /// closed first; a client that has not taken its close frame within a
    /// short grace is torn down. The listener is then shut down gracefully.
    /// Both steps share `drain_timeout`. When the
    /// deadline passes before the listener is down the instance stays
    /// registered in `Draining` and `ShutdownTimeout` is returned; calling
    /// `stop` again waits for it once more.
    pub async fn stop(&self, id: ServerId, drain_timeout: Duration) -> HubResult<()> {
        let deadline = Instant::now() + drain_timeout;

        let (closing, handle, mut task, address) = {
            let mut state = self.write().await;
            let instance = state.instance_mut(id)?;
            let task = instance.task.take().ok_or(HubError::AlreadyStopping { id })?;
            instance.lifecycle = LifecycleState::Draining;
            let closing = instance.clients.close_all(CLOSE_NORMAL, "");
            (closing, instance.handle.clone(), task, instance.address)
        };
        info!(server_id = %id, clients = closing.len(), "Draining server");

        release_clients(id, &closing, deadline).await;

        // stop accepting; in-flight requests are waited on until the deadline
        handle.graceful_shutdown(None);
        match timeout_at(deadline, &mut task).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    warn!(server_id = %id, "Serve task ended abnormally: {}", e);
                }
                let mut state = self.write().await;
                if let Some(mut instance) = state.remove(id) {
                    instance.lifecycle = LifecycleState::Stopped;
                    debug!(server_id = %id, lifecycle = %instance.lifecycle, "Instance removed");
                }
                drop(state);
                info!(server_id = %id, "Server with ID {} shut down successfully", id);
                structured::log_server_event(id, "stopped", &address.to_string());
                Ok(())
            }
            Err(_) => {
                let mut state = self.write().await;
                if let Ok(instance) = state.instance_mut(id) {
                    instance.task = Some(task);
                }
                drop(state);
                structured::log_server_event(id, "shutdown_timeout", &address.to_string());
                Err(HubError::ShutdownTimeout {
                    id,
                    timeout: drain_timeout,
                })
            }
        }
    }

    /// Stop every registered server with its own shutdown timeout.
    ///
    /// A failure on one server does not halt the sweep.
    pub async fn stop_all(&self) -> Vec<(ServerId, HubResult<()>)> {
        let targets: Vec<(ServerId, Duration)> = {
            let state = self.read().await;
            let mut targets: Vec<_> = state
                .instances()
                .map(|instance| (instance.id, instance.config.shutdown_timeout()))
                .collect();
            targets.sort_by_key(|(id, _)| *id);
            targets
        };

        let mut results = Vec::with_capacity(targets.len());
        for (id, drain_timeout) in targets {
            let result = self.stop(id, drain_timeout).await;
            if let Err(e) = &result {
                warn!(server_id = %id, "Stop failed: {}", e);
            }
            results.push((id, result));
        }
        results
    }

    /// Make every route owned by `engine` inert, on every server.
    ///
    /// Path entries stay registered. Returns how many routes were cleared.
    pub async fn invalidate_engine(&self, engine: EngineHandle) -> usize {
        let mut state = self.write().await;
        let cleared: usize = state
            .instances_mut()
            .map(|instance| instance.router.invalidate(engine))
            .sum();
        info!(engine = engine.0, cleared, "Engine handle invalidated");
        cleared
    }
}

/// Wait for every closing client to release its socket.
///
/// Clients still open after the close grace are terminated; the wait for
/// those is bounded by `deadline` only.
async fn release_clients(id: ServerId, closing: &[WebSocketClient], deadline: Instant) {
    if closing.is_empty() {
        return;
    }
    let grace = deadline.min(Instant::now() + Duration::from_millis(CLOSE_WRITE_GRACE_MS));
    let released = join_all(closing.iter().map(WebSocketClient::closed));
    if timeout_at(grace, released).await.is_ok() {
        return;
    }

    let stuck: Vec<&WebSocketClient> = closing.iter().filter(|client| !client.is_closed()).collect();
    warn!(server_id = %id, clients = stuck.len(), "Terminating clients that did not take their close frame");
    for client in &stuck {
        client.terminate();
    }
    let forced = join_all(stuck.iter().map(|client| client.closed()));
    if timeout_at(deadline, forced).await.is_err() {
        warn!(server_id = %id, "WebSocket clients still open at the drain deadline");
    }
}

/// Bind and immediately release `address` to detect conflicts early
fn probe(address: SocketAddr) -> io::Result<()> {
    let listener = TcpListener::bind(address)?;
    drop(listener);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_for_listener, RecordingEngine};

    fn registry() -> Arc<ServerRegistry> {
        ServerRegistry::new(Arc::new(RecordingEngine::new()))
    }

    #[tokio::test]
    async fn test_create_and_stop() {
        let registry = registry();
        let id = registry.create_server("127.0.0.1:0", None).await.unwrap();
        let addr = wait_for_listener(&registry, id).await;
        assert_ne!(addr.port(), 0);
        assert_eq!(registry.lifecycle(id).await.unwrap(), LifecycleState::Running);

        registry.stop(id, Duration::from_secs(2)).await.unwrap();
        assert!(!registry.contains(id).await);
        assert!(matches!(
            registry.stop(id, Duration::from_secs(1)).await,
            Err(HubError::ServerNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_port_conflict_is_reported() {
        let registry = registry();
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = taken.local_addr().unwrap().to_string();

        let err = registry.create_server(&address, None).await.unwrap_err();
        assert!(matches!(err, HubError::AddressUnavailable { .. }));
        assert!(err.to_string().starts_with(&format!("Failed to create server at {}", address)));
        assert!(registry.server_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_ids_increase_across_stops() {
        let registry = registry();
        let first = registry.create_server("127.0.0.1:0", None).await.unwrap();
        wait_for_listener(&registry, first).await;
        registry.stop(first, Duration::from_secs(2)).await.unwrap();

        let second = registry.create_server("127.0.0.1:0", None).await.unwrap();
        assert!(second > first);
        wait_for_listener(&registry, second).await;
        registry.stop(second, Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_all_clears_registry() {
        let registry = registry();
        for _ in 0..3 {
            let id = registry.create_server("127.0.0.1:0", None).await.unwrap();
            wait_for_listener(&registry, id).await;
        }

        let results = registry.stop_all().await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|(_, result)| result.is_ok()));
        assert!(registry.server_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let registry = registry();
        let config = ServerConfig {
            max_body_size: 0,
            ..ServerConfig::default()
        };
        let err = registry
            .create_server_with_config("127.0.0.1:0", None, config)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
