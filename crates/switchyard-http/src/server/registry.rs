//! Process-wide table of server instances

use super::instance::{LifecycleState, ServerInstance};
use super::scope::CallbackScope;
use crate::config::ServerConfig;
use crate::engine::{CallbackHandle, CallbackResponse, IncomingMessage, RequestDescriptor, ScriptEngine};
use crate::errors::{HubError, HubResult};
use crate::foundation::{ClientId, ServerId};
use crate::routing::{PathRegistration, ResolvedRoute};
use crate::websocket::{ClientInfo, WebSocketClient, WebSocketMessage};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, warn};

static GLOBAL_REGISTRY: OnceCell<Arc<ServerRegistry>> = OnceCell::new();

/// Everything guarded by the registry lock
#[derive(Debug, Default)]
pub struct RegistryState {
    next_id: u64,
    servers: HashMap<ServerId, ServerInstance>,
}

impl RegistryState {
    /// Ids are handed out once and never reused
    pub(crate) fn allocate_id(&mut self) -> ServerId {
        let id = ServerId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn instance(&self, id: ServerId) -> HubResult<&ServerInstance> {
        self.servers.get(&id).ok_or_else(|| HubError::server_not_found(id))
    }

    pub fn instance_mut(&mut self, id: ServerId) -> HubResult<&mut ServerInstance> {
        self.servers.get_mut(&id).ok_or_else(|| HubError::server_not_found(id))
    }

    pub fn server_ids(&self) -> Vec<ServerId> {
        let mut ids: Vec<ServerId> = self.servers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub(crate) fn insert(&mut self, instance: ServerInstance) {
        self.servers.insert(instance.id, instance);
    }

    pub(crate) fn remove(&mut self, id: ServerId) -> Option<ServerInstance> {
        self.servers.remove(&id)
    }

    pub(crate) fn instances(&self) -> impl Iterator<Item = &ServerInstance> {
        self.servers.values()
    }

    pub(crate) fn instances_mut(&mut self) -> impl Iterator<Item = &mut ServerInstance> {
        self.servers.values_mut()
    }
}

/// Single owner of every server instance.
///
/// All registry data sits behind one read/write lock. Lookups share the read
/// half; registration, client attach/detach, removal and every engine
/// callback take the write half.
pub struct ServerRegistry {
    state: RwLock<RegistryState>,
    engine: Arc<dyn ScriptEngine>,
    default_config: ServerConfig,
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}

impl ServerRegistry {
    pub fn new(engine: Arc<dyn ScriptEngine>) -> Arc<Self> {
        Self::with_config(engine, ServerConfig::default())
    }

    /// Registry whose servers use `default_config` unless created with their own
    pub fn with_config(engine: Arc<dyn ScriptEngine>, default_config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(RegistryState::default()),
            engine,
            default_config,
        })
    }

    /// Install the process-wide registry; later calls return the first one
    pub fn install_global(engine: Arc<dyn ScriptEngine>) -> Arc<Self> {
        GLOBAL_REGISTRY.get_or_init(|| Self::new(engine)).clone()
    }

    pub fn global() -> Option<Arc<Self>> {
        GLOBAL_REGISTRY.get().cloned()
    }

    pub fn engine(&self) -> &Arc<dyn ScriptEngine> {
        &self.engine
    }

    pub fn default_config(&self) -> &ServerConfig {
        &self.default_config
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().await
    }

    /// Run `f` against one instance under the read lock
    pub async fn lookup<R>(&self, id: ServerId, f: impl FnOnce(&ServerInstance) -> R) -> HubResult<R> {
        let state = self.read().await;
        state.instance(id).map(f)
    }

    pub async fn contains(&self, id: ServerId) -> bool {
        self.read().await.servers.contains_key(&id)
    }

    pub async fn server_ids(&self) -> Vec<ServerId> {
        self.read().await.server_ids()
    }

    pub async fn lifecycle(&self, id: ServerId) -> HubResult<LifecycleState> {
        self.lookup(id, ServerInstance::lifecycle).await
    }

    /// Drop an instance from the table; the listener must already be down
    pub async fn remove(&self, id: ServerId) -> HubResult<ServerInstance> {
        self.write()
            .await
            .remove(id)
            .ok_or_else(|| HubError::server_not_found(id))
    }

    /// Address the listener actually bound, waiting until it is bound
    pub async fn local_addr(&self, id: ServerId) -> HubResult<SocketAddr> {
        let (handle, address) = self.lookup(id, |instance| (instance.handle.clone(), instance.address)).await?;
        handle
            .listening()
            .await
            .ok_or_else(|| HubError::address_unavailable(address.to_string(), "listener exited before binding"))
    }

    pub async fn register_handler(&self, id: ServerId, path: &str, callback: CallbackHandle) -> HubResult<String> {
        let mut state = self.write().await;
        state.instance_mut(id)?.router.register_handler(path, callback)
    }

    pub async fn register_websocket(&self, id: ServerId, path: &str, callback: CallbackHandle) -> HubResult<String> {
        let mut state = self.write().await;
        state.instance_mut(id)?.router.register_websocket(path, callback)
    }

    pub async fn register_static(&self, id: ServerId, path: &str, directory: impl Into<PathBuf>) -> HubResult<String> {
        let mut state = self.write().await;
        state.instance_mut(id)?.router.register_static(path, directory)
    }

    /// Queue a message for one client of `id`
    pub async fn send_to_client(&self, id: ServerId, client_id: &ClientId, message: WebSocketMessage) -> HubResult<()> {
        self.read().await.instance(id)?.send_to_client(client_id, message)
    }

    /// Queue a message for every client attached to `path`
    pub async fn broadcast(&self, id: ServerId, path: &str, message: WebSocketMessage) -> HubResult<usize> {
        self.read().await.instance(id)?.broadcast(path, message)
    }

    pub async fn list_clients(&self, id: ServerId) -> HubResult<Vec<ClientInfo>> {
        self.lookup(id, ServerInstance::list_clients).await
    }

    /// Route for `request_path`, copied out of the router
    pub(crate) async fn resolve_route(&self, id: ServerId, request_path: &str) -> Option<ResolvedRoute> {
        let state = self.read().await;
        let instance = state.instance(id).ok()?;
        instance.router.resolve(request_path)
    }

    pub(crate) async fn attach_client(&self, id: ServerId, client: WebSocketClient) -> HubResult<()> {
        let mut state = self.write().await;
        state.instance_mut(id)?.attach_client(client)
    }

    pub(crate) async fn detach_client(&self, id: ServerId, client_id: &ClientId) {
        let mut state = self.write().await;
        match state.instance_mut(id) {
            Ok(instance) => {
                instance.detach_client(client_id);
            }
            Err(_) => debug!(server_id = %id, %client_id, "Server gone before client detached"),
        }
    }

    /// Run a plain route callback inside the global critical section.
    ///
    /// `None` when the server or route is gone or its handle has gone inert.
    /// A failed or unusable callback result is `EngineCallFailed`.
    pub(crate) async fn invoke_request(
        &self,
        id: ServerId,
        path: &str,
        request: RequestDescriptor,
    ) -> Option<HubResult<CallbackResponse>> {
        let mut state = self.write().await;
        let handle = match state.instance(id).ok()?.router.get(path)? {
            PathRegistration::Handler { callback } => (*callback)?,
            _ => return None,
        };

        let mut scope = CallbackScope::new(&mut state, id);
        let result = self
            .engine
            .call_request(&mut scope, &handle, request)
            .await
            .and_then(CallbackResponse::validated)
            .map_err(|e| HubError::engine(e.to_string()));
        Some(result)
    }

    /// Hand one data frame to the WebSocket callback of `path`.
    ///
    /// Frames for an inert handle, or from a client that has already been
    /// detached, are dropped. Engine failures are logged only.
    pub(crate) async fn deliver_message(&self, id: ServerId, path: &str, message: IncomingMessage) {
        let mut state = self.write().await;
        let handle = {
            let Ok(instance) = state.instance(id) else {
                return;
            };
            match instance.router.get(path) {
                Some(PathRegistration::WebSocket { callback: Some(handle), clients }) if clients.contains(&message.client_id) => *handle,
                Some(PathRegistration::WebSocket { callback: None, .. }) => {
                    debug!(server_id = %id, %path, "Dropping frame for invalidated handler");
                    return;
                }
                _ => return,
            }
        };

        let client_id = message.client_id;
        let mut scope = CallbackScope::new(&mut state, id);
        if let Err(e) = self.engine.call_message(&mut scope, &handle, message).await {
            error!(server_id = %id, %client_id, %path, "WebSocket callback failed: {}", e);
        }
    }
}

/// Turn a management address into a socket address.
///
/// `:port` binds every interface; host names are resolved and the first
/// result is used.
pub fn resolve_address(address: &str) -> HubResult<SocketAddr> {
    let candidate = if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    };

    match candidate.to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .ok_or_else(|| HubError::address_unavailable(address, "address did not resolve")),
        Err(e) => {
            warn!(%address, "Could not resolve server address: {}", e);
            Err(HubError::address_unavailable(address, e))
        }
    }
}
