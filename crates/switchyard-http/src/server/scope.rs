use super::registry::RegistryState;
use crate::errors::HubResult;
use crate::foundation::{ClientId, ServerId};
use crate::websocket::{ClientInfo, WebSocketMessage};

/// Registry access handed to an engine callback.
///
/// The callback runs while the registry's write lock is held; the scope
/// borrows the locked state so the callback can message clients without
/// taking the lock again.
pub struct CallbackScope<'a> {
    state: &'a mut RegistryState,
    server_id: ServerId,
}

impl<'a> CallbackScope<'a> {
    pub(crate) fn new(state: &'a mut RegistryState, server_id: ServerId) -> Self {
        Self { state, server_id }
    }

    /// Server whose route is being invoked
    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn send_to_client(&self, client_id: &ClientId, message: WebSocketMessage) -> HubResult<()> {
        self.send_to_client_on(self.server_id, client_id, message)
    }

    pub fn send_to_client_on(
        &self,
        server_id: ServerId,
        client_id: &ClientId,
        message: WebSocketMessage,
    ) -> HubResult<()> {
        self.state.instance(server_id)?.send_to_client(client_id, message)
    }

    pub fn broadcast(&self, path: &str, message: WebSocketMessage) -> HubResult<usize> {
        self.broadcast_on(self.server_id, path, message)
    }

    pub fn broadcast_on(&self, server_id: ServerId, path: &str, message: WebSocketMessage) -> HubResult<usize> {
        self.state.instance(server_id)?.broadcast(path, message)
    }

    pub fn list_clients(&self) -> HubResult<Vec<ClientInfo>> {
        Ok(self.state.instance(self.server_id)?.list_clients())
    }

    /// Live server ids, ascending
    pub fn server_ids(&self) -> Vec<ServerId> {
        self.state.server_ids()
    }
}

impl std::fmt::Debug for CallbackScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackScope")
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}
