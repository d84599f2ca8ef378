//! Server registry error types
//!
//! Every management operation reports failure through [`HubError`]; nothing on
//! the management surface panics or aborts the process.

use crate::foundation::{ClientId, ServerId};
use std::fmt;
use std::time::Duration;
use switchyard_core::ConfigError;
use thiserror::Error;

/// Result type for server registry operations
pub type HubResult<T> = Result<T, HubError>;

/// One recipient that could not be written to during a broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastFailure {
    pub client_id: ClientId,
    pub reason: String,
}

impl fmt::Display for BroadcastFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.client_id, self.reason)
    }
}

fn join_failures(failures: &[BroadcastFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Server registry errors
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Server with ID {id} not found")]
    ServerNotFound { id: ServerId },

    #[error("Path {path} exists already!")]
    PathAlreadyRegistered { path: String },

    #[error("Failed to create server at {address}, reason {reason}")]
    AddressUnavailable { address: String, reason: String },

    #[error("Client with ID {client_id} not found")]
    ClientNotFound { client_id: String },

    #[error("Write to websocket error: {reason}")]
    WriteError { client_id: ClientId, reason: String },

    #[error("No path or no clients at '{path}'")]
    NoPathOrNoClients { path: String },

    #[error("Broadcast to websocket error(s): {}", join_failures(.failures))]
    PartialBroadcastFailure {
        path: String,
        delivered: usize,
        failures: Vec<BroadcastFailure>,
    },

    #[error("WebSocket upgrade failed: {reason}")]
    UpgradeFailed { reason: String },

    #[error("Shutdown of server {id} did not finish within {timeout:?}")]
    ShutdownTimeout { id: ServerId, timeout: Duration },

    #[error("Server {id} is already stopping")]
    AlreadyStopping { id: ServerId },

    #[error("Engine call failed: {message}")]
    EngineCallFailed { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl HubError {
    pub fn server_not_found(id: ServerId) -> Self {
        HubError::ServerNotFound { id }
    }

    pub fn path_registered<T: Into<String>>(path: T) -> Self {
        HubError::PathAlreadyRegistered { path: path.into() }
    }

    pub fn address_unavailable<A: Into<String>, R: fmt::Display>(address: A, reason: R) -> Self {
        HubError::AddressUnavailable {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub fn client_not_found<T: fmt::Display>(client_id: T) -> Self {
        HubError::ClientNotFound {
            client_id: client_id.to_string(),
        }
    }

    pub fn engine<T: Into<String>>(message: T) -> Self {
        HubError::EngineCallFailed {
            message: message.into(),
        }
    }

    /// Get error code for consistent responses across the management surface
    pub fn error_code(&self) -> &'static str {
        match self {
            HubError::ServerNotFound { .. } => "SERVER_NOT_FOUND",
            HubError::PathAlreadyRegistered { .. } => "PATH_ALREADY_REGISTERED",
            HubError::AddressUnavailable { .. } => "ADDRESS_UNAVAILABLE",
            HubError::ClientNotFound { .. } => "CLIENT_NOT_FOUND",
            HubError::WriteError { .. } => "WRITE_ERROR",
            HubError::NoPathOrNoClients { .. } => "NO_PATH_OR_NO_CLIENTS",
            HubError::PartialBroadcastFailure { .. } => "PARTIAL_BROADCAST_FAILURE",
            HubError::UpgradeFailed { .. } => "UPGRADE_FAILED",
            HubError::ShutdownTimeout { .. } => "SHUTDOWN_TIMEOUT",
            HubError::AlreadyStopping { .. } => "ALREADY_STOPPING",
            HubError::EngineCallFailed { .. } => "ENGINE_CALL_FAILED",
            HubError::Config(_) => "CONFIGURATION_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_match_management_wording() {
        assert_eq!(
            HubError::server_not_found(ServerId(7)).to_string(),
            "Server with ID 7 not found"
        );
        assert_eq!(
            HubError::path_registered("/hello").to_string(),
            "Path /hello exists already!"
        );
        assert_eq!(
            HubError::NoPathOrNoClients { path: "/ws".into() }.to_string(),
            "No path or no clients at '/ws'"
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(HubError::server_not_found(ServerId(1)).error_code(), "SERVER_NOT_FOUND");
        assert_eq!(HubError::engine("boom").error_code(), "ENGINE_CALL_FAILED");
        assert_eq!(
            HubError::ShutdownTimeout { id: ServerId(1), timeout: Duration::from_secs(1) }.error_code(),
            "SHUTDOWN_TIMEOUT"
        );
    }

    #[test]
    fn test_partial_broadcast_lists_every_failure() {
        let first = ClientId::new();
        let second = ClientId::new();
        let error = HubError::PartialBroadcastFailure {
            path: "/ws".to_string(),
            delivered: 1,
            failures: vec![
                BroadcastFailure { client_id: first, reason: "connection closed".into() },
                BroadcastFailure { client_id: second, reason: "connection closed".into() },
            ],
        };

        let message = error.to_string();
        assert!(message.contains(&first.to_string()));
        assert!(message.contains(&second.to_string()));
    }

    #[test]
    fn test_config_error_conversion() {
        let config_error = ConfigError::validation_failed("max_body_size", "must be greater than 0");
        let error = HubError::from(config_error);
        assert!(matches!(error, HubError::Config(_)));
        assert_eq!(error.error_code(), "CONFIGURATION_ERROR");
    }
}
