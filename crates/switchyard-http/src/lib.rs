//! # switchyard-http
//!
//! Multi-tenant HTTP/WebSocket server registry driven by an embedded script
//! engine.
//!
//! This crate provides:
//! - A process-wide registry of independent servers keyed by integer id
//! - Exact-path routing to engine callbacks, WebSocket endpoints and static mounts
//! - Addressed sends and broadcasts to live WebSocket clients
//! - Graceful drain and shutdown with a bounded deadline
//! - A management surface returning uniform success/message/payload results

// Core modules
pub mod config;
pub mod engine;
pub mod errors;
pub mod foundation;
pub mod logging;
pub mod management;
pub mod routing;
pub mod server;
pub mod testing;
pub mod websocket;

// Main registry API
pub use config::ServerConfig;
pub use errors::{BroadcastFailure, HubError, HubResult};
pub use management::{Management, ManagementResult};
pub use server::{CallbackScope, LifecycleState, ServerRegistry, TlsMaterial};

// Engine boundary
pub use engine::{
    CallbackHandle, CallbackRef, CallbackResponse, EngineError, EngineHandle, EngineResult, IncomingMessage,
    MessageKind, RequestDescriptor, ScriptEngine,
};

// Identifiers and WebSocket types
pub use foundation::{ClientId, ServerId};
pub use websocket::{ClientInfo, WebSocketMessage};

// Logging
pub use logging::{init_logging, LoggingConfig};
