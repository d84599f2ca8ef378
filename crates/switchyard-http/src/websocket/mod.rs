//! WebSocket clients of a server instance
//!
//! Each upgraded connection is driven by one task running
//! [`connection::run_connection`]; the instance keeps a [`WebSocketClient`]
//! handle per connection in its [`ConnectionRegistry`] for addressed sends,
//! broadcasts and shutdown.

pub mod client;
pub mod connection;
pub mod registry;
pub mod types;

pub use client::{ClientInfo, Outbound, WebSocketClient};
pub use registry::{BroadcastOutcome, ConnectionRegistry};
pub use types::{CloseFrame, WebSocketMessage};
