//! Server registry, server instances and their lifecycle
//!
//! One [`ServerRegistry`] owns every [`ServerInstance`] behind a single
//! read/write lock. Mutations and every engine callback run under the write
//! half of that lock, so at most one callback executes at any instant.

pub mod dispatch;
pub mod instance;
pub mod lifecycle;
pub mod registry;
pub mod scope;
pub mod static_files;

pub use instance::{LifecycleState, ServerInstance, TlsMaterial};
pub use registry::{resolve_address, RegistryState, ServerRegistry};
pub use scope::CallbackScope;
