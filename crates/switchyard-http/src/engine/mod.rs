//! Boundary with the external script engine
//!
//! The serving core never interprets route logic. It stores opaque
//! [`CallbackHandle`]s, hands the engine a [`RequestDescriptor`] or an
//! [`IncomingMessage`], and writes back whatever the engine answers.

pub mod contract;
pub mod descriptor;
pub mod handle;

pub use contract::{EngineError, EngineResult, ScriptEngine};
pub use descriptor::{CallbackResponse, IncomingMessage, MessageKind, RequestDescriptor};
pub use handle::{CallbackHandle, CallbackRef, EngineHandle};
