use super::descriptor::{CallbackResponse, IncomingMessage, RequestDescriptor};
use super::handle::CallbackHandle;
use crate::server::CallbackScope;
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by the engine while running a callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The callback raised; carries the engine's diagnostic text
    #[error("{0}")]
    Callback(String),

    /// The callback returned something the core cannot use
    #[error("invalid callback result: {0}")]
    InvalidResult(String),
}

impl EngineError {
    pub fn callback<T: Into<String>>(message: T) -> Self {
        EngineError::Callback(message.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Callback contract the embedding script engine implements.
///
/// Calls are never concurrent: the registry invokes the engine while holding
/// its exclusive lock, so at most one callback runs process-wide at any
/// instant. The [`CallbackScope`] gives the callback access to outbound
/// messaging against that already-held lock; calling back into the
/// [`ServerRegistry`](crate::ServerRegistry) itself from inside a callback
/// would deadlock.
///
/// Plain request callbacks run on a task of their own and are never
/// cancelled once started, even when the request that triggered them times
/// out.
#[async_trait]
pub trait ScriptEngine: Send + Sync + 'static {
    /// Run a plain route handler
    async fn call_request(
        &self,
        scope: &mut CallbackScope<'_>,
        handle: &CallbackHandle,
        request: RequestDescriptor,
    ) -> EngineResult<CallbackResponse>;

    /// Run a WebSocket route handler for one data frame
    async fn call_message(
        &self,
        scope: &mut CallbackScope<'_>,
        handle: &CallbackHandle,
        message: IncomingMessage,
    ) -> EngineResult<()>;
}
