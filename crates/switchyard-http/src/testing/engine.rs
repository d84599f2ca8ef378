//! Scriptable engine that records every call

use crate::engine::{
    CallbackHandle, CallbackResponse, EngineError, EngineResult, IncomingMessage, MessageKind, RequestDescriptor,
    ScriptEngine,
};
use crate::foundation::ClientId;
use crate::server::CallbackScope;
use crate::websocket::WebSocketMessage;
use async_trait::async_trait;
use axum::body::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted {
    Respond(CallbackResponse),
    Fail(String),
}

/// One WebSocket frame as the engine saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub handle: CallbackHandle,
    pub client_id: ClientId,
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl RecordedMessage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Default)]
struct Inner {
    scripts: Mutex<HashMap<CallbackHandle, Scripted>>,
    requests: Mutex<Vec<RequestDescriptor>>,
    messages: Mutex<Vec<RecordedMessage>>,
    delay: Mutex<Option<Duration>>,
    echo: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Engine double for tests.
///
/// Plain callbacks answer with whatever was scripted for their handle;
/// unscripted handles fail. Every call is recorded, and the highest number
/// of callbacks ever observed running at once is tracked.
#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, handle: CallbackHandle, response: CallbackResponse) {
        lock(&self.inner.scripts).insert(handle, Scripted::Respond(response));
    }

    pub fn fail<T: Into<String>>(&self, handle: CallbackHandle, message: T) {
        lock(&self.inner.scripts).insert(handle, Scripted::Fail(message.into()));
    }

    /// Hold every callback for `delay` before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.inner.delay) = Some(delay);
        self
    }

    /// Write every received WebSocket frame back to its sender
    pub fn with_echo(self) -> Self {
        self.inner.echo.store(true, Ordering::SeqCst);
        self
    }

    pub fn requests(&self) -> Vec<RequestDescriptor> {
        lock(&self.inner.requests).clone()
    }

    pub fn messages(&self) -> Vec<RecordedMessage> {
        lock(&self.inner.messages).clone()
    }

    /// Highest number of callbacks seen executing at the same time
    pub fn max_concurrency(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        lock(&self.inner.requests).len() + lock(&self.inner.messages).len()
    }

    /// Callbacks currently executing
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> CallGuard<'_> {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        // released on drop, so a call cancelled mid-delay still leaves
        let guard = CallGuard { inner: &self.inner };
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *lock(&self.inner.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        guard
    }
}

struct CallGuard<'a> {
    inner: &'a Inner,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScriptEngine for RecordingEngine {
    async fn call_request(
        &self,
        _scope: &mut CallbackScope<'_>,
        handle: &CallbackHandle,
        request: RequestDescriptor,
    ) -> EngineResult<CallbackResponse> {
        let _guard = self.enter().await;
        lock(&self.inner.requests).push(request);

        let scripted = lock(&self.inner.scripts).get(handle).cloned();
        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(EngineError::callback(message)),
            None => Err(EngineError::callback(format!("no script for callback {}", handle))),
        }
    }

    async fn call_message(
        &self,
        scope: &mut CallbackScope<'_>,
        handle: &CallbackHandle,
        message: IncomingMessage,
    ) -> EngineResult<()> {
        let _guard = self.enter().await;
        lock(&self.inner.messages).push(RecordedMessage {
            handle: *handle,
            client_id: message.client_id,
            kind: message.kind,
            payload: message.payload.clone(),
        });

        if self.inner.echo.load(Ordering::SeqCst) {
            let reply = match message.kind {
                MessageKind::Text => WebSocketMessage::text(String::from_utf8_lossy(&message.payload)),
                MessageKind::Binary => WebSocketMessage::binary(message.payload.to_vec()),
            };
            scope
                .send_to_client(&message.client_id, reply)
                .map_err(|e| EngineError::callback(e.to_string()))?;
        }

        if let Some(Scripted::Fail(reason)) = lock(&self.inner.scripts).get(handle) {
            return Err(EngineError::callback(reason.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_call_is_no_longer_in_flight() {
        let engine = RecordingEngine::new().with_delay(Duration::from_secs(10));

        let cancelled = tokio::time::timeout(Duration::from_millis(20), engine.enter()).await;
        assert!(cancelled.is_err());
        assert_eq!(engine.in_flight(), 0);
        assert_eq!(engine.max_concurrency(), 1);
    }
}
