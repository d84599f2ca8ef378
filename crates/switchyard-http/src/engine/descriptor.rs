use super::contract::{EngineError, EngineResult};
use crate::foundation::ClientId;
use axum::body::Bytes;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Snapshot of one plain request handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: String,
    /// The registered path that matched
    pub path: String,
    /// Request target as received, query string included
    pub url: String,
    /// Protocol version, e.g. `HTTP/1.1`
    pub proto: String,
    /// Declared body length; `None` when the request did not declare one
    pub content_length: Option<u64>,
    pub host: String,
    pub remote_addr: String,
    /// Capped, ordered header entries; repeated headers joined with `|`
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RequestDescriptor {
    /// First header entry with the given name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What the engine answers for a plain request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallbackResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl CallbackResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn ok<B: Into<Vec<u8>>>(body: B) -> Self {
        Self::new(200).with_body(body)
    }

    pub fn with_body<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// The `(404, empty body, no headers)` triple a callback returns to defer
    /// to the standard not-found response
    pub fn not_found_sentinel() -> Self {
        Self::new(404)
    }

    pub fn is_not_found_sentinel(&self) -> bool {
        self.status == 404 && self.body.is_empty() && self.headers.is_empty()
    }

    /// Reject a result that cannot be written as an HTTP response
    pub fn validated(self) -> EngineResult<Self> {
        if StatusCode::from_u16(self.status).is_err() {
            return Err(EngineError::InvalidResult(format!("status code {}", self.status)));
        }
        Ok(self)
    }
}

/// Message type tag delivered to WebSocket callbacks, using the frame opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Binary,
}

impl MessageKind {
    pub fn code(&self) -> u8 {
        match self {
            MessageKind::Text => 1,
            MessageKind::Binary => 2,
        }
    }
}

/// One data frame received from a WebSocket client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub client_id: ClientId,
    pub kind: MessageKind,
    pub payload: Bytes,
}
