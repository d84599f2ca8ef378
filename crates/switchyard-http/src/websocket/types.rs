//! Outbound WebSocket message types - a small API over axum's frames

use axum::extract::ws;
use std::borrow::Cow;

/// Messages the core writes to a client
#[derive(Debug, Clone, PartialEq)]
pub enum WebSocketMessage {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<CloseFrame>),
}

/// Close frame information
#[derive(Debug, Clone, PartialEq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl WebSocketMessage {
    pub fn text<T: Into<String>>(content: T) -> Self {
        Self::Text(content.into())
    }

    pub fn binary<T: Into<Vec<u8>>>(data: T) -> Self {
        Self::Binary(data.into())
    }

    pub fn close_with_reason<R: Into<String>>(code: u16, reason: R) -> Self {
        Self::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }))
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }
}

impl From<WebSocketMessage> for ws::Message {
    fn from(msg: WebSocketMessage) -> Self {
        match msg {
            WebSocketMessage::Text(text) => ws::Message::Text(text),
            WebSocketMessage::Binary(data) => ws::Message::Binary(data),
            WebSocketMessage::Close(frame) => ws::Message::Close(frame.map(|f| ws::CloseFrame {
                code: f.code,
                reason: Cow::Owned(f.reason),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_frame_conversion() {
        let msg: ws::Message = WebSocketMessage::close_with_reason(1000, "bye").into();
        match msg {
            ws::Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 1000);
                assert_eq!(frame.reason, "bye");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_text_conversion() {
        let msg: ws::Message = WebSocketMessage::text("hi").into();
        assert_eq!(msg, ws::Message::Text("hi".to_string()));
        assert!(!WebSocketMessage::text("hi").is_close());
    }
}
