//! Stream message frames.

use crate::error::StreamResult;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

/// A frame sent or received on a stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text frame
    Text(String),
    /// Binary frame
    Binary(Bytes),
    /// Ping frame
    Ping(Bytes),
    /// Pong frame
    Pong(Bytes),
    /// Close frame
    Close,
}

impl Message {
    /// Create a new text message.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text(text.into())
    }

    /// Create a new binary message.
    pub fn binary<B: Into<Bytes>>(data: B) -> Self {
        Self::Binary(data.into())
    }

    /// Create a text message holding `value` as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> StreamResult<Self> {
        Ok(Self::Text(serde_json::to_string(value)?))
    }

    /// Parse a text or binary payload as JSON.
    pub fn parse_json<T: DeserializeOwned>(&self) -> StreamResult<T> {
        Ok(serde_json::from_slice(self.as_bytes())?)
    }

    /// Get the text of a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the payload bytes. Close frames have none.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => &data[..],
            Self::Close => &[],
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if this is a data frame (text or binary).
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Binary(_))
    }

    /// Check if this is a close message.
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

impl From<tungstenite::Message> for Message {
    fn from(msg: tungstenite::Message) -> Self {
        match msg {
            tungstenite::Message::Text(text) => Self::Text(text.as_str().to_string()),
            tungstenite::Message::Binary(data) => Self::Binary(data),
            tungstenite::Message::Ping(data) => Self::Ping(data),
            tungstenite::Message::Pong(data) => Self::Pong(data),
            tungstenite::Message::Close(_) => Self::Close,
            tungstenite::Message::Frame(frame) => Self::Binary(Bytes::copy_from_slice(frame.payload())),
        }
    }
}

impl From<Message> for tungstenite::Message {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => tungstenite::Message::Text(text.into()),
            Message::Binary(data) => tungstenite::Message::Binary(data),
            Message::Ping(data) => tungstenite::Message::Ping(data),
            Message::Pong(data) => tungstenite::Message::Pong(data),
            Message::Close => tungstenite::Message::Close(None),
        }
    }
}
