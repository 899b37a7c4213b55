//! Message content shared by the server and client pipelines.
//!
//! Outgoing content starts as text, bytes or a structured value and is
//! rendered to bytes by the time it leaves a send/request pipeline.
//! Incoming content starts as raw bytes and may be decoded into a value.

use bytes::Bytes;

pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// Body on its way out.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingContent {
    Empty,
    Text(String),
    Bytes {
        content_type: Option<String>,
        body: Bytes,
    },
    /// A structured value waiting for a codec (see `ContentNegotiation`).
    Value(serde_json::Value),
}

impl OutgoingContent {
    pub fn kind(&self) -> &'static str {
        match self {
            OutgoingContent::Empty => "empty",
            OutgoingContent::Text(_) => "text",
            OutgoingContent::Bytes { .. } => "bytes",
            OutgoingContent::Value(_) => "value",
        }
    }
}

impl From<&str> for OutgoingContent {
    fn from(text: &str) -> Self {
        OutgoingContent::Text(text.to_string())
    }
}

impl From<String> for OutgoingContent {
    fn from(text: String) -> Self {
        OutgoingContent::Text(text)
    }
}

impl From<Bytes> for OutgoingContent {
    fn from(body: Bytes) -> Self {
        OutgoingContent::Bytes {
            content_type: None,
            body,
        }
    }
}

impl From<serde_json::Value> for OutgoingContent {
    fn from(value: serde_json::Value) -> Self {
        OutgoingContent::Value(value)
    }
}

/// Body on its way in.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingContent {
    Raw(Bytes),
    Value(serde_json::Value),
}
