//! Body codecs used by content negotiation on both sides.
//!
//! Values travel through the send/receive pipelines as `serde_json::Value`;
//! a codec turns them into bytes and back.

use std::fmt;

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Cannot encode body as {content_type}: {reason}")]
    Encode {
        content_type: &'static str,
        reason: String,
    },

    #[error("Cannot decode {content_type} body: {reason}")]
    Decode {
        content_type: &'static str,
        reason: String,
    },
}

pub trait Codec: Send + Sync + fmt::Debug {
    /// Media type written to `content-type`, e.g. `application/json`.
    fn content_type(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<Bytes, CodecError>;

    fn decode(&self, body: &[u8]) -> Result<Value, CodecError>;

    /// True if a `content-type` header value names this codec's media type.
    fn accepts(&self, content_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .map(|essence| essence.trim().eq_ignore_ascii_case(self.content_type()))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode {
                content_type: self.content_type(),
                reason: e.to_string(),
            })
    }

    fn decode(&self, body: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(body).map_err(|e| CodecError::Decode {
            content_type: self.content_type(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec() {
        let codec = JsonCodec;
        let body = codec.encode(&json!({"id": 1})).unwrap();
        assert_eq!(&body[..], br#"{"id":1}"#);
        assert_eq!(codec.decode(&body).unwrap(), json!({"id": 1}));
        assert!(codec.decode(b"{oops").is_err());
    }

    #[test]
    fn test_accepts_parameters() {
        let codec = JsonCodec;
        assert!(codec.accepts("application/json"));
        assert!(codec.accepts("Application/JSON; charset=utf-8"));
        assert!(!codec.accepts("text/plain"));
    }
}
