//! Incoming responses.

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::client::error::ClientError;
use crate::content::IncomingContent;

/// What an engine returns.
#[derive(Debug, Clone)]
pub struct HttpResponseData {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A response after the response pipeline; its body may be decoded.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: IncomingContent,
}

impl From<HttpResponseData> for HttpResponse {
    fn from(data: HttpResponseData) -> Self {
        Self {
            status: data.status,
            headers: data.headers,
            body: IncomingContent::Raw(data.body),
        }
    }
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The body as text; decoded values are rendered back as JSON.
    pub fn text(&self) -> Result<String, ClientError> {
        match &self.body {
            IncomingContent::Raw(bytes) => {
                String::from_utf8(bytes.to_vec()).map_err(|e| ClientError::Decode(e.to_string()))
            }
            IncomingContent::Value(value) => Ok(value.to_string()),
        }
    }

    /// The body decoded as `T`. Needs `ContentNegotiation` to have
    /// transformed the raw bytes.
    pub fn body<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        match &self.body {
            IncomingContent::Value(value) => {
                T::deserialize(value).map_err(|e| ClientError::Decode(e.to_string()))
            }
            IncomingContent::Raw(_) => Err(ClientError::NoTransformation(
                self.header("content-type").unwrap_or("no content type").to_string(),
            )),
        }
    }
}
