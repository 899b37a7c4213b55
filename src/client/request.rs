//! Outgoing requests.

use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use serde::Serialize;
use url::Url;

use crate::client::error::ClientError;
use crate::codec::CodecError;
use crate::content::{OutgoingContent, TEXT_PLAIN_UTF8};

/// A request under construction; the subject of the request pipeline.
///
/// `url` may be relative until `DefaultRequest` resolves it.
#[derive(Debug, Clone)]
pub struct HttpRequestBuilder {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: OutgoingContent,
}

impl HttpRequestBuilder {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: OutgoingContent::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<OutgoingContent>) -> Self {
        self.body = body.into();
        self
    }

    /// Use `value` as a structured body, rendered by `ContentNegotiation`.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(value).map_err(|e| CodecError::Encode {
            content_type: "value",
            reason: e.to_string(),
        })?;
        Ok(self.body(OutgoingContent::Value(value)))
    }

    /// Freeze into what the engine sends.
    pub(crate) fn into_request(self) -> Result<HttpRequestData, ClientError> {
        let url = Url::parse(&self.url).map_err(|e| ClientError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        let mut headers = self.headers;
        let (content_type, body) = match self.body {
            OutgoingContent::Empty => (None, Bytes::new()),
            OutgoingContent::Text(text) => (Some(TEXT_PLAIN_UTF8.to_string()), Bytes::from(text)),
            OutgoingContent::Bytes { content_type, body } => (content_type, body),
            OutgoingContent::Value(_) => return Err(ClientError::Unrendered("value")),
        };
        if let Some(content_type) = content_type {
            if !headers.contains_key(header::CONTENT_TYPE) {
                let value = HeaderValue::from_str(&content_type)
                    .map_err(|_| ClientError::InvalidHeader(content_type.clone()))?;
                headers.insert(header::CONTENT_TYPE, value);
            }
        }

        Ok(HttpRequestData {
            method: self.method,
            url,
            headers,
            body,
        })
    }
}

/// A finished request as handed to an engine.
#[derive(Debug, Clone)]
pub struct HttpRequestData {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}
