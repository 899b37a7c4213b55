//! A single request/response exchange.
//!
//! # Responsibilities
//! - Hold the immutable request and the mutable response under construction
//! - Carry typed per-call context objects (extensions)
//! - Run the send pipeline (`respond`) and the receive pipeline (`receive`)
//!
//! # Design Decisions
//! - The call is shared as `Arc<ApplicationCall>` by every pipeline that
//!   serves it; mutable state sits behind short-lived locks that are never
//!   held across an `.await`
//! - A call is handled once its response content has been committed

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Extensions, HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::CodecError;
use crate::content::{IncomingContent, OutgoingContent, TEXT_PLAIN_UTF8};
use crate::di::{DependencyError, DependencyGraph};
use crate::pipeline::PipelineError;
use crate::routing::{Location, LocationError, Locations, Parameters};
use crate::server::application::Application;
use crate::server::error::ServerError;

/// An incoming request as seen by the call pipeline.
#[derive(Debug, Clone)]
pub struct ApplicationRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApplicationRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// The response produced for a call.
#[derive(Debug, Clone)]
pub struct ApplicationResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApplicationResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

#[derive(Debug)]
struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Bytes,
}

/// Request, response and context of one call.
pub struct ApplicationCall {
    application: Application,
    request: ApplicationRequest,
    query: Parameters,
    response: Mutex<ResponseState>,
    handled: AtomicBool,
    extensions: Mutex<Extensions>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ApplicationCall {
    pub(crate) fn new(application: Application, request: ApplicationRequest) -> Arc<Self> {
        let query = Parameters::parse_query(request.uri.query().unwrap_or(""));
        Arc::new(Self {
            application,
            request,
            query,
            response: Mutex::new(ResponseState {
                status: None,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            }),
            handled: AtomicBool::new(false),
            extensions: Mutex::new(Extensions::new()),
        })
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn request(&self) -> &ApplicationRequest {
        &self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn path(&self) -> &str {
        self.request.uri.path()
    }

    pub fn query_parameters(&self) -> &Parameters {
        &self.query
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        self.application.dependencies()
    }

    pub async fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, DependencyError> {
        self.application.dependencies().resolve::<T>().await
    }

    pub fn locations(&self) -> &Locations {
        self.application.locations()
    }

    /// Href of `location` under this application's registry.
    pub fn href<L: Location>(&self, location: &L) -> Result<String, LocationError> {
        self.locations().href(location)
    }

    /// A copy of the per-call object of type `T`, if one was inserted.
    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        lock(&self.extensions).get::<T>().cloned()
    }

    pub fn insert_extension<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        lock(&self.extensions).insert(value)
    }

    /// Status set so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        lock(&self.response).status
    }

    pub fn set_status(&self, status: StatusCode) {
        lock(&self.response).status = Some(status);
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        lock(&self.response).headers.insert(name, value);
    }

    pub fn response_header(&self, name: &HeaderName) -> Option<HeaderValue> {
        lock(&self.response).headers.get(name).cloned()
    }

    /// True once response content has been committed.
    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::SeqCst)
    }

    /// Send `content` through the send pipeline and commit the result.
    pub async fn respond(self: &Arc<Self>, content: impl Into<OutgoingContent>) -> Result<(), PipelineError> {
        if self.is_handled() {
            return Err(PipelineError::failed(ServerError::AlreadyResponded));
        }
        let content = self
            .application
            .send_pipeline()
            .execute(Arc::clone(self), content.into())
            .await?;
        self.commit(content)
    }

    /// Respond with `value` as a structured value.
    pub async fn respond_value<T: Serialize + ?Sized>(self: &Arc<Self>, value: &T) -> Result<(), PipelineError> {
        let value = serde_json::to_value(value).map_err(|e| {
            PipelineError::failed(ServerError::Codec(CodecError::Encode {
                content_type: "value",
                reason: e.to_string(),
            }))
        })?;
        self.respond(OutgoingContent::Value(value)).await
    }

    /// Respond with an empty body and `status`.
    pub async fn respond_status(self: &Arc<Self>, status: StatusCode) -> Result<(), PipelineError> {
        self.set_status(status);
        self.respond(OutgoingContent::Empty).await
    }

    /// Run the receive pipeline over the request body and decode a `T`.
    pub async fn receive<T: DeserializeOwned>(self: &Arc<Self>) -> Result<T, PipelineError> {
        let content = self
            .application
            .receive_pipeline()
            .execute(Arc::clone(self), IncomingContent::Raw(self.request.body.clone()))
            .await?;

        match content {
            IncomingContent::Value(value) => serde_json::from_value(value)
                .map_err(|e| PipelineError::failed(ServerError::BadRequest(e.to_string()))),
            IncomingContent::Raw(_) => Err(PipelineError::failed(ServerError::UnsupportedMediaType(
                self.header(header::CONTENT_TYPE.as_str())
                    .unwrap_or("no content type")
                    .to_string(),
            ))),
        }
    }

    /// The request body as UTF-8 text.
    pub fn receive_text(&self) -> Result<String, PipelineError> {
        String::from_utf8(self.request.body.to_vec())
            .map_err(|e| PipelineError::failed(ServerError::BadRequest(e.to_string())))
    }

    fn commit(&self, content: OutgoingContent) -> Result<(), PipelineError> {
        let (content_type, body) = match content {
            OutgoingContent::Empty => (None, Bytes::new()),
            OutgoingContent::Text(text) => (Some(TEXT_PLAIN_UTF8.to_string()), Bytes::from(text)),
            OutgoingContent::Bytes { content_type, body } => (content_type, body),
            OutgoingContent::Value(_) => {
                return Err(PipelineError::failed(ServerError::Unrendered("value")));
            }
        };

        let mut response = lock(&self.response);
        if let Some(content_type) = content_type {
            if !response.headers.contains_key(header::CONTENT_TYPE) {
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    response.headers.insert(header::CONTENT_TYPE, value);
                }
            }
        }
        response.body = body;
        response.status.get_or_insert(StatusCode::OK);
        self.handled.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// The response as committed so far. Unhandled calls report 404.
    pub(crate) fn response(&self) -> ApplicationResponse {
        let response = lock(&self.response);
        ApplicationResponse {
            status: response.status.unwrap_or(StatusCode::NOT_FOUND),
            headers: response.headers.clone(),
            body: response.body.clone(),
        }
    }

    /// Keep headers set so far, replace status and drop any body.
    pub(crate) fn failure_response(&self, status: StatusCode) -> ApplicationResponse {
        let response = lock(&self.response);
        let mut headers = response.headers.clone();
        headers.remove(header::CONTENT_TYPE);
        ApplicationResponse {
            status,
            headers,
            body: Bytes::new(),
        }
    }
}

impl fmt::Debug for ApplicationCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationCall")
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .field("handled", &self.is_handled())
            .finish()
    }
}
