//! The HTTP client and its pipelines.
//!
//! # Data Flow
//! ```text
//! HttpClient::request(builder)
//!     → request pipeline: Before → State → Transform → Render → Send
//!       (the last Send interceptor freezes the builder and calls the engine)
//!     → response pipeline: Receive → Parse → Transform → State → After
//!     → HttpResponse
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use axum::http::Extensions;

use crate::client::engine::{HttpClientEngine, ReqwestEngine};
use crate::client::error::ClientError;
use crate::client::phases;
use crate::client::request::{HttpRequestBuilder, HttpRequestData};
use crate::client::response::{HttpResponse, HttpResponseData};
use crate::config::ClientConfig;
use crate::observability::metrics;
use crate::pipeline::{Pipeline, PipelineError};
use crate::routing::{Location, Locations};

pub type RequestPipeline = Pipeline<HttpRequestBuilder, Arc<ClientCall>>;
pub type ResponsePipeline = Pipeline<HttpResponse, Arc<ClientCall>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State of one client exchange, shared by both pipelines.
#[derive(Default)]
pub struct ClientCall {
    attributes: Mutex<Extensions>,
    request: OnceLock<HttpRequestData>,
    response: Mutex<Option<HttpResponseData>>,
}

impl ClientCall {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The request as sent. `None` until the engine has been called.
    pub fn request(&self) -> Option<&HttpRequestData> {
        self.request.get()
    }

    pub fn attribute<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        lock(&self.attributes).get::<T>().cloned()
    }

    pub fn insert_attribute<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        lock(&self.attributes).insert(value)
    }

    fn take_response(&self) -> Option<HttpResponseData> {
        lock(&self.response).take()
    }
}

impl fmt::Debug for ClientCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCall")
            .field("request", &self.request.get().map(|r| r.url.as_str()))
            .finish()
    }
}

/// A feature installed into an [`HttpClientBuilder`].
pub trait ClientPlugin {
    const NAME: &'static str;

    fn install(self, client: &mut HttpClientBuilder) -> Result<(), ClientError>;
}

pub struct HttpClientBuilder {
    engine: Arc<dyn HttpClientEngine>,
    request: RequestPipeline,
    response: ResponsePipeline,
    locations: Locations,
    installed: Vec<&'static str>,
}

impl HttpClientBuilder {
    pub fn new(engine: impl HttpClientEngine + 'static) -> Self {
        Self {
            engine: Arc::new(engine),
            request: Pipeline::with_name("client-request", &phases::request_phases()),
            response: Pipeline::with_name("client-response", &phases::response_phases()),
            locations: Locations::new(),
            installed: Vec::new(),
        }
    }

    pub fn with_locations(mut self, locations: Locations) -> Self {
        self.locations = locations;
        self
    }

    pub fn request_pipeline(&mut self) -> &mut RequestPipeline {
        &mut self.request
    }

    pub fn response_pipeline(&mut self) -> &mut ResponsePipeline {
        &mut self.response
    }

    pub fn install<P: ClientPlugin>(mut self, plugin: P) -> Result<Self, ClientError> {
        if self.installed.contains(&P::NAME) {
            return Ok(self);
        }
        plugin.install(&mut self)?;
        self.installed.push(P::NAME);
        tracing::debug!(plugin = P::NAME, "Installed client plugin");
        Ok(self)
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.iter().any(|installed| *installed == name)
    }

    pub fn build(mut self) -> Result<HttpClient, ClientError> {
        let engine = Arc::clone(&self.engine);
        self.request.intercept(&phases::SEND, move |ctx| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                let request = ctx.subject().clone().into_request().map_err(PipelineError::failed)?;
                let method = request.method.clone();
                let call = Arc::clone(ctx.call());
                let _ = call.request.set(request.clone());

                let outcome = ctx.cancellable(engine.execute(request)).await?;
                metrics::record_client_request(
                    method.as_str(),
                    outcome.as_ref().ok().map(|response| response.status.as_u16()),
                );
                let response = outcome.map_err(|e| ctx.fail(e))?;
                *lock(&call.response) = Some(response);
                ctx.proceed().await
            })
        })?;

        Ok(HttpClient {
            inner: Arc::new(HttpClientInner {
                request: self.request,
                response: self.response,
                locations: self.locations,
            }),
        })
    }
}

struct HttpClientInner {
    request: RequestPipeline,
    response: ResponsePipeline,
    locations: Locations,
}

/// A built client. Cloning shares pipelines and the engine's connection pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

impl HttpClient {
    pub fn builder(engine: impl HttpClientEngine + 'static) -> HttpClientBuilder {
        HttpClientBuilder::new(engine)
    }

    /// A client over the reqwest engine, with no plugins installed.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::builder(ReqwestEngine::new(config)?).build()
    }

    pub fn locations(&self) -> &Locations {
        &self.inner.locations
    }

    /// Run `request` through both pipelines.
    pub async fn request(&self, request: HttpRequestBuilder) -> Result<HttpResponse, ClientError> {
        let call = ClientCall::new();
        let url = request.url.clone();
        self.inner.request.execute(Arc::clone(&call), request).await?;

        let Some(data) = call.take_response() else {
            return Err(ClientError::NotSent);
        };
        tracing::debug!(url = %url, status = data.status.as_u16(), "Client request completed");

        let response = self.inner.response.execute(call, HttpResponse::from(data)).await?;
        Ok(response)
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<HttpResponse, ClientError> {
        self.request(HttpRequestBuilder::get(url)).await
    }

    /// Href of `location` under this client's registry.
    pub fn href<L: Location>(&self, location: &L) -> Result<String, ClientError> {
        Ok(self.inner.locations.href(location)?)
    }

    /// `GET` the href of `location`.
    pub async fn get_location<L: Location>(&self, location: &L) -> Result<HttpResponse, ClientError> {
        let href = self.href(location)?;
        self.get(href).await
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("request", &self.inner.request)
            .field("response", &self.inner.response)
            .finish()
    }
}
