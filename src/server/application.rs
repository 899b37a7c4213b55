//! Application assembly and call dispatch.
//!
//! # Data Flow
//! ```text
//! ApplicationBuilder
//!     → install(plugin) (plugins add interceptors to the three pipelines)
//!     → build() (appends the 404 fallback, freezes the pipelines)
//!     → Application (cheap to clone, shared by the transport)
//!
//! Application::handle(request)
//!     → ApplicationCall
//!     → call pipeline: Setup → Monitoring → Plugins → Call → Fallback
//!     → ApplicationResponse (unrecovered failures → status from the cause)
//! ```
//!
//! # Design Decisions
//! - Pipelines are mutable only on the builder; a built application shares
//!   them read-only across concurrent calls
//! - The application is transport-agnostic; `engine.rs` adapts it to axum

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;

use crate::config::properties::ConfigProperties;
use crate::config::schema::{ConflictPolicyKind, ServerConfig};
use crate::di::{ConfigurationDependencyMap, DependencyGraph, IgnoreConflicts};
use crate::observability::metrics;
use crate::pipeline::{InterceptorFuture, Pipeline, PipelineContext, PipelinePhase};
use crate::routing::Locations;
use crate::content::{IncomingContent, OutgoingContent};
use crate::server::call::{ApplicationCall, ApplicationRequest, ApplicationResponse};
use crate::server::error::ServerError;
use crate::server::phases;

pub type CallPipeline = Pipeline<(), Arc<ApplicationCall>>;
pub type SendPipeline = Pipeline<OutgoingContent, Arc<ApplicationCall>>;
pub type ReceivePipeline = Pipeline<IncomingContent, Arc<ApplicationCall>>;

/// A feature installed into an [`ApplicationBuilder`].
pub trait Plugin {
    /// Unique name; a plugin can be installed once.
    const NAME: &'static str;

    fn install(self, application: &mut ApplicationBuilder) -> Result<(), ServerError>;
}

/// Mutable application definition.
pub struct ApplicationBuilder {
    call: CallPipeline,
    send: SendPipeline,
    receive: ReceivePipeline,
    dependencies: DependencyGraph,
    locations: Locations,
    installed: Vec<&'static str>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self::with_dependencies(DependencyGraph::new())
    }

    pub fn with_dependencies(dependencies: DependencyGraph) -> Self {
        Self {
            call: Pipeline::with_name("call", &phases::call_phases()),
            send: Pipeline::with_name("send", &phases::send_phases()),
            receive: Pipeline::with_name("receive", &phases::receive_phases()),
            dependencies,
            locations: Locations::new(),
            installed: Vec::new(),
        }
    }

    /// Dependency graph configured from `config`, with `[properties]`
    /// resolvable by dotted path.
    pub fn from_config(config: &ServerConfig) -> Self {
        let builder = DependencyGraph::builder()
            .startup(config.dependencies.startup)
            .include(ConfigurationDependencyMap::new(ConfigProperties::from_table(
                config.properties.clone(),
            )));
        let graph = match config.dependencies.conflict_policy {
            ConflictPolicyKind::Default => builder.build(),
            ConflictPolicyKind::Ignore => builder.conflict_policy(IgnoreConflicts).build(),
        };
        Self::with_dependencies(graph)
    }

    pub fn with_locations(mut self, locations: Locations) -> Self {
        self.locations = locations;
        self
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    pub fn locations(&self) -> &Locations {
        &self.locations
    }

    pub fn call_pipeline(&mut self) -> &mut CallPipeline {
        &mut self.call
    }

    pub fn send_pipeline(&mut self) -> &mut SendPipeline {
        &mut self.send
    }

    pub fn receive_pipeline(&mut self) -> &mut ReceivePipeline {
        &mut self.receive
    }

    /// Add an interceptor to the call pipeline.
    pub fn intercept<F>(&mut self, phase: &PipelinePhase, block: F) -> Result<(), ServerError>
    where
        F: for<'a> Fn(&'a mut PipelineContext<(), Arc<ApplicationCall>>) -> InterceptorFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Ok(self.call.intercept(phase, block)?)
    }

    pub fn install<P: Plugin>(mut self, plugin: P) -> Result<Self, ServerError> {
        if self.installed.contains(&P::NAME) {
            return Err(ServerError::DuplicatePlugin(P::NAME));
        }
        plugin.install(&mut self)?;
        self.installed.push(P::NAME);
        tracing::debug!(plugin = P::NAME, "Installed plugin");
        Ok(self)
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.iter().any(|installed| *installed == name)
    }

    pub fn build(mut self) -> Result<Application, ServerError> {
        self.call.intercept(&phases::FALLBACK, |ctx| {
            Box::pin(async move {
                let call = Arc::clone(ctx.call());
                if !call.is_handled() {
                    call.respond_status(StatusCode::NOT_FOUND).await?;
                }
                ctx.proceed().await
            })
        })?;

        tracing::debug!(
            plugins = ?self.installed,
            interceptors = self.call.interceptor_count(),
            "Application built"
        );

        Ok(Application {
            inner: Arc::new(ApplicationInner {
                call: self.call,
                send: self.send,
                receive: self.receive,
                dependencies: self.dependencies,
                locations: self.locations,
            }),
        })
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ApplicationInner {
    call: CallPipeline,
    send: SendPipeline,
    receive: ReceivePipeline,
    dependencies: DependencyGraph,
    locations: Locations,
}

/// A built application. Cloning shares it.
#[derive(Clone)]
pub struct Application {
    inner: Arc<ApplicationInner>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.inner.dependencies
    }

    pub fn locations(&self) -> &Locations {
        &self.inner.locations
    }

    pub fn send_pipeline(&self) -> &SendPipeline {
        &self.inner.send
    }

    pub fn receive_pipeline(&self) -> &ReceivePipeline {
        &self.inner.receive
    }

    /// Serve one request.
    pub async fn handle(&self, request: ApplicationRequest) -> ApplicationResponse {
        let start = Instant::now();
        let method = request.method.clone();
        let call = ApplicationCall::new(self.clone(), request);

        let response = match self.inner.call.execute(Arc::clone(&call), ()).await {
            Ok(()) => call.response(),
            Err(error) => {
                let status = ServerError::status_for(&error);
                if status.is_server_error() {
                    tracing::error!(
                        method = %method,
                        path = %call.path(),
                        error = %error,
                        trace = %error.trace().map(ToString::to_string).unwrap_or_default(),
                        "Unhandled failure while serving call"
                    );
                } else {
                    tracing::debug!(method = %method, path = %call.path(), error = %error, "Call rejected");
                }
                call.failure_response(status)
            }
        };

        metrics::record_call(method.as_str(), response.status.as_u16(), start);
        response
    }

    /// Run dependency shutdown hooks.
    pub fn shutdown(&self) -> usize {
        self.inner.dependencies.shutdown()
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("call", &self.inner.call)
            .field("send", &self.inner.send)
            .field("receive", &self.inner.receive)
            .finish()
    }
}

