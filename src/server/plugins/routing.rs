//! Typed route dispatch.
//!
//! # Data Flow
//! ```text
//! Call phase
//!     → routes with the call's method, in registration order
//!     → Locations::resolve::<L>(path, query)
//!         mismatch        → next route
//!         decoded L       → handler(call, L)
//!         bad parameters  → remembered; 400 if nothing else matches
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use futures_util::future::{BoxFuture, FutureExt};

use crate::pipeline::PipelineError;
use crate::routing::{Location, LocationError, LocationInfo, Locations, PatternError};
use crate::server::application::{ApplicationBuilder, Plugin};
use crate::server::call::ApplicationCall;
use crate::server::error::ServerError;
use crate::server::phases;

type HandlerFuture = BoxFuture<'static, Result<(), PipelineError>>;
type Dispatch = Arc<dyn Fn(&Arc<ApplicationCall>) -> Result<Option<HandlerFuture>, LocationError> + Send + Sync>;

struct Route {
    method: Method,
    location: &'static str,
    info: fn(&Locations) -> Result<Arc<LocationInfo>, LocationError>,
    dispatch: Dispatch,
}

/// Maps location types and methods to handlers.
#[derive(Default)]
pub struct Routing {
    routes: Vec<Route>,
}

impl Routing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<L, F, Fut>(mut self, method: Method, handler: F) -> Self
    where
        L: Location,
        F: Fn(Arc<ApplicationCall>, L) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let dispatch: Dispatch = Arc::new(move |call: &Arc<ApplicationCall>| {
            let location = match call.locations().resolve::<L>(call.path(), call.query_parameters()) {
                Ok(location) => location,
                Err(LocationError::Pattern(PatternError::Mismatch { .. })) => return Ok(None),
                Err(error) => return Err(error),
            };
            Ok(Some(handler(Arc::clone(call), location).boxed()))
        });

        self.routes.push(Route {
            method,
            location: std::any::type_name::<L>(),
            info: Locations::info::<L>,
            dispatch,
        });
        self
    }

    pub fn get<L, F, Fut>(self, handler: F) -> Self
    where
        L: Location,
        F: Fn(Arc<ApplicationCall>, L) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        self.route(Method::GET, handler)
    }

    pub fn post<L, F, Fut>(self, handler: F) -> Self
    where
        L: Location,
        F: Fn(Arc<ApplicationCall>, L) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        self.route(Method::POST, handler)
    }

    pub fn put<L, F, Fut>(self, handler: F) -> Self
    where
        L: Location,
        F: Fn(Arc<ApplicationCall>, L) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        self.route(Method::PUT, handler)
    }

    pub fn delete<L, F, Fut>(self, handler: F) -> Self
    where
        L: Location,
        F: Fn(Arc<ApplicationCall>, L) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        self.route(Method::DELETE, handler)
    }
}

impl Plugin for Routing {
    const NAME: &'static str = "Routing";

    fn install(self, application: &mut ApplicationBuilder) -> Result<(), ServerError> {
        for route in &self.routes {
            let info = (route.info)(application.locations())?;
            tracing::debug!(
                method = %route.method,
                pattern = %info.pattern,
                location = route.location,
                "Registered route"
            );
        }

        let routes: Arc<[Route]> = self.routes.into();
        application.intercept(&phases::CALL, move |ctx| {
            let routes = Arc::clone(&routes);
            Box::pin(async move {
                let call = Arc::clone(ctx.call());
                if call.is_handled() {
                    return ctx.proceed().await;
                }

                let mut rejected = None;
                for route in routes.iter().filter(|route| route.method == *call.method()) {
                    match (route.dispatch)(&call) {
                        Ok(Some(handler)) => {
                            handler.await?;
                            return ctx.proceed().await;
                        }
                        Ok(None) => {}
                        Err(error) => {
                            rejected.get_or_insert(error);
                        }
                    }
                }

                if let Some(error) = rejected {
                    return Err(ctx.fail(ServerError::BadRequest(error.to_string())));
                }
                ctx.proceed().await
            })
        })
    }
}
