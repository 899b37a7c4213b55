//! Error and status responses.
//!
//! Exception handlers wrap everything after the Plugins phase: a failure
//! whose cause matches a handler becomes a regular response instead of an
//! unrecovered failure. Status handlers replace empty responses sent with a
//! registered status, including the 404 of the fallback.

use std::error::Error;
use std::sync::Arc;

use axum::http::StatusCode;

use crate::pipeline::PipelineError;
use crate::server::application::{ApplicationBuilder, Plugin};
use crate::content::OutgoingContent;
use crate::server::error::ServerError;
use crate::server::phases;

type ExceptionHandler = Arc<dyn Fn(&PipelineError) -> Option<(StatusCode, OutgoingContent)> + Send + Sync>;
type StatusHandler = Arc<dyn Fn(StatusCode) -> OutgoingContent + Send + Sync>;

#[derive(Default)]
pub struct StatusPages {
    exceptions: Vec<ExceptionHandler>,
    statuses: Vec<(StatusCode, StatusHandler)>,
}

impl StatusPages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle failures caused by an `E`. Earlier registrations win.
    pub fn exception<E, F>(mut self, handler: F) -> Self
    where
        E: Error + 'static,
        F: Fn(&E) -> (StatusCode, OutgoingContent) + Send + Sync + 'static,
    {
        self.exceptions
            .push(Arc::new(move |error: &PipelineError| error.downcast_ref::<E>().map(&handler)));
        self
    }

    /// Handle every failure not matched by a more specific handler.
    pub fn any_exception<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PipelineError) -> (StatusCode, OutgoingContent) + Send + Sync + 'static,
    {
        self.exceptions
            .push(Arc::new(move |error: &PipelineError| Some(handler(error))));
        self
    }

    /// Replace empty responses with `status` by the handler's content.
    pub fn status<F>(mut self, status: StatusCode, handler: F) -> Self
    where
        F: Fn(StatusCode) -> OutgoingContent + Send + Sync + 'static,
    {
        self.statuses.push((status, Arc::new(handler)));
        self
    }
}

impl Plugin for StatusPages {
    const NAME: &'static str = "StatusPages";

    fn install(self, application: &mut ApplicationBuilder) -> Result<(), ServerError> {
        let exceptions: Arc<[ExceptionHandler]> = self.exceptions.into();
        let statuses: Arc<[(StatusCode, StatusHandler)]> = self.statuses.into();

        if !exceptions.is_empty() {
            application.intercept(&phases::PLUGINS, move |ctx| {
                let exceptions = Arc::clone(&exceptions);
                Box::pin(async move {
                    let call = Arc::clone(ctx.call());
                    let error = match ctx.proceed().await {
                        Ok(()) => return Ok(()),
                        Err(error) if error.is_cancelled() || call.is_handled() => return Err(error),
                        Err(error) => error,
                    };

                    let Some((status, content)) = exceptions.iter().find_map(|handler| handler(&error)) else {
                        return Err(error);
                    };
                    tracing::debug!(status = status.as_u16(), error = %error, "Failure handled by status page");
                    call.set_status(status);
                    call.respond(content).await
                })
            })?;
        }

        if !statuses.is_empty() {
            application.send_pipeline().intercept(&phases::SEND_BEFORE, move |ctx| {
                let statuses = Arc::clone(&statuses);
                Box::pin(async move {
                    if *ctx.subject() == OutgoingContent::Empty {
                        let status = ctx.call().status().unwrap_or(StatusCode::OK);
                        if let Some((_, handler)) = statuses.iter().find(|(code, _)| *code == status) {
                            ctx.set_subject(handler(status));
                        }
                    }
                    ctx.proceed().await
                })
            })?;
        }

        Ok(())
    }
}
