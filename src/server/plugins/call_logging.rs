//! Per-call tracing span and completion log.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::server::application::{ApplicationBuilder, Plugin};
use crate::server::call::ApplicationCall;
use crate::server::error::ServerError;
use crate::server::phases;
use crate::server::plugins::call_id::RequestId;

type Filter = Arc<dyn Fn(&ApplicationCall) -> bool + Send + Sync>;

pub struct CallLogging {
    filter: Filter,
}

impl CallLogging {
    pub fn new() -> Self {
        Self {
            filter: Arc::new(|_| true),
        }
    }

    /// Only log calls for which `filter` returns true.
    pub fn filter(mut self, filter: impl Fn(&ApplicationCall) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }
}

impl Default for CallLogging {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for CallLogging {
    const NAME: &'static str = "CallLogging";

    fn install(self, application: &mut ApplicationBuilder) -> Result<(), ServerError> {
        let filter = self.filter;

        application.intercept(&phases::MONITORING, move |ctx| {
            let filter = Arc::clone(&filter);
            Box::pin(async move {
                let call = Arc::clone(ctx.call());
                if !filter(&call) {
                    return ctx.proceed().await;
                }

                let request_id = call.extension::<RequestId>().map(|RequestId(id)| id).unwrap_or_default();
                let span = tracing::info_span!(
                    "call",
                    method = %call.method(),
                    path = %call.path(),
                    request_id = %request_id,
                );
                let start = Instant::now();
                let result = ctx.proceed().instrument(span.clone()).await;
                let elapsed_ms = start.elapsed().as_millis() as u64;

                match &result {
                    Ok(()) => tracing::info!(
                        parent: &span,
                        status = call.status().map(|s| s.as_u16()).unwrap_or(404),
                        elapsed_ms,
                        "Call completed"
                    ),
                    Err(error) => tracing::warn!(parent: &span, error = %error, elapsed_ms, "Call failed"),
                }
                result
            })
        })
    }
}
