//! Request ids.
//!
//! Accepts a well-formed incoming `x-request-id` or generates a UUID v4,
//! stores it on the call as [`RequestId`] and echoes it in the response.

use std::sync::Arc;

use axum::http::header::{HeaderName, HeaderValue};

use crate::server::application::{ApplicationBuilder, Plugin};
use crate::server::error::ServerError;
use crate::server::phases;

pub const X_REQUEST_ID: &str = "x-request-id";

const MAX_LENGTH: usize = 128;

/// Id of the current call, available via `call.extension::<RequestId>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

type Generator = Arc<dyn Fn() -> String + Send + Sync>;

pub struct CallId {
    header: HeaderName,
    accept_incoming: bool,
    generate: Generator,
}

impl CallId {
    pub fn new() -> Self {
        Self {
            header: HeaderName::from_static(X_REQUEST_ID),
            accept_incoming: true,
            generate: Arc::new(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }

    /// Ignore ids supplied by clients.
    pub fn always_generate(mut self) -> Self {
        self.accept_incoming = false;
        self
    }

    pub fn generator(mut self, generate: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.generate = Arc::new(generate);
        self
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

fn is_valid(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_LENGTH && id.bytes().all(|b| b.is_ascii_graphic())
}

impl Plugin for CallId {
    const NAME: &'static str = "CallId";

    fn install(self, application: &mut ApplicationBuilder) -> Result<(), ServerError> {
        let header = self.header;
        let accept_incoming = self.accept_incoming;
        let generate = self.generate;

        application.intercept(&phases::SETUP, move |ctx| {
            let header = header.clone();
            let generate = Arc::clone(&generate);
            Box::pin(async move {
                let call = Arc::clone(ctx.call());
                let id = call
                    .header(header.as_str())
                    .filter(|id| accept_incoming && is_valid(id))
                    .map(str::to_string)
                    .unwrap_or_else(|| generate());

                if let Ok(value) = HeaderValue::from_str(&id) {
                    call.set_header(header, value);
                }
                call.insert_extension(RequestId(id));
                ctx.proceed().await
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validation() {
        assert!(is_valid("abc-123"));
        assert!(!is_valid(""));
        assert!(!is_valid("has space"));
        assert!(!is_valid(&"x".repeat(MAX_LENGTH + 1)));
    }
}
