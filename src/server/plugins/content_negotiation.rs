//! Codec-driven rendering of responses and decoding of requests.
//!
//! # Data Flow
//! ```text
//! respond(Value)  → send Render phase → codec chosen by `accept` → Bytes
//! receive::<T>()  → receive Transform phase → codec chosen by `content-type` → Value
//! ```

use std::sync::Arc;

use axum::http::header;

use crate::codec::{Codec, JsonCodec};
use crate::pipeline::PipelineError;
use crate::server::application::{ApplicationBuilder, Plugin};
use crate::content::{IncomingContent, OutgoingContent};
use crate::server::error::ServerError;
use crate::server::phases;

#[derive(Debug, Default)]
pub struct ContentNegotiation {
    codecs: Vec<Arc<dyn Codec>>,
}

impl ContentNegotiation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(self) -> Self {
        self.register(JsonCodec)
    }

    pub fn register(mut self, codec: impl Codec + 'static) -> Self {
        self.codecs.push(Arc::new(codec));
        self
    }
}

/// True if an `accept` header admits `content_type`. Quality values are
/// ignored; a missing header accepts anything.
pub(crate) fn accepts(accept: Option<&str>, content_type: &str) -> bool {
    let Some(accept) = accept else {
        return true;
    };
    let (kind, _) = content_type.split_once('/').unwrap_or((content_type, ""));
    accept
        .split(',')
        .filter_map(|range| range.split(';').next())
        .map(str::trim)
        .any(|range| {
            range == "*/*"
                || range.eq_ignore_ascii_case(content_type)
                || range
                    .strip_suffix("/*")
                    .map(|prefix| prefix.eq_ignore_ascii_case(kind))
                    .unwrap_or(false)
        })
}

impl Plugin for ContentNegotiation {
    const NAME: &'static str = "ContentNegotiation";

    fn install(self, application: &mut ApplicationBuilder) -> Result<(), ServerError> {
        let codecs: Arc<[Arc<dyn Codec>]> = self.codecs.into();

        let render = Arc::clone(&codecs);
        application.send_pipeline().intercept(&phases::SEND_RENDER, move |ctx| {
            let codecs = Arc::clone(&render);
            Box::pin(async move {
                let OutgoingContent::Value(value) = ctx.subject() else {
                    return ctx.proceed().await;
                };

                let accept = ctx.call().header(header::ACCEPT.as_str());
                let Some(codec) = codecs.iter().find(|codec| accepts(accept, codec.content_type())) else {
                    let accept = accept.unwrap_or_default().to_string();
                    return Err(ctx.fail(ServerError::NotAcceptable(accept)));
                };

                let body = codec.encode(value).map_err(|e| PipelineError::failed(ServerError::Codec(e)))?;
                let content_type = Some(codec.content_type().to_string());
                ctx.proceed_with(OutgoingContent::Bytes { content_type, body }).await
            })
        })?;

        let decode = codecs;
        application.receive_pipeline().intercept(&phases::RECEIVE_TRANSFORM, move |ctx| {
            let codecs = Arc::clone(&decode);
            Box::pin(async move {
                let IncomingContent::Raw(body) = ctx.subject() else {
                    return ctx.proceed().await;
                };
                let Some(content_type) = ctx.call().header(header::CONTENT_TYPE.as_str()) else {
                    return ctx.proceed().await;
                };
                let Some(codec) = codecs.iter().find(|codec| codec.accepts(content_type)) else {
                    return ctx.proceed().await;
                };

                let value = codec.decode(body).map_err(|e| PipelineError::failed(ServerError::Codec(e)))?;
                ctx.proceed_with(IncomingContent::Value(value)).await
            })
        })?;

        Ok(())
    }
}
