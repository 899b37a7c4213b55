//! Codec-driven request rendering and response decoding.
//!
//! # Data Flow
//! ```text
//! request Transform → `accept` set to every registered media type
//! request Render    → Value body encoded by the codec for `content-type`
//!                     (the first codec if unset)
//! response Transform → Raw body decoded by the codec for `content-type`
//! ```

use std::sync::Arc;

use axum::http::header::{self, HeaderValue};

use crate::client::client::{ClientPlugin, HttpClientBuilder};
use crate::client::error::ClientError;
use crate::client::phases;
use crate::codec::{Codec, JsonCodec};
use crate::content::{IncomingContent, OutgoingContent};

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

impl ClientPlugin for ContentNegotiation {
    const NAME: &'static str = "ContentNegotiation";

    fn install(self, client: &mut HttpClientBuilder) -> Result<(), ClientError> {
        let codecs: Arc<[Arc<dyn Codec>]> = self.codecs.into();
        let accept = codecs
            .iter()
            .map(|codec| codec.content_type())
            .collect::<Vec<_>>()
            .join(", ");
        let accept = HeaderValue::from_str(&accept).map_err(|_| ClientError::InvalidHeader(accept))?;

        client.request_pipeline().intercept(&phases::TRANSFORM, move |ctx| {
            let accept = accept.clone();
            Box::pin(async move {
                let headers = &mut ctx.subject_mut().headers;
                if !accept.is_empty() && !headers.contains_key(header::ACCEPT) {
                    headers.insert(header::ACCEPT, accept);
                }
                ctx.proceed().await
            })
        })?;

        let render = Arc::clone(&codecs);
        client.request_pipeline().intercept(&phases::RENDER, move |ctx| {
            let codecs = Arc::clone(&render);
            Box::pin(async move {
                let request = ctx.subject();
                let OutgoingContent::Value(value) = &request.body else {
                    return ctx.proceed().await;
                };
                let requested = request
                    .headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok());
                let codec = match requested {
                    Some(content_type) => codecs.iter().find(|codec| codec.accepts(content_type)),
                    None => codecs.first(),
                };
                let Some(codec) = codec else {
                    return ctx.proceed().await;
                };

                let body = match codec.encode(value) {
                    Ok(body) => body,
                    Err(e) => return Err(ctx.fail(ClientError::Codec(e))),
                };
                ctx.subject_mut().body = OutgoingContent::Bytes {
                    content_type: Some(codec.content_type().to_string()),
                    body,
                };
                ctx.proceed().await
            })
        })?;

        let decode = codecs;
        client.response_pipeline().intercept(&phases::RESPONSE_TRANSFORM, move |ctx| {
            let codecs = Arc::clone(&decode);
            Box::pin(async move {
                let response = ctx.subject();
                let IncomingContent::Raw(body) = &response.body else {
                    return ctx.proceed().await;
                };
                let Some(content_type) = response.header(header::CONTENT_TYPE.as_str()) else {
                    return ctx.proceed().await;
                };
                if body.is_empty() {
                    return ctx.proceed().await;
                }
                let Some(codec) = codecs.iter().find(|codec| codec.accepts(content_type)) else {
                    return ctx.proceed().await;
                };

                let value = match codec.decode(body) {
                    Ok(value) => value,
                    Err(e) => return Err(ctx.fail(ClientError::Codec(e))),
                };
                ctx.subject_mut().body = IncomingContent::Value(value);
                ctx.proceed().await
            })
        })?;

        Ok(())
    }
}
