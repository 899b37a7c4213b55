//! Defaults merged into every request: a base URL and headers.

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::HeaderMap;
use url::Url;

use crate::client::client::{ClientPlugin, HttpClientBuilder};
use crate::client::error::ClientError;
use crate::client::phases;

#[derive(Debug, Clone, Default)]
pub struct DefaultRequest {
    base_url: Option<Url>,
    headers: HeaderMap,
}

impl DefaultRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative request urls are joined onto `url`. Keep the trailing
    /// slash if the base has a path: `http://host/api/` + `notes`.
    pub fn base_url(mut self, url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(url).map_err(|e| ClientError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.base_url = Some(url);
        Ok(self)
    }

    /// Sent unless the request sets the header itself.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// `target` resolved against `base`; absolute targets pass through.
fn resolve(base: Option<&Url>, target: &str) -> Result<String, ClientError> {
    match Url::parse(target) {
        Ok(url) => Ok(url.into()),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(target).map(String::from).map_err(|e| ClientError::InvalidUrl {
                url: target.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(target.to_string()),
        },
        Err(e) => Err(ClientError::InvalidUrl {
            url: target.to_string(),
            reason: e.to_string(),
        }),
    }
}

impl ClientPlugin for DefaultRequest {
    const NAME: &'static str = "DefaultRequest";

    fn install(self, client: &mut HttpClientBuilder) -> Result<(), ClientError> {
        let defaults = std::sync::Arc::new(self);
        client.request_pipeline().intercept(&phases::BEFORE, move |ctx| {
            let defaults = std::sync::Arc::clone(&defaults);
            Box::pin(async move {
                let url = match resolve(defaults.base_url.as_ref(), &ctx.subject().url) {
                    Ok(url) => url,
                    Err(e) => return Err(ctx.fail(e)),
                };
                let request = ctx.subject_mut();
                request.url = url;
                for (name, value) in &defaults.headers {
                    if !request.headers.contains_key(name) {
                        request.headers.insert(name.clone(), value.clone());
                    }
                }
                ctx.proceed().await
            })
        })?;
        Ok(())
    }
}
