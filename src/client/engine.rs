//! Engines that put finished requests on the wire.

use std::time::Duration;

use async_trait::async_trait;

use crate::client::error::ClientError;
use crate::client::request::HttpRequestData;
use crate::client::response::HttpResponseData;
use crate::config::ClientConfig;

/// Executes one request. Implementations own connection management.
#[async_trait]
pub trait HttpClientEngine: Send + Sync + std::fmt::Debug {
    async fn execute(&self, request: HttpRequestData) -> Result<HttpResponseData, ClientError>;
}

/// Engine backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestEngine {
    client: reqwest::Client,
}

impl ReqwestEngine {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClientEngine for ReqwestEngine {
    async fn execute(&self, request: HttpRequestData) -> Result<HttpResponseData, ClientError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponseData { status, headers, body })
    }
}
