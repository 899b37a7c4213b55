//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use interlace::config::ServerConfig;
use interlace::lifecycle::Shutdown;
use interlace::routing::{FromParameterValues, Location, LocationError, Parameters, Root, ToParameterValues};
use interlace::server::{Application, HttpServer};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// `/users/{id}?tab=...`
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: u32,
    pub tab: Option<String>,
}

impl Location for User {
    const PATH: &'static str = "/users/{id}";
    const PARAMETERS: &'static [&'static str] = &["id", "tab"];
    type Parent = Root;

    fn to_parameters(&self, parameters: &mut Parameters) {
        parameters.append_all("id", self.id.to_values());
        parameters.append_all("tab", self.tab.to_values());
    }

    fn from_parameters(parameters: &Parameters) -> Result<Self, LocationError> {
        Ok(Self {
            id: u32::from_values("id", parameters.get_all("id"))?,
            tab: Option::from_values("tab", parameters.get_all("tab"))?,
        })
    }
}

/// `/files/{path...}`
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub path: Vec<String>,
}

impl Location for File {
    const PATH: &'static str = "/files/{path...}";
    const PARAMETERS: &'static [&'static str] = &["path"];
    type Parent = Root;

    fn to_parameters(&self, parameters: &mut Parameters) {
        parameters.append_all("path", self.path.to_values());
    }

    fn from_parameters(parameters: &Parameters) -> Result<Self, LocationError> {
        Ok(Self {
            path: Vec::from_values("path", parameters.get_all("path"))?,
        })
    }
}

/// A running server on an ephemeral local port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

/// Serve `application` on `127.0.0.1:0` with default configuration.
#[allow(dead_code)]
pub async fn spawn_server(application: Application) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(application, ServerConfig::default());
    let signal = shutdown.clone();
    let handle = tokio::spawn(async move {
        server.run(listener, &signal).await.unwrap();
    });

    TestServer { addr, shutdown, handle }
}
