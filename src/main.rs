//! Interlace demo server.
//!
//! ```text
//! interlace [config.toml]
//!
//! GET  /hello/{name?}   greeting from `[properties] app.greeting`
//! POST /notes           store a JSON note, 201 + location header
//! GET  /notes/{id}      fetch a note
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use interlace::config::{load_config, ServerConfig};
use interlace::lifecycle::{signals, startup, Shutdown};
use interlace::pipeline::PipelineError;
use interlace::routing::{FromParameterValues, Location, LocationError, Parameters, Root, ToParameterValues};
use interlace::server::plugins::{CallId, CallLogging, ContentNegotiation, Routing, StatusPages};
use interlace::server::{Application, ApplicationBuilder, ApplicationCall, OutgoingContent, ServerError};

struct Hello {
    name: Option<String>,
}

impl Location for Hello {
    const PATH: &'static str = "/hello/{name?}";
    const PARAMETERS: &'static [&'static str] = &["name"];
    type Parent = Root;

    fn to_parameters(&self, parameters: &mut Parameters) {
        parameters.append_all("name", self.name.to_values());
    }

    fn from_parameters(parameters: &Parameters) -> Result<Self, LocationError> {
        Ok(Self {
            name: Option::from_values("name", parameters.get_all("name"))?,
        })
    }
}

struct Notes;

impl Location for Notes {
    const PATH: &'static str = "/notes";
    type Parent = Root;

    fn to_parameters(&self, _parameters: &mut Parameters) {}

    fn from_parameters(_parameters: &Parameters) -> Result<Self, LocationError> {
        Ok(Notes)
    }
}

struct NoteById {
    id: u64,
}

impl Location for NoteById {
    const PATH: &'static str = "/{id}";
    const PARAMETERS: &'static [&'static str] = &["id"];
    type Parent = Notes;

    fn to_parameters(&self, parameters: &mut Parameters) {
        parameters.append_all("id", self.id.to_values());
    }

    fn from_parameters(parameters: &Parameters) -> Result<Self, LocationError> {
        Ok(Self {
            id: u64::from_values("id", parameters.get_all("id"))?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    title: String,
    body: String,
}

#[derive(Debug, Default)]
struct NoteStore {
    notes: DashMap<u64, Note>,
    next_id: AtomicU64,
}

async fn store(call: &ApplicationCall) -> Result<Arc<NoteStore>, PipelineError> {
    call.resolve::<NoteStore>().await.map_err(PipelineError::failed)
}

fn application(config: &ServerConfig) -> Result<Application, ServerError> {
    let builder = ApplicationBuilder::from_config(config);
    builder.dependencies().provide_value(NoteStore::default())?;
    builder.dependencies().require::<NoteStore>();

    let routing = Routing::new()
        .get(|call: Arc<ApplicationCall>, hello: Hello| async move {
            let greeting = call
                .dependencies()
                .resolver()
                .property::<String>("app.greeting")
                .await
                .unwrap_or_else(|_| "Hello".to_string());
            let name = hello.name.unwrap_or_else(|| "world".to_string());
            call.respond(format!("{greeting}, {name}!")).await
        })
        .post(|call: Arc<ApplicationCall>, _: Notes| async move {
            let note: Note = call.receive().await?;
            let store = store(&call).await?;
            let id = store.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            store.notes.insert(id, note.clone());

            let href = call.href(&NoteById { id }).map_err(PipelineError::failed)?;
            if let Ok(location) = HeaderValue::from_str(&href) {
                call.set_header(header::LOCATION, location);
            }
            call.set_status(StatusCode::CREATED);
            call.respond_value(&note).await
        })
        .get(|call: Arc<ApplicationCall>, location: NoteById| async move {
            let store = store(&call).await?;
            let note = store.notes.get(&location.id).map(|entry| entry.value().clone());
            match note {
                Some(note) => call.respond_value(&note).await,
                None => Err(PipelineError::failed(ServerError::NotFound(format!("note {}", location.id)))),
            }
        });

    builder
        .install(CallId::new())?
        .install(CallLogging::new())?
        .install(ContentNegotiation::new().json())?
        .install(
            StatusPages::new()
                .exception::<ServerError, _>(|error| (error.status(), OutgoingContent::from(error.to_string())))
                .status(StatusCode::NOT_FOUND, |status| OutgoingContent::from(status.to_string())),
        )?
        .install(routing)?
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => ServerConfig::default(),
    };
    startup::init_observability(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "interlace starting");

    let application = application(&config)?;

    let shutdown = Shutdown::new();
    tokio::spawn(signals::trigger_on_signal(shutdown.clone()));

    startup::serve(application, config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
