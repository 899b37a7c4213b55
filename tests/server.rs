//! Call handling through `Application::handle`, without a socket.

mod common;

use std::sync::Arc;

use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{File, User};
use interlace::pipeline::PipelineError;
use interlace::server::plugins::{CallId, ContentNegotiation, RequestId, Routing, StatusPages, X_REQUEST_ID};
use interlace::server::{
    Application, ApplicationBuilder, ApplicationCall, ApplicationRequest, OutgoingContent, ServerError,
};

fn build_request(method: Method, uri: &str) -> ApplicationRequest {
    ApplicationRequest::new(method, uri.parse().unwrap())
}

fn routing() -> Routing {
    Routing::new()
        .get(|call: Arc<ApplicationCall>, user: User| async move {
            let tab = user.tab.unwrap_or_else(|| "profile".to_string());
            call.respond(format!("user {} {tab}", user.id)).await
        })
        .post(|call: Arc<ApplicationCall>, user: User| async move {
            let mut body: Value = call.receive().await?;
            body["id"] = json!(user.id);
            call.respond_value(&body).await
        })
        .get(|call: Arc<ApplicationCall>, file: File| async move {
            if file.path.first().map(String::as_str) == Some("secret") {
                return Err(PipelineError::failed(ServerError::NotFound(file.path.join("/"))));
            }
            let href = call.href(&file).map_err(PipelineError::failed)?;
            call.respond(href).await
        })
}

fn application() -> Application {
    Application::builder()
        .install(CallId::new())
        .unwrap()
        .install(ContentNegotiation::new().json())
        .unwrap()
        .install(routing())
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_typed_route_with_query_parameter() {
    let response = application().handle(build_request(Method::GET, "/users/7?tab=posts")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "user 7 posts");
    assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));

    let response = application().handle(build_request(Method::GET, "/users/7")).await;
    assert_eq!(response.text(), "user 7 profile");
}

#[tokio::test]
async fn test_ellipsis_route_renders_its_own_href() {
    let response = application().handle(build_request(Method::GET, "/files/a/b/c")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "/files/a/b/c");
}

#[tokio::test]
async fn test_unmatched_call_is_not_found() {
    let application = application();

    let response = application.handle(build_request(Method::GET, "/nowhere")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body.is_empty());

    // Known location, unregistered method.
    let response = application.handle(build_request(Method::DELETE, "/users/7")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unconvertible_parameter_is_bad_request() {
    let response = application().handle(build_request(Method::GET, "/users/seven")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_handler_failure_maps_to_its_status() {
    let response = application().handle(build_request(Method::GET, "/files/secret/key")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_json_receive_and_respond() {
    let request = build_request(Method::POST, "/users/3")
        .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_body(r#"{"name":"ada"}"#);
    let response = application().handle(request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/json"));
    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, json!({"name": "ada", "id": 3}));
}

#[tokio::test]
async fn test_receive_without_content_type_is_unsupported() {
    let request = build_request(Method::POST, "/users/3").with_body(r#"{"name":"ada"}"#);
    let response = application().handle(request).await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_unacceptable_response_type() {
    let request = build_request(Method::POST, "/users/3")
        .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_header(header::ACCEPT, HeaderValue::from_static("text/html"))
        .with_body("{}");
    let response = application().handle(request).await;
    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_call_id_echoed_or_generated() {
    let application = application();

    let request = build_request(Method::GET, "/users/1").with_header(
        HeaderName::from_static(X_REQUEST_ID),
        HeaderValue::from_static("req-42"),
    );
    let response = application.handle(request).await;
    assert_eq!(response.header(X_REQUEST_ID), Some("req-42"));

    let response = application.handle(build_request(Method::GET, "/users/1")).await;
    let generated = response.header(X_REQUEST_ID).unwrap();
    assert!(!generated.is_empty());
    assert_ne!(generated, "req-42");
}

#[tokio::test]
async fn test_status_pages_recover_failures_and_fill_empty_statuses() {
    let application = Application::builder()
        .install(
            StatusPages::new()
                .exception::<ServerError, _>(|error| {
                    (StatusCode::IM_A_TEAPOT, OutgoingContent::from(format!("handled: {error}")))
                })
                .status(StatusCode::NOT_FOUND, |_| OutgoingContent::from("nothing here")),
        )
        .unwrap()
        .install(routing())
        .unwrap()
        .build()
        .unwrap();

    let response = application.handle(build_request(Method::GET, "/files/secret/key")).await;
    assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(response.text(), "handled: Resource not found: secret/key");

    let response = application.handle(build_request(Method::GET, "/nowhere")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.text(), "nothing here");
}

#[tokio::test]
async fn test_unrecovered_foreign_failure_is_internal_error() {
    let mut builder = ApplicationBuilder::new();
    builder
        .intercept(&interlace::server::phases::CALL, |ctx| {
            Box::pin(async move { Err(ctx.fail(std::io::Error::other("disk"))) })
        })
        .unwrap();
    let response = builder.build().unwrap().handle(build_request(Method::GET, "/")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_handlers_resolve_dependencies_and_extensions() {
    let builder = ApplicationBuilder::new();
    builder.dependencies().provide_value("from the graph".to_string()).unwrap();

    let application = builder
        .install(CallId::new().generator(|| "fixed".to_string()))
        .unwrap()
        .install(Routing::new().get(|call: Arc<ApplicationCall>, _: User| async move {
            let value = call.resolve::<String>().await.map_err(PipelineError::failed)?;
            let RequestId(id) = call.extension::<RequestId>().unwrap_or(RequestId(String::new()));
            call.respond(format!("{value} {id}")).await
        }))
        .unwrap()
        .build()
        .unwrap();

    let response = application.handle(build_request(Method::GET, "/users/1")).await;
    assert_eq!(response.text(), "from the graph fixed");
}

#[tokio::test]
async fn test_plugins_install_once() {
    let result = Application::builder()
        .install(CallId::new())
        .unwrap()
        .install(CallId::new());
    assert!(matches!(result, Err(ServerError::DuplicatePlugin("CallId"))));
}
