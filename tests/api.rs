//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use herald::api::{ApiServer, ApiState};
use herald::capabilities::{HomeAutomation, SpeechSink, TextGenerator};
use herald::config::ApiConfig;
use herald::control::RuntimeStatus;
use herald::{CommandPipeline, IntentRouter, RouterPipeline, SchedulerHandle, Subsystem};

mod common;
use common::{FakeHome, RecordingSink, ScriptedGenerator};

struct TestApp {
    state: ApiState,
    sink: Arc<RecordingSink>,
    home: Arc<FakeHome>,
}

impl TestApp {
    fn router(&self) -> axum::Router {
        herald::api::router(self.state.clone())
    }
}

/// Build a test API over a router that always classifies `classification`
fn build_test_app(classification: &str, scheduler: Option<SchedulerHandle>) -> TestApp {
    let sink = Arc::new(RecordingSink::default());
    let home = Arc::new(FakeHome::new().with_named("light.porch", "off", "Porch Light"));

    let router = IntentRouter::new(
        Arc::new(ScriptedGenerator::classifying(classification)) as Arc<dyn TextGenerator>,
        Some(Arc::clone(&home) as Arc<dyn HomeAutomation>),
        None,
    )
    .with_sink(Arc::clone(&sink) as Arc<dyn SpeechSink>);

    let status = Arc::new(RuntimeStatus::new(false));
    status.set_running(true);

    TestApp {
        state: ApiState {
            pipeline: Arc::new(RouterPipeline::new(Arc::new(router))) as Arc<dyn CommandPipeline>,
            scheduler,
            status,
        },
        sink,
        home,
    }
}

fn default_app() -> TestApp {
    build_test_app(
        r#"{"intent":"light_control","parameters":{"action":"on","device":"porch"}}"#,
        Some(SchedulerHandle::new()),
    )
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (status, json) = send(default_app().router(), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_banner_endpoint() {
    let (status, json) = send(default_app().router(), get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Herald voice assistant API");
}

#[tokio::test]
async fn test_status_endpoint() {
    let app = default_app();
    if let Some(scheduler) = &app.state.scheduler {
        scheduler.add("what time is it", "0 0 7 * * *").unwrap();
    }
    app.state.status.set_muted(true);

    let (status, json) = send(app.router(), get("/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "running");
    assert_eq!(json["voice_enabled"], false);
    assert_eq!(json["muted"], true);
    assert_eq!(json["scheduled_jobs"], 1);
}

#[tokio::test]
async fn test_command_runs_pipeline_and_speaks() {
    let app = default_app();

    let (status, json) = send(
        app.router(),
        post_json("/command", &json!({ "command": "turn on the porch light" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["response"], "Turned on Porch Light");
    assert_eq!(app.sink.spoken(), vec!["Turned on Porch Light".to_string()]);
    assert_eq!(app.home.calls().len(), 1);
}

#[tokio::test]
async fn test_command_directive_returns_acknowledgment() {
    let app = build_test_app(
        r#"{"intent":"system_control","parameters":{"action":"mute"}}"#,
        None,
    );

    let (status, json) = send(app.router(), post_json("/command", &json!({ "command": "mute" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["response"], "Muted");
}

#[tokio::test]
async fn test_empty_command_rejected() {
    let app = default_app();

    let (status, json) = send(app.router(), post_json("/command", &json!({ "command": "  " }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "bad_request");
    assert!(app.sink.spoken().is_empty());
}

#[tokio::test]
async fn test_malformed_command_body_rejected() {
    let (status, _) = send(
        default_app().router(),
        post_json("/command", &json!({ "text": "turn on the lights" })),
    )
    .await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_schedule_create_list_delete() {
    let app = default_app();

    let (status, created) = send(
        app.router(),
        post_json(
            "/schedule",
            &json!({ "command": "turn on the porch light", "cron": "0 30 19 * * *" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["command"], "turn on the porch light");
    assert_eq!(created["run_count"], 0);
    assert!(created["next_run"].is_string());
    let id = created["id"].as_str().unwrap().to_string();

    let (status, listed) = send(app.router(), get("/schedule")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());

    let (status, removed) = send(app.router(), delete(&format!("/schedule/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["success"], true);
    assert_eq!(removed["message"], format!("Removed task {id}"));

    let (status, json) = send(app.router(), delete(&format!("/schedule/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_schedule_rejects_bad_cron() {
    let app = default_app();

    let (status, json) = send(
        app.router(),
        post_json("/schedule", &json!({ "command": "lights on", "cron": "every day" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("invalid cron expression")
    );
}

#[tokio::test]
async fn test_schedule_without_scheduler_unavailable() {
    let app = build_test_app(r#"{"intent":"time","parameters":{}}"#, None);

    let (status, json) = send(app.router(), get("/schedule")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["message"], "task scheduler not available");

    let (status, _) = send(
        app.router(),
        post_json("/schedule", &json!({ "command": "x", "cron": "0 0 7 * * *" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn test_server_serves_and_stops() {
    let app = default_app();
    let config = ApiConfig {
        enabled: true,
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let server = ApiServer::new(&config, app.state.clone());

    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let body: Value = reqwest::blocking::get(format!("http://{addr}/health"))
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "ok");

    assert!(server.stop());
    assert!(server.local_addr().is_none());
    assert!(server.stop());
}

#[test]
fn test_server_start_fails_on_taken_port() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let config = ApiConfig {
        enabled: true,
        host: "127.0.0.1".to_string(),
        port: taken.local_addr().unwrap().port(),
    };
    let server = ApiServer::new(&config, default_app().state);

    assert!(server.start().is_err());
    assert!(server.stop());
}
