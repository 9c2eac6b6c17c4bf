#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use serde_json::Value;
use tally_server::app;
use tally_server::config::ServerConfig;
use tally_server::persistence::Persistence;
use tally_server::state::AppState;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

impl TestContext {
    pub fn snapshot_path(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("metrics-db.json")
    }

    pub fn sqlite_dsn(&self) -> String {
        sqlite_dsn(&self.temp_dir)
    }
}

pub fn sqlite_dsn(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("tally.db").display())
}

/// Memory-only server.
pub async fn build_test_context() -> Result<TestContext> {
    build_test_context_with(|config, _| {
        config.file_storage_path = String::new();
    })
    .await
}

/// Server whose config is adjusted by `configure`; the file path defaults to
/// a snapshot file inside the temp dir.
pub async fn build_test_context_with(
    configure: impl FnOnce(&mut ServerConfig, &TempDir),
) -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let mut config = ServerConfig {
        file_storage_path: temp_dir
            .path()
            .join("metrics-db.json")
            .to_string_lossy()
            .to_string(),
        ..ServerConfig::default()
    };
    configure(&mut config, &temp_dir);
    config.validate()?;

    let persistence = Persistence::from_config(&config).await?;
    let restore = config.restore;
    let state = AppState::new(config, persistence);
    if restore {
        state.persistence.restore(&state.store).await?;
    }
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

pub async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    (status, headers, bytes)
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let req_body = body.map(|b| b.to_string()).unwrap_or_default();
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(req_body))
        .expect("request should build");

    let (status, _, bytes) = send(app, req).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, json)
}

pub async fn request_text(app: &axum::Router, method: &str, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let (status, _, bytes) = send(app, req).await;
    (status, String::from_utf8_lossy(&bytes).to_string())
}

pub fn assert_err_envelope(body: &Value, code: i64) {
    assert_eq!(body["err_code"], code, "unexpected envelope: {body}");
    assert!(body["err_msg"].is_string());
    assert!(body["trace_id"].as_str().is_some_and(|t| !t.is_empty()));
}
