//! Webhook endpoint behavior with in-memory collaborators.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

use gitter_runner_core::fakes::{exit_result, HostCall, MemoryHost, ScriptedRunner, StaticConnector};
use gitter_runner_core::{
    messages, CommentId, DeliveryLedger, Dispatcher, DispatcherConfig, RunInvocation, RunResult,
    ToolRunner,
};
use gitter_runnerd::signature::sign;
use gitter_runnerd::{router, AppState};

const SECRET: &[u8] = b"webhook-s3cret";

struct TestApp {
    app: Router,
    host: Arc<MemoryHost>,
    runner: Arc<ScriptedRunner>,
    _staging: tempfile::TempDir,
}

fn build_router(
    connector: Arc<StaticConnector>,
    runner: Arc<dyn ToolRunner>,
    staging: &Path,
) -> Router {
    let dispatcher = Dispatcher::new(
        connector,
        runner,
        DispatcherConfig {
            staging_root: staging.to_path_buf(),
            ..DispatcherConfig::default()
        },
    );
    router(AppState::new(
        dispatcher,
        DeliveryLedger::new(Duration::from_secs(600)),
        SECRET,
    ))
}

fn test_app(host: MemoryHost) -> TestApp {
    let staging = tempfile::tempdir().unwrap();
    let host = Arc::new(host);
    let runner = Arc::new(ScriptedRunner::new());
    let app = build_router(
        Arc::new(StaticConnector::new(host.clone())),
        runner.clone(),
        staging.path(),
    );
    TestApp {
        app,
        host,
        runner,
        _staging: staging,
    }
}

/// Runner that reports when it starts and finishes only once released.
#[derive(Default)]
struct GatedRunner {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl ToolRunner for GatedRunner {
    async fn run(&self, _invocation: &RunInvocation) -> RunResult {
        self.started.notify_one();
        self.release.notified().await;
        exit_result(0)
    }
}

fn payload(action: &str) -> Vec<u8> {
    pull_request_payload(action, false)
}

fn pull_request_payload(action: &str, merged: bool) -> Vec<u8> {
    let merge_commit_sha = if merged { json!("m3rge") } else { Value::Null };
    serde_json::to_vec(&json!({
        "action": action,
        "number": 31,
        "pull_request": {
            "number": 31,
            "merged": merged,
            "merge_commit_sha": merge_commit_sha,
            "head": { "sha": "h3ad", "ref": "change/bump" },
        },
        "repository": { "name": "fleet-changes", "owner": { "login": "acme" } },
        "installation": { "id": 5 },
    }))
    .unwrap()
}

fn delivery(
    event: &str,
    delivery_id: &str,
    body: Vec<u8>,
    signature: Option<String>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("x-github-event", event)
        .header("x-github-delivery", delivery_id);
    if let Some(signature) = signature {
        builder = builder.header("x-hub-signature-256", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

fn signed(event: &str, delivery_id: &str, body: Vec<u8>) -> Request<Body> {
    let signature = sign(SECRET, &body).unwrap();
    delivery(event, delivery_id, body, Some(signature))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_reports_version() {
    let t = test_app(MemoryHost::new());
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_verified_delivery_acknowledged_with_action_and_number() {
    let t = test_app(
        MemoryHost::new()
            .with_file("script.sh", b"echo ok\n")
            .with_file("config.yaml", b"repo: [acme/a]\n"),
    );

    let (status, body) = send(&t.app, signed("pull_request", "d-1", payload("opened"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Received opened event for pull request 31");
    assert_eq!(t.runner.run_count(), 1);
    assert_eq!(t.host.comment_count(), 1);
    assert_eq!(
        t.host.comment_calls().last(),
        Some(&HostCall::UpdateComment {
            number: 31,
            comment_id: CommentId(1000),
            body: messages::DONE_VERIFYING.to_string(),
        })
    );
}

#[tokio::test]
async fn test_failed_processing_still_acknowledged() {
    let t = test_app(MemoryHost::new());

    let (status, body) = send(&t.app, signed("pull_request", "d-2", payload("reopened"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Received reopened event for pull request 31");
    assert_eq!(t.runner.run_count(), 0);
}

#[tokio::test]
async fn test_bad_signature_rejected_before_dispatch() {
    let t = test_app(MemoryHost::new());
    let forged = sign(b"someone-else", &payload("opened")).unwrap();

    let (missing, _) = send(&t.app, delivery("pull_request", "d-3", payload("opened"), None)).await;
    let (mismatch, body) = send(
        &t.app,
        delivery("pull_request", "d-4", payload("opened"), Some(forged)),
    )
    .await;

    assert_eq!(missing, StatusCode::UNAUTHORIZED);
    assert_eq!(mismatch, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid signature: signature does not match payload");
    assert!(t.host.calls().is_empty());
}

#[tokio::test]
async fn test_other_events_ignored() {
    let t = test_app(MemoryHost::new());
    let body = serde_json::to_vec(&json!({ "zen": "Keep it logically awesome." })).unwrap();

    let (status, reply) = send(&t.app, signed("ping", "d-5", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["message"], "Ignored ping event");
    assert!(t.host.calls().is_empty());
}

#[tokio::test]
async fn test_unhandled_action_acknowledged_without_comment() {
    let t = test_app(MemoryHost::new());

    let (status, body) = send(&t.app, signed("pull_request", "d-6", payload("labeled"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Received labeled event for pull request 31");
    assert!(t.host.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_payload_is_bad_request() {
    let t = test_app(MemoryHost::new());
    let body = serde_json::to_vec(&json!({ "action": "opened" })).unwrap();

    let (status, reply) = send(&t.app, signed("pull_request", "d-7", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply["message"]
        .as_str()
        .unwrap()
        .starts_with("malformed pull_request payload"));
}

#[tokio::test]
async fn test_redelivery_not_dispatched_twice() {
    let t = test_app(
        MemoryHost::new()
            .with_file("script.sh", b"echo ok\n")
            .with_file("config.yaml", b"repo: [acme/a]\n"),
    );

    let (_, first) = send(&t.app, signed("pull_request", "d-8", payload("synchronize"))).await;
    let (status, second) =
        send(&t.app, signed("pull_request", "d-8", payload("synchronize"))).await;

    assert_eq!(first["message"], "Received synchronize event for pull request 31");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["message"], "Ignored duplicate delivery d-8");
    assert_eq!(t.runner.run_count(), 1);
    assert_eq!(t.host.comment_count(), 1);
}

#[tokio::test]
async fn test_aborted_delivery_can_be_redelivered() {
    let staging = tempfile::tempdir().unwrap();
    let connector = Arc::new(StaticConnector::failing(502));
    let runner = Arc::new(ScriptedRunner::new());
    let app = build_router(connector.clone(), runner.clone(), staging.path());

    let (_, first) = send(&app, signed("pull_request", "d-9", payload("opened"))).await;
    let (status, second) = send(&app, signed("pull_request", "d-9", payload("opened"))).await;

    assert_eq!(first["message"], "Received opened event for pull request 31");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["message"], "Received opened event for pull request 31");
    assert_eq!(connector.installations(), vec![5, 5]);
    assert_eq!(runner.run_count(), 0);
}

#[tokio::test]
async fn test_merged_run_survives_dropped_connection() {
    let staging = tempfile::tempdir().unwrap();
    let host = Arc::new(
        MemoryHost::new()
            .with_file("script.sh", b"echo ok\n")
            .with_file("config.yaml", b"repo: [acme/a]\n"),
    );
    let runner = Arc::new(GatedRunner::default());
    let app = build_router(
        Arc::new(StaticConnector::new(host.clone())),
        runner.clone(),
        staging.path(),
    );

    // Drop the request future as soon as the tool is running, like a
    // webhook sender timing out.
    let request = signed("pull_request", "d-10", pull_request_payload("closed", true));
    tokio::select! {
        _ = app.clone().oneshot(request) => panic!("request finished before the run started"),
        _ = runner.started.notified() => {}
    }
    runner.release.notify_one();

    let done = HostCall::UpdateComment {
        number: 31,
        comment_id: CommentId(1000),
        body: messages::DONE_RUNNING.to_string(),
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while host.comment_calls().last() != Some(&done) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run did not finish after the connection was dropped");
    assert_eq!(host.comment_count(), 1);
}
