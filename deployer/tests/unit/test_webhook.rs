//! End-to-end tests of the HTTP surface

use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tower::ServiceExt;

use webhook_deployer::app::options::ServerOptions;
use webhook_deployer::authn::signature::{sign, SIGNATURE_HEADER};
use webhook_deployer::deploy::executor::ComposeCommand;
use webhook_deployer::server::serve::{router, serve};

use crate::support::{app, state, FakeCompose, SECRET};

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post_webhook(app: &Router, body: &str, signature: Option<String>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

async fn post_signed(app: &Router, body: &str) -> (StatusCode, Value) {
    post_webhook(app, body, sign(SECRET.as_bytes(), body.as_bytes())).await
}

fn read_descriptor(root: &Path, repo: &str) -> String {
    std::fs::read_to_string(root.join(repo).join("docker-compose.yml")).unwrap()
}

#[tokio::test]
async fn test_deploys_new_repository() {
    let root = tempfile::tempdir().unwrap();
    let compose = FakeCompose::new(0, 0);
    let app = app(root.path(), compose.command(), SECRET);

    let (status, body) = post_signed(&app, r#"{"repo":"acme/widgets","tag":"v1.2.3"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "success", "repo": "acme/widgets", "tag": "v1.2.3"})
    );
    let descriptor = read_descriptor(root.path(), "acme/widgets");
    assert!(descriptor.contains("image: registry/acme/widgets:v1.2.3"));
    assert!(descriptor.contains("\"2001:5000\""));
    assert_eq!(compose.calls().len(), 2);
}

#[tokio::test]
async fn test_invalid_signature_touches_nothing() {
    let root = tempfile::tempdir().unwrap();
    let compose = FakeCompose::new(0, 0);
    let app = app(root.path(), compose.command(), SECRET);
    let body = r#"{"repo":"acme/widgets","tag":"v1.2.3"}"#;

    let (status, response) = post_webhook(&app, body, sign(b"wrong-secret", body.as_bytes())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response, json!({"error": "Invalid signature"}));

    let (status, _) = post_webhook(&app, body, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(!root.path().join("acme").exists());
    assert!(compose.calls().is_empty());
}

#[tokio::test]
async fn test_empty_secret_rejects_everything() {
    let root = tempfile::tempdir().unwrap();
    let compose = FakeCompose::new(0, 0);
    let app = app(root.path(), compose.command(), "");
    let body = r#"{"repo":"acme/widgets","tag":"v1"}"#;

    let (status, _) = post_webhook(&app, body, sign(SECRET.as_bytes(), body.as_bytes())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = post_webhook(&app, body, Some("sha256=".to_string())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(compose.calls().is_empty());
}

#[tokio::test]
async fn test_payload_validation_errors() {
    let root = tempfile::tempdir().unwrap();
    let compose = FakeCompose::new(0, 0);
    let app = app(root.path(), compose.command(), SECRET);

    let cases = [
        ("", "Empty payload"),
        ("{oops", "Invalid JSON"),
        (r#"{"repo":"acme","tag":"v1"}"#, "Invalid repo format"),
        (r#"{"repo":"acme/widgets/extra","tag":"v1"}"#, "Invalid repo format"),
        (r#"{"repo":"acme/widgets"}"#, "Tag is required"),
        (r#"{"repo":"acme/widgets","tag":"v1 bad"}"#, "Invalid tag format"),
        (
            r#"{"repo":"acme/widgets","tag":"v1","compose_b64":"not base64!"}"#,
            "Invalid compose_b64",
        ),
    ];
    for (body, reason) in cases {
        let (status, response) = post_signed(&app, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response, json!({"error": reason}), "{body}");
    }

    assert!(!root.path().join("acme").exists());
    assert!(compose.calls().is_empty());
}

#[tokio::test]
async fn test_pull_failure_skips_start() {
    let root = tempfile::tempdir().unwrap();
    let compose = FakeCompose::new(1, 0);
    let app = app(root.path(), compose.command(), SECRET);

    let (status, body) = post_signed(&app, r#"{"repo":"acme/widgets","tag":"v1"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Pull failed");
    assert_eq!(body["stdout"], "pulling images\n");
    assert_eq!(body["stderr"], "pull diagnostics\n");

    let calls = compose.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].ends_with(" pull"));
}

#[tokio::test]
async fn test_start_failure_reports_output() {
    let root = tempfile::tempdir().unwrap();
    let compose = FakeCompose::new(0, 2);
    let app = app(root.path(), compose.command(), SECRET);

    let (status, body) = post_signed(&app, r#"{"repo":"acme/widgets","tag":"v1"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Start failed");
    assert_eq!(body["stderr"], "up diagnostics\n");
}

#[tokio::test]
async fn test_pull_timeout_reports_phase() {
    let root = tempfile::tempdir().unwrap();
    let compose = FakeCompose::hanging();
    let app = router(state(
        root.path(),
        compose.command(),
        SECRET,
        Duration::from_millis(200),
    ));

    let (status, body) = post_signed(&app, r#"{"repo":"acme/widgets","tag":"v1"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Pull timed out"}));
    assert_eq!(compose.calls().len(), 1);
}

#[tokio::test]
async fn test_missing_compose_binary() {
    let root = tempfile::tempdir().unwrap();
    let command = ComposeCommand::new("/nonexistent/compose-binary", Vec::new());
    let app = app(root.path(), command, SECRET);

    let (status, body) = post_signed(&app, r#"{"repo":"acme/widgets","tag":"v1"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Failed to launch compose"}));
}

#[tokio::test]
async fn test_deployment_outlives_client_disconnect() {
    let root = tempfile::tempdir().unwrap();
    let compose = FakeCompose::slow_pull();
    let options = ServerOptions {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let state = state(root.path(), compose.command(), SECRET, Duration::from_secs(5));
    let (addr, server) = serve(&options, state, std::future::pending())
        .await
        .unwrap();

    let body = r#"{"repo":"acme/widgets","tag":"v1"}"#;
    let signature = sign(SECRET.as_bytes(), body.as_bytes()).unwrap();
    let request = format!(
        "POST /webhook HTTP/1.1\r\nhost: {addr}\r\ncontent-type: application/json\r\n\
         {SIGNATURE_HEADER}: {signature}\r\ncontent-length: {}\r\n\r\n{body}",
        body.len()
    );
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    // Hang up while pull is still running
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(stream);

    let mut calls = compose.calls();
    for _ in 0..50 {
        if calls.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        calls = compose.calls();
    }
    assert_eq!(calls.len(), 2, "{calls:?}");
    assert!(calls[0].ends_with(" pull"));
    assert!(calls[1].ends_with(" up -d --remove-orphans"));
    server.abort();
}

#[tokio::test]
async fn test_new_repository_under_existing_owner() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("acme/widgets")).unwrap();
    std::fs::create_dir_all(root.path().join("globex")).unwrap();
    let compose = FakeCompose::new(0, 0);
    let app = app(root.path(), compose.command(), SECRET);

    let (status, _) = post_signed(&app, r#"{"repo":"acme/gadgets","tag":"v1"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert!(read_descriptor(root.path(), "acme/gadgets").contains("\"2002:5000\""));
}

#[tokio::test]
async fn test_supplied_descriptor_is_written_verbatim() {
    let root = tempfile::tempdir().unwrap();
    let compose = FakeCompose::new(0, 0);
    let app = app(root.path(), compose.command(), SECRET);

    // "services:\n  web:\n    image: nginx\n"
    let body = r#"{"repo":"acme/site","tag":"v1","compose_b64":"c2VydmljZXM6CiAgd2ViOgogICAgaW1hZ2U6IG5naW54Cg=="}"#;
    let (status, _) = post_signed(&app, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        read_descriptor(root.path(), "acme/site"),
        "services:\n  web:\n    image: nginx\n"
    );
}

#[tokio::test]
async fn test_health_and_version() {
    let root = tempfile::tempdir().unwrap();
    let compose = FakeCompose::new(0, 0);
    let app = app(root.path(), compose.command(), SECRET);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "webhook-deployer");

    let request = Request::builder().uri("/version").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
