//! Relay integration tests: a real listener in front of a recording upstream.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use forge2view::relay::{self, RelayConfig, JOB_ROUTE};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Answers every job with a fixed status and body and records what it saw.
struct Upstream {
    status: StatusCode,
    body: &'static str,
    seen: Mutex<Vec<(String, Bytes)>>,
}

async fn upstream_job(State(u): State<Arc<Upstream>>, headers: HeaderMap, body: Bytes) -> Response {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    u.seen.lock().unwrap().push((auth, body));
    (u.status, [(CONTENT_TYPE, "application/json; charset=utf-8")], u.body).into_response()
}

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn start(status: StatusCode, body: &'static str) -> (Arc<Upstream>, String) {
    let upstream = Arc::new(Upstream {
        status,
        body,
        seen: Mutex::new(Vec::new()),
    });
    let upstream_url = spawn(
        Router::new()
            .route("/modelderivative/v2/designdata/job", post(upstream_job))
            .with_state(upstream.clone()),
    )
    .await;

    let relay_url = spawn(
        relay::router(&RelayConfig {
            upstream_job_url: format!("{upstream_url}/modelderivative/v2/designdata/job"),
            allowed_origins: Vec::new(),
            upstream_timeout_secs: 5,
        })
        .unwrap(),
    )
    .await;
    (upstream, relay_url)
}

const JOB: &str = r#"{"input":{"urn":"dXJuOmFkc2sub2JqZWN0czpvcy5vYmplY3Q6Yi9kcmF3aW5nLmR3Zw"},"output":{"formats":[{"type":"svf2","views":["2d","3d"]}]}}"#;

#[tokio::test]
async fn job_is_forwarded_unchanged() {
    let (upstream, relay_url) = start(
        StatusCode::OK,
        r#"{"result":"created","urn":"dXJu","acceptedJobs":{}}"#,
    )
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{relay_url}{JOB_ROUTE}"))
        .header(AUTHORIZATION, "Bearer tok-123")
        .header(CONTENT_TYPE, "application/json")
        .body(JOB)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get(CONTENT_TYPE).unwrap(),
        "application/json; charset=utf-8"
    );
    assert_eq!(
        resp.text().await.unwrap(),
        r#"{"result":"created","urn":"dXJu","acceptedJobs":{}}"#
    );

    let seen = upstream.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "Bearer tok-123");
    assert_eq!(&seen[0].1[..], JOB.as_bytes());
}

#[tokio::test]
async fn upstream_errors_pass_through_verbatim() {
    let body = r#"{"diagnostic":"Unsupported format"}"#;
    let (_, relay_url) = start(StatusCode::NOT_ACCEPTABLE, body).await;

    let resp = reqwest::Client::new()
        .post(format!("{relay_url}{JOB_ROUTE}"))
        .bearer_auth("tok-123")
        .body(JOB)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 406);
    assert_eq!(resp.text().await.unwrap(), body);
}

#[tokio::test]
async fn missing_token_is_not_forwarded() {
    let (upstream, relay_url) = start(StatusCode::OK, "{}").await;

    let resp = reqwest::Client::new()
        .post(format!("{relay_url}{JOB_ROUTE}"))
        .body(JOB)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(json["message"].is_string());
    assert!(upstream.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_upstream_is_500_with_message() {
    let relay_url = spawn(
        relay::router(&RelayConfig {
            upstream_job_url: "http://127.0.0.1:9/modelderivative/v2/designdata/job".into(),
            allowed_origins: Vec::new(),
            upstream_timeout_secs: 5,
        })
        .unwrap(),
    )
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{relay_url}{JOB_ROUTE}"))
        .bearer_auth("tok-123")
        .body(JOB)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(!json["message"].as_str().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn responses_carry_cors_headers() {
    let (_, relay_url) = start(StatusCode::OK, "{}").await;

    let resp = reqwest::Client::new()
        .post(format!("{relay_url}{JOB_ROUTE}"))
        .header("origin", "http://localhost:3000")
        .bearer_auth("tok-123")
        .body(JOB)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}
