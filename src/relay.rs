//! Job relay: a CORS-enabled pass-through to the derivative job endpoint.
//!
//! Browsers cannot call the derivative service directly (no CORS headers on
//! its side), so the client posts jobs here and the relay forwards them:
//!
//! ```text
//! POST /proxy/modelderivative/job
//!   Authorization: Bearer <token>    ──▶  POST {upstream_job_url}
//!   <job JSON, untouched>                   same Authorization, same body
//!                                    ◀──  upstream status + body, verbatim
//! ```
//!
//! The relay never parses the payload. Upstream errors pass through with
//! their own status and body; a failure to reach upstream at all becomes
//! `500 {"message": "..."}`. Requests without a bearer token are answered
//! `401` and never forwarded. CORS is permissive unless
//! [`RelayConfig::allowed_origins`] lists specific origins.

use crate::config::DEFAULT_API_URL;
use crate::error::ForgeError;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Route the client posts jobs to.
pub const JOB_ROUTE: &str = "/proxy/modelderivative/job";

/// Relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Where jobs are forwarded. Default: the production job endpoint.
    pub upstream_job_url: String,
    /// Origins allowed by CORS. Empty = any origin.
    pub allowed_origins: Vec<String>,
    /// Timeout for the upstream call in seconds. Default: 60.
    pub upstream_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_job_url: format!("{DEFAULT_API_URL}/modelderivative/v2/designdata/job"),
            allowed_origins: Vec::new(),
            upstream_timeout_secs: 60,
        }
    }
}

#[derive(Clone)]
struct RelayState {
    client: reqwest::Client,
    upstream_job_url: Arc<str>,
}

/// Build the relay router.
///
/// # Errors
/// [`ForgeError::Configuration`] if an allowed origin is not a valid header
/// value or the upstream URL does not parse.
pub fn router(config: &RelayConfig) -> Result<Router, ForgeError> {
    if reqwest::Url::parse(&config.upstream_job_url).is_err() {
        return Err(ForgeError::Configuration(format!(
            "upstream_job_url is not a valid URL: '{}'",
            config.upstream_job_url
        )));
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream_timeout_secs.max(1)))
        .build()
        .map_err(|e| ForgeError::Internal(format!("Failed to build HTTP client: {e}")))?;

    let state = RelayState {
        client,
        upstream_job_url: Arc::from(config.upstream_job_url.as_str()),
    };

    Ok(Router::new()
        .route(JOB_ROUTE, post(forward_job))
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.allowed_origins)?),
        )
        .with_state(state))
}

/// Serve the relay on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener, config: RelayConfig) -> Result<(), ForgeError> {
    let app = router(&config)?;
    match listener.local_addr() {
        Ok(addr) => info!(
            "Relay listening on http://{} → {}",
            addr, config.upstream_job_url
        ),
        Err(e) => warn!("Relay listening on unknown address: {}", e),
    }
    axum::serve(listener, app)
        .await
        .map_err(|e| ForgeError::Internal(format!("Relay server error: {e}")))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, ForgeError> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let list = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|_| ForgeError::Configuration(format!("Invalid CORS origin: '{o}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(list))
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

/// The `Authorization` header, if it carries a non-empty bearer token.
fn bearer_header(headers: &HeaderMap) -> Option<HeaderValue> {
    let value = headers.get(AUTHORIZATION)?;
    let text = value.to_str().ok()?;
    let (scheme, token) = text.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(value.clone())
}

async fn forward_job(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(authorization) = bearer_header(&headers) else {
        debug!("Rejected job without bearer token");
        return message(
            StatusCode::UNAUTHORIZED,
            "Missing or malformed Authorization header; expected 'Bearer <token>'",
        );
    };

    debug!(
        "Forwarding job ({} bytes) to {}",
        body.len(),
        state.upstream_job_url
    );

    let upstream = state
        .client
        .post(&*state.upstream_job_url)
        .header(AUTHORIZATION, authorization)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await;

    match upstream {
        Ok(response) => pass_through(response).await,
        Err(e) => {
            warn!("Upstream job endpoint unreachable: {}", e);
            message(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// Copy upstream status, content type and body into our response.
async fn pass_through(response: reqwest::Response) -> Response {
    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response.headers().get(CONTENT_TYPE).cloned();

    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            warn!("Failed to read upstream body: {}", e);
            return message(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    debug!("Upstream answered {} ({} bytes)", status, bytes.len());
    let mut out = (status, bytes).into_response();
    match content_type {
        Some(ct) => {
            out.headers_mut().insert(CONTENT_TYPE, ct);
        }
        None => {
            out.headers_mut().remove(CONTENT_TYPE);
        }
    }
    out
}

fn message(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "message": msg }))).into_response()
}

async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn unreachable_config() -> RelayConfig {
        RelayConfig {
            upstream_job_url: "http://127.0.0.1:9/modelderivative/v2/designdata/job".into(),
            allowed_origins: Vec::new(),
            upstream_timeout_secs: 5,
        }
    }

    fn job_request(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(JOB_ROUTE)
            .header(CONTENT_TYPE, "application/json");
        if let Some(a) = auth {
            builder = builder.header(AUTHORIZATION, a);
        }
        builder
            .body(Body::from(r#"{"input":{"urn":"dXJu"}}"#))
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn bearer_header_parsing() {
        let mut h = HeaderMap::new();
        assert!(bearer_header(&h).is_none());
        h.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_header(&h).unwrap(), "Bearer abc.def");
        h.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert!(bearer_header(&h).is_some());
        h.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_header(&h).is_none());
        h.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_header(&h).is_none());
    }

    #[tokio::test]
    async fn missing_token_is_rejected_without_forwarding() {
        let app = router(&unreachable_config()).unwrap();
        let resp = app.oneshot(job_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(body_json(resp).await["message"].is_string());
    }

    #[tokio::test]
    async fn unreachable_upstream_is_500_with_message() {
        let app = router(&unreachable_config()).unwrap();
        let resp = app
            .oneshot(job_request(Some("Bearer tok")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert!(!json["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn permissive_cors_allows_any_origin() {
        let app = router(&unreachable_config()).unwrap();
        let req = Request::builder()
            .method("OPTIONS")
            .uri(JOB_ROUTE)
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn restricted_cors_ignores_unknown_origin() {
        let config = RelayConfig {
            allowed_origins: vec!["http://app.example".into()],
            ..unreachable_config()
        };
        let app = router(&config).unwrap();
        let req = Request::builder()
            .method("OPTIONS")
            .uri(JOB_ROUTE)
            .header("origin", "http://evil.example")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert!(resp.headers().get("access-control-allow-origin").is_none());

        let req = Request::builder()
            .method("OPTIONS")
            .uri(JOB_ROUTE)
            .header("origin", "http://app.example")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "http://app.example"
        );
    }

    #[test]
    fn invalid_origin_is_configuration_error() {
        let config = RelayConfig {
            allowed_origins: vec!["bad\norigin".into()],
            ..unreachable_config()
        };
        assert!(matches!(
            router(&config).unwrap_err(),
            ForgeError::Configuration(_)
        ));
    }

    #[tokio::test]
    async fn health_route_answers() {
        let app = router(&unreachable_config()).unwrap();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
