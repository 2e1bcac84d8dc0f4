//! HTTP surface of the webhook service.
//!
//! Provides:
//! - `POST /webhook` - change events, answered with a [`WebhookResponse`]
//! - `POST /api/compatibility` - direct checks, answered with a [`CompatibilityResult`]

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::Instrument;

use crate::models::{ChangeEvent, CompatibilityRequest, CompatibilityResult, WebhookResponse};
use crate::webhook::WebhookPipeline;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Rejections at the HTTP boundary. Nothing has run when one is returned.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = match self {
            RequestError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            RequestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        };
        log::warn!("Rejected request: {}", self);

        (
            status,
            Json(json!({
                "success": false,
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}

/// Create the HTTP router.
pub fn create_router(pipeline: Arc<WebhookPipeline>) -> Router {
    let body_limit = usize::try_from(pipeline.settings().max_body_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route(
            "/webhook",
            post(webhook_handler).fallback(method_not_allowed),
        )
        .route(
            "/api/compatibility",
            post(compatibility_handler).fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(request_id))
        .with_state(pipeline)
}

async fn webhook_handler(
    State(pipeline): State<Arc<WebhookPipeline>>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, RequestError> {
    let event: ChangeEvent = parse_body(&body)?;
    Ok(Json(pipeline.handle_event(event).await))
}

async fn compatibility_handler(
    State(pipeline): State<Arc<WebhookPipeline>>,
    body: Bytes,
) -> Result<Json<CompatibilityResult>, RequestError> {
    let request: CompatibilityRequest = parse_body(&body)?;
    Ok(Json(pipeline.handle_request(request).await))
}

async fn method_not_allowed() -> RequestError {
    RequestError::MethodNotAllowed
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, RequestError> {
    Ok(serde_json::from_slice(body)?)
}

/// `YYYYMMDD-` followed by the first 8 hex digits of a v4 UUID.
pub fn generate_request_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%d"), &uuid[..8])
}

async fn request_id(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = tracing::info_span!("http.request", request_id = %id, %method, %path);

    async move {
        let started = Instant::now();
        log::info!("Request started: {} {}", method, path);

        let mut response = next.run(request).await;

        log::info!(
            "Request completed: {} {} -> {} in {:?}",
            method,
            path,
            response.status(),
            started.elapsed()
        );
        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::CompatibilityOrchestrator;
    use crate::config::{ConfigSchema, Settings};
    use crate::process::{CommandOutput, CommandRunner, CommandSpec};
    use assert_fs::prelude::*;
    use axum::body::Body;
    use axum::http::{header, Method};
    use std::path::Path;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Git succeeds; the checker reports `API_VERSION:v1`.
    #[derive(Default)]
    struct CountingRunner {
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl CommandRunner for CountingRunner {
        fn run(&self, command: &CommandSpec) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(command.clone());
            let stdout = if command.program == "git" {
                String::new()
            } else {
                "API_VERSION:v1\n".to_string()
            };
            Ok(CommandOutput {
                success: true,
                code: Some(0),
                stdout,
                stderr: String::new(),
            })
        }
    }

    fn router(working_dir: &Path, runner: Arc<CountingRunner>, max_body_bytes: u64) -> Router {
        let mut settings = Settings::default();
        for field in Settings::fields() {
            settings.assign(field.name, field.default).unwrap();
        }
        settings.working_dir = working_dir.to_string_lossy().into_owned();
        settings.github_token = "ghp_test".to_string();
        settings.repository = "org/charts".to_string();
        settings.checker_command = "checker".to_string();
        settings.checker_script = String::new();
        settings.max_body_bytes = max_body_bytes;

        let orchestrator = CompatibilityOrchestrator::new(&settings, runner);
        create_router(Arc::new(WebhookPipeline::new(
            Arc::new(settings),
            Arc::new(orchestrator),
        )))
    }

    fn post_json(uri: &str, body: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_get_webhook_is_405() {
        let temp = assert_fs::TempDir::new().unwrap();
        let response = router(temp.path(), Arc::default(), 1024)
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::GET)
                    .uri("/webhook")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json_body(response).await["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let temp = assert_fs::TempDir::new().unwrap();
        let runner = Arc::new(CountingRunner::default());
        let response = router(temp.path(), runner.clone(), 1024)
            .oneshot(post_json("/webhook", "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().starts_with("Invalid JSON payload"));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_readme_change_does_not_trigger() {
        let temp = assert_fs::TempDir::new().unwrap();
        let runner = Arc::new(CountingRunner::default());
        let response = router(temp.path(), runner.clone(), 1024)
            .oneshot(post_json(
                "/webhook",
                r#"{"event":"push","repository":"org/charts","branch":"main","files":["README.md"]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert!(json.get("compatibility_check").is_none());
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_values_change_triggers_check() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("org__charts/Chart.yaml")
            .write_str("version: 1.0.0\n")
            .unwrap();
        let runner = Arc::new(CountingRunner::default());

        let response = router(temp.path(), runner.clone(), 1024)
            .oneshot(post_json("/webhook", r#"{"files":["values.yaml"]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let check = &json["compatibility_check"];
        assert_eq!(check["success"], true, "{}", check);
        assert_eq!(check["chart_version"], "1.0.0");
        assert_eq!(check["api_versions"], json!(["v1"]));

        // fallback repository and default branch
        let calls = runner.calls.lock().unwrap();
        assert!(calls
            .iter()
            .any(|c| c.program == "git" && c.args == vec!["checkout", "main"]));
        let checker = calls.iter().find(|c| c.program == "checker").unwrap();
        assert_eq!(checker.args.last().map(String::as_str), Some("1.31"));
    }

    #[tokio::test]
    async fn test_compatibility_endpoint_returns_result() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("org__charts/Chart.yaml")
            .write_str("version: 1.0.0\n")
            .unwrap();
        let runner = Arc::new(CountingRunner::default());

        let response = router(temp.path(), runner.clone(), 1024)
            .oneshot(post_json(
                "/api/compatibility",
                r#"{"kubernetes_version":"1.30","force_update":true,"repository":"org/charts","branch":"main"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["new_chart_version"], "1.0.1");
        temp.child("org__charts/Chart.yaml").assert("version: 1.0.1\n");

        let calls = runner.calls.lock().unwrap();
        let checker = calls.iter().find(|c| c.program == "checker").unwrap();
        assert_eq!(checker.args.last().map(String::as_str), Some("1.30"));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let body = format!(r#"{{"files":["{}"]}}"#, "a".repeat(256));

        let response = router(temp.path(), Arc::default(), 64)
            .oneshot(post_json("/webhook", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_request_id_echoed_or_generated() {
        let temp = assert_fs::TempDir::new().unwrap();
        let app = router(temp.path(), Arc::default(), 1024);

        let mut request = post_json("/webhook", r#"{"files":[]}"#);
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc-123");

        let response = app
            .oneshot(post_json("/webhook", r#"{"files":[]}"#))
            .await
            .unwrap();
        let generated = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        let (date, suffix) = generated.split_once('-').unwrap();
        assert_eq!(date.len(), 8);
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
