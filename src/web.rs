use crate::client::ClientState;
use crate::llm::{ChatModel, GroqClient, GroqConfig, ModelError};
use crate::proxy::{
    AnalyzeRequest, AnalyzeResponse, ErrorBody, Proxy, ProxyError, QuizRequest, QuizResponse,
    SummaryRequest, SummaryResponse,
};
use crate::render;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::{StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use include_dir::{Dir, include_dir};
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState = Arc<AppState>;
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

static STATIC_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

pub struct AppState {
    pub proxy: Proxy,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub environment: String,
    pub model: GroqConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            environment: "development".to_string(),
            model: GroqConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
    Model(ModelError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
            WebError::Model(err) => write!(f, "model client error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

impl From<ModelError> for WebError {
    fn from(value: ModelError) -> Self {
        WebError::Model(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let has_key = config.model.api_key.is_some();
    if !has_key {
        warn!("GROQ_API_KEY is not set; model calls will be rejected upstream");
    }
    let client = GroqClient::new(config.model.clone())?;
    info!(model = client.model(), "chat model configured");
    let model: Arc<dyn ChatModel> = Arc::new(client);
    let state = Arc::new(AppState {
        proxy: Proxy::new(model),
    });
    let router = build_router(state);
    info!(
        %config.addr,
        environment = %config.environment,
        api_key_configured = has_key,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: message.into(),
                details: None,
            },
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        let status = if err.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            body: err.to_body(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(shell_page))
        .route("/index.html", get(shell_page))
        .route("/api/analyze", post(api_analyze))
        .route("/api/quiz", post(api_quiz))
        .route("/api/summary", post(api_summary))
        .route("/api/health", get(health))
        .fallback(static_asset)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn api_analyze(
    State(state): State<SharedState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.proxy.analyze(request).await?))
}

async fn api_quiz(
    State(state): State<SharedState>,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> Result<Json<QuizResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.proxy.quiz(request).await?))
}

async fn api_summary(
    State(state): State<SharedState>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.proxy.summary(request).await?))
}

async fn shell_page() -> impl IntoResponse {
    let state = ClientState::default();
    Html(render::render_page(&state).unwrap_or_else(|err| render_error_page(err.to_string())))
}

async fn static_asset(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    match STATIC_DIR.get_file(path) {
        Some(file) => (
            [(header::CONTENT_TYPE, content_type(path))],
            file.contents(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("No asset at /{path}"),
                details: None,
            }),
        )
            .into_response(),
    }
}

fn content_type(path: &str) -> String {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match extension {
        "css" => mime::TEXT_CSS_UTF_8.to_string(),
        "js" => mime::APPLICATION_JAVASCRIPT_UTF_8.to_string(),
        "html" => mime::TEXT_HTML_UTF_8.to_string(),
        "svg" => mime::IMAGE_SVG.to_string(),
        "png" => mime::IMAGE_PNG.to_string(),
        "webmanifest" => "application/manifest+json".to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}

fn render_error_page(message: impl Into<String>) -> String {
    let message = render::escape_html(&message.into());
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>RC Vocabulary AI • Error</title>
    <link rel="stylesheet" href="/styles.css" />
  </head>
  <body>
    <main class="container">
      <h1>Something went wrong</h1>
      <p>{message}</p>
    </main>
  </body>
</html>"#
    )
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use crate::llm::fake::ScriptedModel;
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    fn test_router(model: Arc<ScriptedModel>) -> Router {
        let state = Arc::new(AppState {
            proxy: Proxy::new(model),
        });
        build_router(state)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn analyze_returns_vocabulary_and_stats() {
        let model = Arc::new(ScriptedModel::replying(
            r#"I think: [{"word":"cat","meaning":"a small animal","difficulty":"Easy"}]"#,
        ));
        let response = test_router(model)
            .oneshot(post_json(
                "/api/analyze",
                json!({ "passage": "The cat sat.", "mode": "beginner" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["vocabulary"][0]["word"], "cat");
        assert_eq!(payload["vocabulary"][0]["difficulty"], "Easy");
        assert_eq!(payload["stats"]["totalWords"], 1);
        assert_eq!(payload["stats"]["wordCount"], 3);
        assert_eq!(payload["stats"]["difficultyScore"], 33);
        assert_eq!(payload["stats"]["mediumCount"], 0);
        assert_eq!(payload["passage"], "The cat sat.");
    }

    #[tokio::test]
    async fn analyze_rejects_long_passage_before_model_call() {
        let model = Arc::new(ScriptedModel::replying("[]"));
        let passage = "word ".repeat(3001);
        let response = test_router(model.clone())
            .oneshot(post_json(
                "/api/analyze",
                json!({ "passage": passage, "mode": "advanced" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = json_body(response).await;
        assert_eq!(payload["error"], "Passage too long (max 15000 characters)");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn analyze_parse_failure_is_server_error() {
        let model = Arc::new(ScriptedModel::replying("[not json"));
        let response = test_router(model)
            .oneshot(post_json("/api/analyze", json!({ "passage": "Some text" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let payload = json_body(response).await;
        assert_eq!(payload["error"], "Failed to parse AI response");
        assert_eq!(payload["details"], "No JSON array found in response");
    }

    #[tokio::test]
    async fn quiz_without_vocabulary_is_bad_request() {
        let model = Arc::new(ScriptedModel::replying("[]"));
        let response = test_router(model.clone())
            .oneshot(post_json(
                "/api/quiz",
                json!({ "vocabulary": [], "passage": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = json_body(response).await;
        assert_eq!(payload["error"], "No vocabulary to create quiz");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn quiz_returns_questions() {
        let model = Arc::new(ScriptedModel::replying(
            r#"[{"question":"What does 'lucid' mean?","options":["dark","clear","loud","slow"],"answer":1}]"#,
        ));
        let response = test_router(model)
            .oneshot(post_json(
                "/api/quiz",
                json!({
                    "vocabulary": [{ "word": "lucid", "meaning": "clear", "difficulty": "Hard" }],
                    "passage": "A lucid account."
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["quiz"][0]["answer"], 1);
        assert_eq!(payload["quiz"][0]["options"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn summary_upstream_failure_is_generic() {
        let model = Arc::new(ScriptedModel::failing());
        let response = test_router(model)
            .oneshot(post_json("/api/summary", json!({ "passage": "Text." })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let payload = json_body(response).await;
        assert_eq!(payload["error"], "Failed to generate summary");
        assert!(payload.get("details").is_none());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let model = Arc::new(ScriptedModel::replying("[]"));
        let request = Request::post("/api/summary")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = test_router(model).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = json_body(response).await;
        assert!(payload["error"].is_string());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let model = Arc::new(ScriptedModel::replying("[]"));
        let response = test_router(model)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn shell_assets_are_served() {
        let model = Arc::new(ScriptedModel::replying("[]"));
        let router = test_router(model);
        for path in crate::offline::SHELL_ASSETS {
            let response = router
                .clone()
                .oneshot(Request::get(*path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert!(response.status().is_success(), "{path} should be served");
        }
        let response = router
            .oneshot(Request::get("/missing.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type("styles.css"), "text/css; charset=utf-8");
        assert_eq!(content_type("manifest.webmanifest"), "application/manifest+json");
    }
}
