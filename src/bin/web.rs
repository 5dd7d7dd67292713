//! Study Companion Web UI
//!
//! 启动: cargo run --bin study-companion-web --features web
//! 浏览器访问 http://127.0.0.1:8080（端口可用 STUDY_WEB_PORT 覆盖）

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use study_companion::config::load_config;
use study_companion::core::PipelineError;
use study_companion::pipeline::PipelineEvent;
use study_companion::{observability, PipelineRuntime, StudyOptions};

const DEFAULT_PORT: u16 = 8080;

struct AppState {
    runtime: Arc<PipelineRuntime>,
}

/// POST /api/generate 与 /api/generate/stream 的请求体；选项缺省时与 CLI 一致
#[derive(Debug, Deserialize)]
struct GenerateRequest {
    topic: String,
    #[serde(flatten)]
    options: StudyOptions,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    topic: String,
    filename: String,
    markdown: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config(None).unwrap_or_default();
    if let Err(e) = observability::init(&cfg.app) {
        observability::init_console();
        tracing::warn!(error = %e, "log file unavailable, logging to console only");
    }

    let state = Arc::new(AppState {
        runtime: Arc::new(PipelineRuntime::from_config(cfg)),
    });
    let app = router(state);

    let port = std::env::var("STUDY_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Study Companion Web UI: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/generate", post(api_generate))
        .route("/api/generate/stream", post(api_generate_stream))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

fn error_status(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::EmptyTopic => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /api/generate：阻塞直到学习包生成完毕，返回 Markdown
async fn api_generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, (StatusCode, String)> {
    let topic = req.topic.trim();
    if topic.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "topic is required".to_string()));
    }
    match state.runtime.run(topic, &req.options, None).await {
        Ok(pack) => Ok(Json(GenerateResponse {
            topic: pack.topic.clone(),
            filename: pack.suggested_filename(),
            markdown: pack.to_markdown(),
        })),
        Err(e) => {
            tracing::error!(error = %e, "study pack generation failed");
            Err((error_status(&e), e.to_string()))
        }
    }
}

fn ndjson_line(ev: &PipelineEvent) -> Bytes {
    let mut line = serde_json::to_string(ev).unwrap_or_default();
    line.push('\n');
    Bytes::from(line)
}

/// POST /api/generate/stream：NDJSON 流，逐行推送 PipelineEvent，失败时以 error 事件收尾
async fn api_generate_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, (StatusCode, String)> {
    let topic = req.topic.trim().to_string();
    if topic.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "topic is required".to_string()));
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let runtime = Arc::clone(&state.runtime);
    let options = req.options;
    tokio::spawn(async move {
        if let Err(e) = runtime.run(&topic, &options, Some(&event_tx)).await {
            tracing::error!(error = %e, "study pack generation failed");
            let _ = event_tx.send(PipelineEvent::Error {
                message: e.to_string(),
            });
        }
    });

    let stream = stream::unfold(event_rx, |mut rx| async move {
        let ev = rx.recv().await?;
        Some((Ok::<_, Infallible>(ndjson_line(&ev)), rx))
    });

    let mut res = Response::new(Body::from_stream(stream));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/x-ndjson; charset=utf-8"),
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::Request;
    use tower::ServiceExt;

    use study_companion::config::AppConfig;
    use study_companion::llm::{LlmClient, LlmSettings, MockLlmClient};
    use study_companion::tools::{CalculatorTool, ToolExecutor, ToolRegistry};

    fn test_router(fail: bool) -> Router {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool::new());
        let executor = ToolExecutor::new(registry, 5);
        let runtime = PipelineRuntime::new(
            AppConfig::default(),
            executor,
            move |_s: &LlmSettings| -> Result<Arc<dyn LlmClient>, String> {
                if fail {
                    Ok(Arc::new(MockLlmClient::failing("endpoint down")))
                } else {
                    Ok(Arc::new(MockLlmClient::new()))
                }
            },
        );
        router(Arc::new(AppState {
            runtime: Arc::new(runtime),
        }))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_index_page() {
        let res = test_router(false)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_string(res).await.contains("/api/generate/stream"));
    }

    #[tokio::test]
    async fn test_empty_topic_rejected() {
        let res = test_router(false)
            .oneshot(post_json("/api/generate", r#"{"topic": "   "}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_returns_markdown() {
        let res = test_router(false)
            .oneshot(post_json(
                "/api/generate",
                r#"{"topic": "Photosynthesis", "include_quiz": false, "difficulty": "beginner"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_string(res).await).unwrap();
        assert_eq!(body["topic"], "Photosynthesis");
        let markdown = body["markdown"].as_str().unwrap();
        assert!(markdown.starts_with("# 📚 Study Pack: Photosynthesis"));
        assert!(markdown.contains("## Study Management & Planning"));
        assert!(!markdown.contains("## Quiz Creation"));
        assert!(body["filename"].as_str().unwrap().ends_with(".md"));
    }

    #[tokio::test]
    async fn test_generate_failure_is_500() {
        let res = test_router(true)
            .oneshot(post_json("/api/generate", r#"{"topic": "Atoms"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(res).await.contains("endpoint down"));
    }

    #[tokio::test]
    async fn test_stream_emits_ndjson_events() {
        let res = test_router(false)
            .oneshot(post_json(
                "/api/generate/stream",
                r#"{"topic": "Derivatives", "include_examples": false, "include_quiz": false}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/x-ndjson"));
        let body = body_string(res).await;
        let types: Vec<String> = body
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(types.first().map(String::as_str), Some("attempt_started"));
        assert_eq!(types.last().map(String::as_str), Some("completed"));
        assert_eq!(types.iter().filter(|t| *t == "task_completed").count(), 2);
    }

    #[tokio::test]
    async fn test_stream_failure_ends_with_error_line() {
        let res = test_router(true)
            .oneshot(post_json("/api/generate/stream", r#"{"topic": "Atoms"}"#))
            .await
            .unwrap();
        let body = body_string(res).await;
        let last: serde_json::Value = serde_json::from_str(body.lines().last().unwrap()).unwrap();
        assert_eq!(last["type"], "error");
        assert!(last["message"].as_str().unwrap().contains("All 2 LLM attempts failed"));
    }
}
