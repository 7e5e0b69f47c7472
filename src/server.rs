//! HTTP assistant server.
//!
//! Exposes the retrieval pipeline via a JSON HTTP API so chat frontends
//! and automations can add notes, ask questions, and trigger board loads
//! without shelling out to the CLI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/assistant/add` | Store a free-text note in the index |
//! | `POST` | `/assistant/ask` | Answer a question with retrieved context |
//! | `POST` | `/assistant/load` | Ingest all cards from the project board |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Every successful assistant call returns the same envelope:
//!
//! ```json
//! { "answer": "..." }
//! ```
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `board_unavailable` (400),
//! `generation_failed` (500), `internal` (500). The pipeline's failure
//! taxonomy maps one-to-one: a dead board service is the caller's
//! deployment problem (400), a dead model is ours (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! chat frontends.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::pipeline::{Pipeline, PipelineError};

/// Upper bound on `/assistant/add` text length, in characters.
const MAX_TEXT_LEN: usize = 10_000;
/// Upper bound on `/assistant/ask` query length, in characters.
const MAX_QUERY_LEN: usize = 500;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Starts the assistant HTTP server.
///
/// Builds the full pipeline from config (embedder, index, generator,
/// board adapter), binds to `[server].bind`, and serves until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config).await?;
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    println!("deckhand assistant listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Assembles the router. Split out of [`run_server`] so tests can serve
/// the same routes on an ephemeral port with a stub pipeline.
fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/assistant/add", post(handle_add))
        .route("/assistant/ask", post(handle_ask))
        .route("/assistant/load", post(handle_load))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"generation_failed"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let (status, code) = match &err {
            PipelineError::Board(_) => (StatusCode::BAD_REQUEST, "board_unavailable"),
            PipelineError::Generation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "generation_failed"),
            PipelineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: format!("{:#}", err),
        }
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /assistant/add ============

#[derive(Deserialize)]
struct AddRequest {
    text: String,
}

/// Response envelope shared by all assistant endpoints.
#[derive(Serialize)]
struct AssistantResponse {
    answer: String,
}

/// Handler for `POST /assistant/add`.
///
/// Stores one free-text note in the index and echoes the normalized text
/// back as the answer.
async fn handle_add(
    State(state): State<AppState>,
    Json(req): Json<AddRequest>,
) -> Result<Json<AssistantResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    if req.text.chars().count() > MAX_TEXT_LEN {
        return Err(bad_request(format!(
            "text must be at most {} characters",
            MAX_TEXT_LEN
        )));
    }

    let normalized = state.pipeline.add_text(&req.text).await?;
    Ok(Json(AssistantResponse {
        answer: format!("Added text: {}", normalized),
    }))
}

// ============ POST /assistant/ask ============

#[derive(Deserialize)]
struct AskRequest {
    query: String,
    /// Optional extra context for this question.
    #[serde(default)]
    context: Option<String>,
}

/// Handler for `POST /assistant/ask`.
///
/// Answers a question using retrieved board context. Optional inline
/// context is handled per `retrieval.persist_inline_context`.
async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AssistantResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if req.query.chars().count() > MAX_QUERY_LEN {
        return Err(bad_request(format!(
            "query must be at most {} characters",
            MAX_QUERY_LEN
        )));
    }

    let answer = state
        .pipeline
        .answer(&req.query, req.context.as_deref())
        .await?;
    Ok(Json(AssistantResponse { answer }))
}

// ============ POST /assistant/load ============

#[derive(Deserialize)]
struct LoadParams {
    /// Board id override; defaults to `board.board_id` from config.
    #[serde(default)]
    board: Option<String>,
}

/// Handler for `POST /assistant/load`.
///
/// Ingests every card from the board into the index and reports the count.
async fn handle_load(
    State(state): State<AppState>,
    Query(params): Query<LoadParams>,
) -> Result<Json<AssistantResponse>, AppError> {
    let count = state.pipeline.load_board(params.board.as_deref()).await?;
    Ok(Json(AssistantResponse {
        answer: format!("Loaded {} cards from the board", count),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::embedding::Embedder;
    use crate::generate::Generator;
    use crate::index::MemoryIndex;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct ByteFoldEmbedder;

    #[async_trait]
    impl Embedder for ByteFoldEmbedder {
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 8];
                    for (i, b) in t.bytes().enumerate() {
                        v[i % 8] += b as f32 / 255.0;
                    }
                    v
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "byte-fold"
        }

        fn dims(&self) -> usize {
            8
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            Ok(format!("echo: {}", prompt))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("model offline"))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    async fn serve(generator: Box<dyn Generator>) -> String {
        let pipeline = Pipeline::new(
            Box::new(MemoryIndex::new(Box::new(ByteFoldEmbedder))),
            generator,
            &RetrievalConfig::default(),
        );
        let state = AppState {
            pipeline: Arc::new(pipeline),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn error_code(response: reqwest::Response) -> String {
        let body: Value = response.json().await.unwrap();
        body["error"]["code"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_reports_version() {
        let base = serve(Box::new(EchoGenerator)).await;

        let body: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_add_then_ask_round_trip() {
        let base = serve(Box::new(EchoGenerator)).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/assistant/add", base))
            .json(&json!({ "text": "  Deploy   staging on Friday " }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["answer"], "Added text: Deploy staging on Friday");

        let response = client
            .post(format!("{}/assistant/ask", base))
            .json(&json!({ "query": "when do we deploy?" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        let answer = body["answer"].as_str().unwrap();
        assert!(answer.contains("Deploy staging on Friday"));
        assert!(answer.contains("when do we deploy?"));
    }

    #[tokio::test]
    async fn test_add_empty_text_rejected() {
        let base = serve(Box::new(EchoGenerator)).await;

        let response = reqwest::Client::new()
            .post(format!("{}/assistant/add", base))
            .json(&json!({ "text": "   " }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        assert_eq!(error_code(response).await, "bad_request");
    }

    #[tokio::test]
    async fn test_ask_oversized_query_rejected() {
        let base = serve(Box::new(EchoGenerator)).await;

        let response = reqwest::Client::new()
            .post(format!("{}/assistant/ask", base))
            .json(&json!({ "query": "x".repeat(MAX_QUERY_LEN + 1) }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        assert_eq!(error_code(response).await, "bad_request");
    }

    #[tokio::test]
    async fn test_ask_generation_failure_is_500() {
        let base = serve(Box::new(FailingGenerator)).await;

        let response = reqwest::Client::new()
            .post(format!("{}/assistant/ask", base))
            .json(&json!({ "query": "anything due?" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        assert_eq!(error_code(response).await, "generation_failed");
    }

    #[tokio::test]
    async fn test_load_without_board_config_is_400() {
        let base = serve(Box::new(EchoGenerator)).await;

        let response = reqwest::Client::new()
            .post(format!("{}/assistant/load", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        assert_eq!(error_code(response).await, "board_unavailable");
    }
}
