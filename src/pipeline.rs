//! Retrieval pipeline orchestration.
//!
//! [`Pipeline`] composes the vector index, the answer generator, and the
//! board ingestion adapter into the three externally visible operations:
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`Pipeline::add_text`] | normalize whitespace, upsert keyed by content hash |
//! | [`Pipeline::answer`] | retrieve top-k context, prompt the model |
//! | [`Pipeline::load_board`] | fetch board cards, flatten, upsert as `card_N` |
//!
//! Failures carry their taxonomy in [`PipelineError`]: board-service and
//! generation failures are distinct kinds the HTTP layer maps to distinct
//! statuses; everything else is internal. Empty results (empty index, zero
//! cards, zero search hits) are valid outcomes, never errors.

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::info;

use crate::board::{flatten_card, BoardClient};
use crate::config::{Config, RetrievalConfig};
use crate::embedding::create_embedder;
use crate::generate::{create_generator, render_prompt, Generator};
use crate::index::{SqliteIndex, VectorIndex};

/// Failure taxonomy for pipeline operations. The HTTP layer maps each
/// variant to its own status and error code; see [`crate::server`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The project-board service could not be reached, rejected a call,
    /// or is not configured.
    #[error("board unavailable: {0:#}")]
    Board(anyhow::Error),
    /// The generative model call failed. No fallback text exists at this
    /// layer.
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),
    /// Embedding, storage, or local I/O failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// The retrieval-augmented answering pipeline.
pub struct Pipeline {
    index: Box<dyn VectorIndex>,
    generator: Box<dyn Generator>,
    board: Option<BoardClient>,
    default_board_id: Option<String>,
    dump_path: Option<PathBuf>,
    retrieval: RetrievalConfig,
}

impl Pipeline {
    /// Assemble a pipeline from explicit components, without a board
    /// adapter ([`Pipeline::load_board`] will fail until one is
    /// configured). Intended for library embedding and tests; the binary
    /// goes through [`Pipeline::from_config`].
    pub fn new(
        index: Box<dyn VectorIndex>,
        generator: Box<dyn Generator>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            index,
            generator,
            board: None,
            default_board_id: None,
            dump_path: None,
            retrieval: retrieval.clone(),
        }
    }

    /// Build every component named in the configuration.
    ///
    /// The embedder is constructed first: a failure there (local model
    /// cannot load, missing API key) is fatal, since no operation can be
    /// served without it.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding).await?;
        let index = SqliteIndex::open(&config.db, embedder).await?;
        let generator = create_generator(&config.generation)?;

        let (board, default_board_id, dump_path) = match &config.board {
            Some(board_config) => (
                Some(BoardClient::new(board_config)?),
                board_config.board_id.clone(),
                board_config.dump_path.clone(),
            ),
            None => (None, None, None),
        };

        Ok(Self {
            index: Box::new(index),
            generator,
            board,
            default_board_id,
            dump_path,
            retrieval: config.retrieval.clone(),
        })
    }

    /// Normalize whitespace and store the text keyed by its content hash.
    ///
    /// Returns the normalized text. Identical input always maps to the
    /// same id, so repeated adds are idempotent upserts.
    pub async fn add_text(&self, text: &str) -> Result<String, PipelineError> {
        let normalized = normalize_whitespace(text);
        let id = content_id(&normalized);
        self.index.upsert(&id, &normalized).await?;
        info!(id = %id, "stored text");
        Ok(normalized)
    }

    /// Assemble the retrieval context for a query: the top-k nearest
    /// stored texts, newline-joined, nearest first. An empty index yields
    /// an empty string.
    pub async fn build_context(&self, query: &str) -> Result<String, PipelineError> {
        let hits = self.index.search(query, self.retrieval.top_k).await?;
        Ok(hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Answer a question using retrieved context.
    ///
    /// When inline context is supplied and `retrieval.persist_inline_context`
    /// is true (the default), the context is first stored through the
    /// [`Pipeline::add_text`] path — it becomes part of the index and only
    /// reaches the prompt if retrieval ranks it top-k. When the flag is
    /// false the context stays request-scoped, prepended to the retrieved
    /// lines for this call only.
    pub async fn answer(
        &self,
        question: &str,
        inline_context: Option<&str>,
    ) -> Result<String, PipelineError> {
        let mut request_context = None;
        if let Some(extra) = inline_context {
            if self.retrieval.persist_inline_context {
                self.add_text(extra).await?;
            } else {
                request_context = Some(normalize_whitespace(extra));
            }
        }

        let retrieved = self.build_context(question).await?;
        let context = match request_context {
            Some(extra) if retrieved.is_empty() => extra,
            Some(extra) => format!("{}\n{}", extra, retrieved),
            None => retrieved,
        };

        let prompt = render_prompt(&context, question);
        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(PipelineError::Generation)?;
        info!(chars = answer.len(), "generated answer");
        Ok(answer)
    }

    /// Ingest every card from the board into the index.
    ///
    /// Cards are keyed by a dense positional sequence (`card_0`, `card_1`,
    /// …) assigned fresh each run; re-running overwrites positionally and
    /// leaves records beyond the new count in place. When a dump path is
    /// configured, all flattened texts are written there (truncating the
    /// previous run) before the upserts. Returns the number of cards
    /// ingested; a board with zero cards returns 0 without touching the
    /// store.
    pub async fn load_board(&self, board_id: Option<&str>) -> Result<usize, PipelineError> {
        let client = self
            .board
            .as_ref()
            .ok_or_else(|| PipelineError::Board(anyhow!("no [board] section configured")))?;
        let board_id = board_id.or(self.default_board_id.as_deref()).ok_or_else(|| {
            PipelineError::Board(anyhow!("no board id given and board.board_id not set"))
        })?;

        let cards = client
            .fetch_cards(board_id)
            .await
            .map_err(PipelineError::Board)?;
        let texts: Vec<String> = cards.iter().map(flatten_card).collect();

        if let Some(ref path) = self.dump_path {
            std::fs::write(path, texts.concat())
                .with_context(|| format!("failed to write card dump to {}", path.display()))?;
        }

        for (seq, text) in texts.iter().enumerate() {
            self.index.upsert(&format!("card_{}", seq), text).await?;
        }

        info!(board = %board_id, count = texts.len(), "loaded board cards");
        Ok(texts.len())
    }
}

/// Collapse interior whitespace runs to single spaces and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Content-derived record id for free text: `doc_` plus the SHA-256 of
/// the normalized text. Stable across runs and processes, which is what
/// makes [`Pipeline::add_text`] idempotent.
pub fn content_id(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("doc_{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardConfig;
    use crate::embedding::Embedder;
    use crate::index::MemoryIndex;
    use async_trait::async_trait;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use tempfile::TempDir;

    /// Deterministic embedder: folds text bytes into a fixed-width vector.
    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
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
            "hash"
        }

        fn dims(&self) -> usize {
            8
        }
    }

    /// Generator that echoes the prompt it received.
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
            Err(anyhow!("model offline"))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn test_pipeline() -> Pipeline {
        Pipeline::new(
            Box::new(MemoryIndex::new(Box::new(HashEmbedder))),
            Box::new(EchoGenerator),
            &RetrievalConfig::default(),
        )
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  "), "hello world");
        assert_eq!(normalize_whitespace("a\tb\nc"), "a b c");
        assert_eq!(normalize_whitespace("already clean"), "already clean");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn test_content_id_stable_and_distinct() {
        assert_eq!(content_id("same text"), content_id("same text"));
        assert_ne!(content_id("same text"), content_id("other text"));
        assert!(content_id("same text").starts_with("doc_"));
    }

    #[tokio::test]
    async fn test_add_text_is_idempotent() {
        let pipeline = test_pipeline();

        let first = pipeline.add_text("  Ship   the\nrelease ").await.unwrap();
        let second = pipeline.add_text("Ship the release").await.unwrap();

        assert_eq!(first, "Ship the release");
        assert_eq!(first, second);
        assert_eq!(pipeline.index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_answer_empty_index_uses_placeholder() {
        let pipeline = test_pipeline();

        let answer = pipeline.answer("anything due?", None).await.unwrap();
        assert!(answer.contains("No board data available."));
        assert!(answer.contains("anything due?"));
    }

    #[tokio::test]
    async fn test_answer_includes_retrieved_context() {
        let pipeline = test_pipeline();
        pipeline.add_text("Task A due tomorrow").await.unwrap();

        let answer = pipeline.answer("what is due tomorrow?", None).await.unwrap();
        assert!(answer.contains("Task A due tomorrow"));
    }

    #[tokio::test]
    async fn test_answer_persists_inline_context_by_default() {
        let pipeline = test_pipeline();

        pipeline
            .answer("irrelevant", Some("Retro notes from sprint 12"))
            .await
            .unwrap();
        assert_eq!(pipeline.index.count().await.unwrap(), 1);

        // A later question retrieves the stored context.
        let answer = pipeline.answer("what about the retro?", None).await.unwrap();
        assert!(answer.contains("Retro notes from sprint 12"));
    }

    #[tokio::test]
    async fn test_answer_request_scoped_context_when_disabled() {
        let retrieval = RetrievalConfig {
            top_k: 3,
            persist_inline_context: false,
        };
        let pipeline = Pipeline::new(
            Box::new(MemoryIndex::new(Box::new(HashEmbedder))),
            Box::new(EchoGenerator),
            &retrieval,
        );

        let answer = pipeline
            .answer("status?", Some("  Secret   plan "))
            .await
            .unwrap();
        assert!(answer.contains("Secret plan"));
        assert_eq!(pipeline.index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_answer_generation_failure_is_distinct() {
        let pipeline = Pipeline::new(
            Box::new(MemoryIndex::new(Box::new(HashEmbedder))),
            Box::new(FailingGenerator),
            &RetrievalConfig::default(),
        );

        let err = pipeline.answer("status?", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
        assert!(err.to_string().contains("generation failed"));
    }

    #[tokio::test]
    async fn test_build_context_joins_nearest_first() {
        let pipeline = test_pipeline();
        pipeline.add_text("alpha entry").await.unwrap();
        pipeline.add_text("beta entry").await.unwrap();

        let context = pipeline.build_context("alpha entry").await.unwrap();
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "alpha entry");
    }

    #[tokio::test]
    async fn test_load_board_without_config_fails_as_board_error() {
        let pipeline = test_pipeline();
        let err = pipeline.load_board(None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Board(_)));
    }

    // ============ load_board against a stub board API ============

    fn stub_cards_for(board: &str) -> serde_json::Value {
        match board {
            "b_two" => json!([
                {
                    "id": "c1",
                    "name": "Write changelog",
                    "desc": "Cover the storage rework",
                    "due": "2024-07-15T09:00:00.000Z",
                    "idList": "l1",
                    "idMembers": []
                },
                {
                    "id": "c2",
                    "name": "Tag release",
                    "desc": null,
                    "due": null,
                    "idList": "l1",
                    "idMembers": []
                }
            ]),
            "b_one" => json!([
                {
                    "id": "c9",
                    "name": "Solo task",
                    "desc": null,
                    "due": null,
                    "idList": "l1",
                    "idMembers": []
                }
            ]),
            _ => json!([]),
        }
    }

    async fn stub_board_api() -> String {
        let app = Router::new()
            .route(
                "/boards/{id}",
                get(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "b_two" | "b_one" | "b_zero" => {
                            Json(json!({ "id": id, "name": "Stub board" })).into_response()
                        }
                        _ => (StatusCode::NOT_FOUND, "board not found").into_response(),
                    }
                }),
            )
            .route(
                "/boards/{id}/cards",
                get(|Path(id): Path<String>| async move { Json(stub_cards_for(&id)) }),
            )
            .route(
                "/lists/{id}",
                get(|| async { Json(json!({ "name": "Doing" })) }),
            )
            .route("/cards/{id}/actions", get(|| async { Json(json!([])) }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn board_pipeline(dump: Option<PathBuf>) -> Pipeline {
        let url = stub_board_api().await;
        let mut pipeline = test_pipeline();
        pipeline.board = Some(
            BoardClient::new(&BoardConfig {
                url,
                board_id: None,
                api_key: None,
                token: None,
                dump_path: None,
                timeout_secs: 5,
            })
            .unwrap(),
        );
        pipeline.default_board_id = Some("b_two".to_string());
        pipeline.dump_path = dump;
        pipeline
    }

    #[tokio::test]
    async fn test_load_board_assigns_positional_ids() {
        let pipeline = board_pipeline(None).await;

        let count = pipeline.load_board(None).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(pipeline.index.count().await.unwrap(), 2);

        let hits = pipeline.index.search("changelog", 10).await.unwrap();
        let mut ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["card_0", "card_1"]);
    }

    #[tokio::test]
    async fn test_load_board_zero_cards_returns_zero() {
        let pipeline = board_pipeline(None).await;

        let count = pipeline.load_board(Some("b_zero")).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(pipeline.index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_board_smaller_reingest_leaves_stale_records() {
        let pipeline = board_pipeline(None).await;

        pipeline.load_board(Some("b_two")).await.unwrap();
        let count = pipeline.load_board(Some("b_one")).await.unwrap();
        assert_eq!(count, 1);

        // card_0 was overwritten positionally; card_1 is stale but kept.
        assert_eq!(pipeline.index.count().await.unwrap(), 2);
        let hits = pipeline.index.search("task", 10).await.unwrap();
        let card_0 = hits.iter().find(|h| h.id == "card_0").unwrap();
        assert!(card_0.text.contains("Solo task"));
        let card_1 = hits.iter().find(|h| h.id == "card_1").unwrap();
        assert!(card_1.text.contains("Tag release"));
    }

    #[tokio::test]
    async fn test_load_board_writes_dump_file() {
        let tmp = TempDir::new().unwrap();
        let dump = tmp.path().join("cards.txt");
        let pipeline = board_pipeline(Some(dump.clone())).await;

        pipeline.load_board(None).await.unwrap();
        let content = std::fs::read_to_string(&dump).unwrap();
        assert!(content.contains("Task: Write changelog\n"));
        assert!(content.contains("Task: Tag release\n"));
        assert_eq!(content.matches("---\n").count(), 2);

        // A later run truncates the previous dump.
        pipeline.load_board(Some("b_zero")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dump).unwrap(), "");
    }

    #[tokio::test]
    async fn test_load_board_unknown_board_is_board_error() {
        let pipeline = board_pipeline(None).await;

        let err = pipeline.load_board(Some("nope")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Board(_)));
        assert!(err.to_string().contains("failed to fetch board nope"));
    }
}
