//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete backends:
//! - **`LocalEmbedder`** — runs models locally via fastembed; the model is
//!   loaded once at construction, so a missing or broken model fails the
//!   process at startup instead of on the first request.
//! - **[`OllamaEmbedder`]** — calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIEmbedder`]** — calls the OpenAI embeddings API.
//!
//! Remote backends make a single HTTP call per batch with a configured
//! timeout. Failures surface to the caller; they are never retried here.
//!
//! Also provides vector utilities shared by the index backends:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`] — decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Backend Selection
//!
//! Use [`create_embedder`] to instantiate the backend named in the
//! configuration:
//!
//! ```rust,no_run
//! # use deckhand::config::EmbeddingConfig;
//! # use deckhand::embedding::create_embedder;
//! # async fn example() -> anyhow::Result<()> {
//! let config = EmbeddingConfig::default(); // provider = "local"
//! let embedder = create_embedder(&config).await?;
//! assert_eq!(embedder.dims(), 384);
//! # Ok(())
//! # }
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Trait for embedding backends.
///
/// `embed` must return one vector per input text, in input order, and be
/// deterministic for identical input — content-hash dedup in the pipeline
/// relies on it.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
}

/// Embed a single text.
///
/// Convenience wrapper around [`Embedder::embed`] for single-text use
/// cases (e.g. embedding a search query).
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Create the [`Embedder`] named in the configuration.
///
/// | Config value | Backend |
/// |--------------|---------|
/// | `"local"` | `LocalEmbedder` (fastembed, default feature) |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
///
/// # Errors
///
/// Fails for unknown provider names or when the backend cannot be
/// initialized: local model load failure, missing `OPENAI_API_KEY`, or a
/// missing feature flag. Callers treat this as fatal — no request can be
/// served without an embedder.
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalEmbedder::load(config).await?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Local backend (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Embedding backend for local inference via fastembed.
    ///
    /// The model is downloaded on first use from Hugging Face and cached;
    /// after that, embedding runs entirely offline. Loading happens once in
    /// [`LocalEmbedder::load`] and the session is reused for every call.
    pub struct LocalEmbedder {
        model_name: String,
        dims: usize,
        model: Arc<Mutex<fastembed::TextEmbedding>>,
    }

    impl LocalEmbedder {
        /// Resolve the configured model and load it.
        ///
        /// The load runs on the blocking pool (fastembed initialization is
        /// synchronous and may download model files).
        pub async fn load(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
            let dims = config.dims.unwrap_or_else(|| default_dims(&model_name));
            let fastembed_model = to_fastembed_model(&model_name)?;

            let model = tokio::task::spawn_blocking(move || {
                fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))
            })
            .await??;

            Ok(Self {
                model_name,
                dims,
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let model = self.model.clone();
            let texts = texts.to_vec();

            tokio::task::spawn_blocking(move || {
                let mut model = model.lock().unwrap();
                model
                    .embed(texts, None)
                    .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
            })
            .await?
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }

        fn dims(&self) -> usize {
            self.dims
        }
    }

    fn default_dims(model_name: &str) -> usize {
        match model_name {
            "all-minilm-l6-v2" => 384,
            "bge-small-en-v1.5" => 384,
            "bge-base-en-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
            "multilingual-e5-small" => 384,
            "multilingual-e5-base" => 768,
            "multilingual-e5-large" => 1024,
            _ => 384,
        }
    }

    fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
            "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
            "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
                 nomic-embed-text-v1, nomic-embed-text-v1.5, \
                 multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
                other
            ),
        }
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

// ============ Ollama backend ============

/// Embedding backend using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default:
/// `http://localhost:11434`). Requires Ollama to be running with an
/// embedding model pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_ollama_response(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ OpenAI backend ============

/// Embedding backend using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable, checked at construction.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use deckhand::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values
/// from the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`: `1.0` = identical direction, `0.0` =
/// orthogonal, `-1.0` = opposite. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![0.25f32, -7.5, 1.125, 0.0, -0.03];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_blob_ignores_trailing_partial_chunk() {
        let mut blob = vec_to_blob(&[1.0f32, 2.0]);
        blob.push(0xFF);
        assert_eq!(blob_to_vec(&blob), vec![1.0f32, 2.0]);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.5, 2.0, -3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 0.0, 1.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![2.0, 0.0];
        let b = vec![-2.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({
            "embeddings": [[0.1, 0.2], [0.3, 0.4]]
        });
        let parsed = parse_ollama_response(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!((parsed[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_ollama_response_missing_field() {
        let json = serde_json::json!({ "model": "x" });
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [1.0, 0.0] },
                { "embedding": [0.0, 1.0] }
            ]
        });
        let parsed = parse_openai_response(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], vec![1.0, 0.0]);
    }
}
