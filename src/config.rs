use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub board: Option<BoardConfig>,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: 30,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            url: None,
            timeout_secs: 120,
        }
    }
}

fn default_generation_provider() -> String {
    "ollama".to_string()
}
fn default_generation_model() -> String {
    "llama3.2".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest records assembled into the prompt context.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Whether inline context passed to `ask` is persisted into the index
    /// (the historical behavior) or used for that request only.
    #[serde(default = "default_persist_inline_context")]
    pub persist_inline_context: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            persist_inline_context: true,
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_persist_inline_context() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct BoardConfig {
    /// Base URL of the board REST API, e.g. `https://api.trello.com/1`.
    pub url: String,
    /// Default board to ingest when `load-board` is called without an id.
    #[serde(default)]
    pub board_id: Option<String>,
    /// API key appended as the `key` query parameter. Falls back to the
    /// `BOARD_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    /// API token appended as the `token` query parameter. Falls back to the
    /// `BOARD_TOKEN` environment variable.
    #[serde(default)]
    pub token: Option<String>,
    /// Optional file path; when set, every flattened card text is written
    /// here on each load run.
    #[serde(default)]
    pub dump_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "local" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local, ollama, or openai.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if matches!(config.embedding.provider.as_str(), "ollama" | "openai") {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() {
            anyhow::bail!(
                "embedding.dims must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be ollama or openai.",
            other
        ),
    }
    if config.generation.model.is_empty() {
        anyhow::bail!("generation.model must not be empty");
    }

    // Validate board
    if let Some(ref board) = config.board {
        if board.url.is_empty() {
            anyhow::bail!("board.url must not be empty");
        }
    }

    Ok(config)
}
