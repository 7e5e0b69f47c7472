//! Answer generation via a generative language model.
//!
//! Defines the [`Generator`] trait and concrete backends:
//! - [`OllamaGenerator`] — calls a local Ollama instance's `/api/generate`
//!   endpoint (the default).
//! - [`OpenAIGenerator`] — calls the OpenAI chat completions API.
//!
//! The prompt handed to a backend is produced by [`render_prompt`], which
//! embeds the retrieved board context and the user's question into a fixed
//! instructional template. Generation failures surface to the caller as
//! errors; there is no fallback text and no retry at this layer.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Placeholder substituted into the prompt when retrieval found nothing,
/// so the model answers "no matching tasks" instead of inventing board
/// state.
pub const NO_DATA_PLACEHOLDER: &str = "No board data available.";

/// Trait for generation backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Send the prompt to the model and return its raw text output.
    async fn generate(&self, prompt: &str) -> Result<String>;
    /// Returns the model identifier (e.g. `"llama3.2"`).
    fn model_name(&self) -> &str;
}

/// Render the fixed instructional prompt around the retrieved context and
/// the user's question. An empty context becomes [`NO_DATA_PLACEHOLDER`].
pub fn render_prompt(context: &str, question: &str) -> String {
    let context = if context.is_empty() {
        NO_DATA_PLACEHOLDER
    } else {
        context
    };
    format!(
        "You are an assistant for a project task board. \
         Here is relevant data from the board:\n\n\
         {}\n\n\
         Answer the question: {}\n\
         Format the answer as a task list with the task name, column, and due date. \
         If no relevant data is available, reply: 'No matching tasks.'",
        context, question
    )
}

/// Create the [`Generator`] named in the configuration.
///
/// # Errors
///
/// Fails for unknown provider names or when the backend cannot be
/// initialized (e.g. missing `OPENAI_API_KEY`). Callers treat this as
/// fatal at startup.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Box::new(OpenAIGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

// ============ Ollama backend ============

/// Generation backend using a local Ollama instance.
///
/// Calls `POST /api/generate` with streaming disabled on the configured
/// URL (default: `http://localhost:11434`). Requires Ollama to be running
/// with the model pulled (e.g. `ollama pull llama3.2`).
pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            url,
            client,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
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
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
}

// ============ OpenAI backend ============

/// Generation backend using the OpenAI chat completions API.
///
/// Sends the prompt as a single user message. Requires the
/// `OPENAI_API_KEY` environment variable, checked at construction.
pub struct OpenAIGenerator {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
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
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
}
