//! Ollama inference backend implementation.
//!
//! Embeddings go through `/api/embed`. Text analysis uses the generation
//! model over `/api/chat` with JSON output enforced; image analysis and OCR
//! use the vision model over the same endpoint with base64 images attached.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use curio_core::defaults::{
    ENV_ANALYSIS_LANGUAGE, ENV_OLLAMA_BASE, ENV_OLLAMA_EMBED_DIM, ENV_OLLAMA_EMBED_MODEL,
    ENV_OLLAMA_GEN_MODEL, ENV_OLLAMA_VISION_MODEL,
};
use curio_core::{
    AnalysisBackend, AnalysisInput, AnalysisLanguage, AnalysisPrompt, ContentAnalysis,
    EmbeddingBackend, Error, InferenceBackend, Result, Vector,
};

use crate::prompts::{analysis_prompt, ocr_prompt, parse_analysis};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = curio_core::defaults::OLLAMA_URL;

/// Default embedding model.
pub const DEFAULT_EMBED_MODEL: &str = curio_core::defaults::EMBED_MODEL;

/// Default generation model.
pub const DEFAULT_GEN_MODEL: &str = curio_core::defaults::GEN_MODEL;

/// Default vision model.
pub const DEFAULT_VISION_MODEL: &str = curio_core::defaults::VISION_MODEL;

/// Default embedding dimension for nomic-embed-text.
pub const DEFAULT_DIMENSION: usize = curio_core::defaults::EMBED_DIMENSION;

/// Embedding calls slower than this are logged as slow.
const SLOW_EMBED_MS: u64 = 5_000;

/// Chat calls slower than this are logged as slow.
const SLOW_CHAT_MS: u64 = 30_000;

/// Ollama backend configuration.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embed_model: String,
    pub gen_model: String,
    pub vision_model: String,
    pub dimension: usize,
    pub embed_timeout: Duration,
    pub gen_timeout: Duration,
    /// Language OCR instructions are written in.
    pub language: AnalysisLanguage,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            gen_model: DEFAULT_GEN_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            embed_timeout: Duration::from_secs(curio_core::defaults::EMBED_TIMEOUT_SECS),
            gen_timeout: Duration::from_secs(curio_core::defaults::GEN_TIMEOUT_SECS),
            language: AnalysisLanguage::default(),
        }
    }
}

impl OllamaConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OLLAMA_BASE` | `http://127.0.0.1:11434` |
    /// | `OLLAMA_EMBED_MODEL` | `nomic-embed-text` |
    /// | `OLLAMA_GEN_MODEL` | `qwen2.5:7b` |
    /// | `OLLAMA_VISION_MODEL` | `qwen2.5vl:7b` |
    /// | `OLLAMA_EMBED_DIM` | `768` |
    /// | `CURIO_ANALYSIS_LANGUAGE` | `zh-tw` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Self {
            base_url: var(ENV_OLLAMA_BASE).unwrap_or(defaults.base_url),
            embed_model: var(ENV_OLLAMA_EMBED_MODEL).unwrap_or(defaults.embed_model),
            gen_model: var(ENV_OLLAMA_GEN_MODEL).unwrap_or(defaults.gen_model),
            vision_model: var(ENV_OLLAMA_VISION_MODEL).unwrap_or(defaults.vision_model),
            dimension: var(ENV_OLLAMA_EMBED_DIM)
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.dimension)
                .max(1),
            language: var(ENV_ANALYSIS_LANGUAGE)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.language),
            ..defaults
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_embed_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.embed_model = model.into();
        self.dimension = dimension;
        self
    }

    pub fn with_gen_model(mut self, model: impl Into<String>) -> Self {
        self.gen_model = model.into();
        self
    }

    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }

    pub fn with_language(mut self, language: AnalysisLanguage) -> Self {
        self.language = language;
        self
    }
}

/// Ollama inference backend.
pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    /// Create a new Ollama backend with the given configuration.
    pub fn new(config: OllamaConfig) -> Self {
        let client = Client::builder()
            .timeout(config.gen_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        info!(
            subsystem = "inference",
            component = "ollama",
            url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            vision_model = %config.vision_model,
            "Initializing Ollama backend"
        );

        Self {
            client,
            config: OllamaConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(OllamaConfig::from_env())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Send a non-streaming chat request and return the message content.
    async fn chat(
        &self,
        model: &str,
        message: ChatMessage,
        json_format: bool,
        op: &'static str,
    ) -> Result<String> {
        let start = Instant::now();
        let prompt_len = message.content.len();
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![message],
            stream: false,
            format: json_format.then(|| serde_json::Value::String("json".to_string())),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .timeout(self.config.gen_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            op,
            model,
            response_len = result.message.content.len(),
            duration_ms = elapsed,
            "Chat complete"
        );
        if elapsed > SLOW_CHAT_MS {
            warn!(
                op,
                duration_ms = elapsed,
                prompt_len,
                slow = true,
                "Slow generation operation"
            );
        }
        Ok(result.message.content)
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new(OllamaConfig::default())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
    /// Base64-encoded images for vision models.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

impl ChatMessage {
    fn user(content: String) -> Self {
        Self {
            role: "user".to_string(),
            content,
            images: Vec::new(),
        }
    }

    fn user_with_image(content: String, image: &[u8]) -> Self {
        Self {
            role: "user".to_string(),
            content,
            images: vec![base64::engine::general_purpose::STANDARD.encode(image)],
        }
    }
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Set to `"json"` for guaranteed valid JSON output.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "ollama", op = "embed_texts", model = %self.config.embed_model, input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();
        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.config.base_url))
            .timeout(self.config.embed_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.embeddings.len()
            )));
        }
        if let Some(v) = result
            .embeddings
            .iter()
            .find(|v| v.len() != self.config.dimension)
        {
            warn!(
                expected = self.config.dimension,
                actual = v.len(),
                "Embedding dimension differs from configuration"
            );
        }

        let vectors: Vec<Vector> = result.embeddings.into_iter().map(Vector::from).collect();
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            result_count = vectors.len(),
            duration_ms = elapsed,
            "Embedding complete"
        );
        if elapsed > SLOW_EMBED_MS {
            warn!(
                duration_ms = elapsed,
                input_count = texts.len(),
                slow = true,
                "Slow embedding operation"
            );
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl AnalysisBackend for OllamaBackend {
    #[instrument(skip(self, input, prompt), fields(subsystem = "inference", component = "ollama", op = "analyze"))]
    async fn analyze(
        &self,
        input: AnalysisInput<'_>,
        prompt: &AnalysisPrompt,
    ) -> Result<ContentAnalysis> {
        let instruction = analysis_prompt(prompt);
        let raw = match input {
            AnalysisInput::Text(text) => {
                let message = ChatMessage::user(format!("{}\n\n{}", instruction, text));
                self.chat(&self.config.gen_model, message, true, "analyze_text")
                    .await?
            }
            AnalysisInput::Image { data, .. } => {
                let message = ChatMessage::user_with_image(instruction, data);
                self.chat(&self.config.vision_model, message, true, "analyze_image")
                    .await?
            }
        };
        let mut analysis = parse_analysis(&raw)?;
        if !prompt.summarize {
            analysis.summary.clear();
        }
        Ok(analysis)
    }

    #[instrument(skip(self, image), fields(subsystem = "inference", component = "ollama", op = "extract_text", size = image.len()))]
    async fn extract_text(&self, image: &[u8], _mime_type: &str) -> Result<String> {
        let message =
            ChatMessage::user_with_image(ocr_prompt(self.config.language).to_string(), image);
        let text = self
            .chat(&self.config.vision_model, message, false, "extract_text")
            .await?;
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                info!("Ollama health check passed");
                Ok(true)
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "Ollama health check failed");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Ollama health check error");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:11434");
        assert_eq!(config.embed_model, DEFAULT_EMBED_MODEL);
        assert_eq!(config.dimension, 768);
        assert_eq!(config.language, AnalysisLanguage::ZhTw);
    }

    #[test]
    fn test_builders_and_trailing_slash() {
        let backend = OllamaBackend::new(
            OllamaConfig::default()
                .with_base_url("http://gpu:11434/")
                .with_embed_model("mxbai-embed-large", 1024)
                .with_vision_model("llava"),
        );
        assert_eq!(backend.config().base_url, "http://gpu:11434");
        assert_eq!(backend.dimension(), 1024);
        assert_eq!(EmbeddingBackend::model_name(&backend), "mxbai-embed-large");
        assert_eq!(backend.config().vision_model, "llava");
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "qwen2.5:7b".to_string(),
            messages: vec![ChatMessage::user("hi".to_string())],
            stream: false,
            format: Some(serde_json::Value::String("json".to_string())),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["format"], "json");
        assert_eq!(json["stream"], false);
        assert!(json["messages"][0].get("images").is_none());
    }

    #[test]
    fn test_image_message_is_base64() {
        let message = ChatMessage::user_with_image("ocr".to_string(), b"abc");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["images"][0], "YWJj");
    }

    #[test]
    fn test_chat_response_deserialization() {
        let json = r#"{"message": {"role": "assistant", "content": "{}"}, "done": true}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.message.content, "{}");
    }
}
