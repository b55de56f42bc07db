//! Mock inference backend for deterministic testing.
//!
//! Embeddings are derived from the input characters, so equal texts embed
//! identically. Analyses default to a heuristic over the input words and can
//! be pinned per input. Failures can be injected per input substring.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use curio_inference::mock::MockInferenceBackend;
//! use curio_core::EmbeddingBackend;
//!
//! let backend = MockInferenceBackend::new()
//!     .with_dimension(8)
//!     .with_vector("cats", vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
//! let v = backend.embed_text("cats").await?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use curio_core::defaults::{ANALYSIS_KEYWORDS, ANALYSIS_SUMMARY_WORDS};
use curio_core::{
    AnalysisBackend, AnalysisInput, AnalysisPrompt, ContentAnalysis, EmbeddingBackend, Error,
    InferenceBackend, Result, Vector,
};

/// Mock inference backend for testing.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    analyses: HashMap<String, ContentAnalysis>,
    image_analysis: Option<ContentAnalysis>,
    ocr_text: String,
    ocr_fails: bool,
    failing_inputs: Vec<String>,
    latency_ms: u64,
    failure_rate: f64,
    healthy: bool,
}

/// One recorded backend call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
    pub timestamp: std::time::Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            vectors: HashMap::new(),
            analyses: HashMap::new(),
            image_analysis: None,
            ocr_text: String::new(),
            ocr_fails: false,
            failing_inputs: Vec::new(),
            latency_ms: 0,
            failure_rate: 0.0,
            healthy: true,
        }
    }
}

impl MockInferenceBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Pin the embedding returned for an exact input text.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.config)
            .vectors
            .insert(text.into(), vector);
        self
    }

    /// Pin the analysis returned for an exact input text.
    pub fn with_analysis(mut self, text: impl Into<String>, analysis: ContentAnalysis) -> Self {
        Arc::make_mut(&mut self.config)
            .analyses
            .insert(text.into(), analysis);
        self
    }

    /// Set the analysis returned for every image.
    pub fn with_image_analysis(mut self, analysis: ContentAnalysis) -> Self {
        Arc::make_mut(&mut self.config).image_analysis = Some(analysis);
        self
    }

    /// Set the OCR text returned for every image.
    pub fn with_ocr_text(mut self, text: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).ocr_text = text.into();
        self
    }

    /// Make every OCR call fail.
    pub fn with_ocr_failure(mut self) -> Self {
        Arc::make_mut(&mut self.config).ocr_fails = true;
        self
    }

    /// Fail any embed or analyze call whose input contains `needle`.
    pub fn with_failing_input(mut self, needle: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .failing_inputs
            .push(needle.into());
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Report the backend as unhealthy.
    pub fn unhealthy(mut self) -> Self {
        Arc::make_mut(&mut self.config).healthy = false;
        self
    }

    fn log(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.call_log.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.log().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.log().clear()
    }

    /// Number of calls for an operation (`embed`, `analyze`, `ocr`).
    pub fn call_count(&self, operation: &str) -> usize {
        self.log().iter().filter(|c| c.operation == operation).count()
    }

    fn log_call(&self, operation: &str, input: &str) {
        self.log().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
            timestamp: std::time::Instant::now(),
        });
    }

    fn check_failure(&self, input: &str) -> Result<()> {
        if let Some(needle) = self
            .config
            .failing_inputs
            .iter()
            .find(|n| input.contains(n.as_str()))
        {
            return Err(Error::Inference(format!(
                "Simulated failure for input containing '{}'",
                needle
            )));
        }
        if self.config.failure_rate > 0.0 {
            use rand::Rng;
            if rand::thread_rng().gen::<f64>() < self.config.failure_rate {
                return Err(Error::Inference("Simulated failure".to_string()));
            }
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn embedding_for(&self, text: &str) -> Vec<f32> {
        self.config
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| MockEmbeddingGenerator::generate(text, self.config.dimension))
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Heuristic analysis: first words as title, leading words as summary and
/// the first distinct longer words as keywords.
fn heuristic_analysis(text: &str, summarize: bool) -> ContentAnalysis {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut keywords: Vec<String> = Vec::new();
    for word in &words {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.chars().count() > 3 && !keywords.contains(&word) {
            keywords.push(word);
        }
        if keywords.len() == ANALYSIS_KEYWORDS {
            break;
        }
    }
    ContentAnalysis {
        title: words.iter().take(5).copied().collect::<Vec<_>>().join(" "),
        summary: if summarize {
            words
                .iter()
                .take(ANALYSIS_SUMMARY_WORDS)
                .copied()
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            String::new()
        },
        keywords,
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            self.log_call("embed", text);
            self.simulate_latency().await;
            self.check_failure(text)?;
            vectors.push(Vector::from(self.embedding_for(text)));
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl AnalysisBackend for MockInferenceBackend {
    async fn analyze(
        &self,
        input: AnalysisInput<'_>,
        prompt: &AnalysisPrompt,
    ) -> Result<ContentAnalysis> {
        self.simulate_latency().await;
        let mut analysis = match input {
            AnalysisInput::Text(text) => {
                self.log_call("analyze", text);
                self.check_failure(text)?;
                self.config
                    .analyses
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| heuristic_analysis(text, prompt.summarize))
            }
            AnalysisInput::Image { data, mime_type } => {
                self.log_call("analyze", mime_type);
                self.check_failure(&String::from_utf8_lossy(data))?;
                self.config
                    .image_analysis
                    .clone()
                    .unwrap_or_else(|| heuristic_analysis("image", prompt.summarize))
            }
        };
        if !prompt.summarize {
            analysis.summary.clear();
        }
        Ok(analysis)
    }

    async fn extract_text(&self, image: &[u8], mime_type: &str) -> Result<String> {
        self.log_call("ocr", mime_type);
        self.simulate_latency().await;
        if self.config.ocr_fails {
            return Err(Error::Inference("Simulated OCR failure".to_string()));
        }
        self.check_failure(&String::from_utf8_lossy(image))?;
        Ok(self.config.ocr_text.clone())
    }
}

#[async_trait]
impl InferenceBackend for MockInferenceBackend {
    async fn health_check(&self) -> Result<bool> {
        Ok(self.config.healthy)
    }
}

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// Uses character-based hashing for reproducibility.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let dimension = dimension.max(1);
        let mut vec = vec![0.0; dimension];
        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }
        Self::normalize(&mut vec);
        vec
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }
}
