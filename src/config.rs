//! Configuration for the document-to-quiz pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! The defaults mirror the production service this crate grew out of:
//! batches of 10 pages, 3 concurrent generation workers, OCR fallback at a
//! 90 % empty-page ratio, a 300-page ceiling, a 50 MB ingestion gate, and
//! 300 s/600 s soft/hard task budgets. None of these constants has a
//! documented rationale beyond operational experience, which is exactly why
//! they are fields rather than hard-coded values.

use crate::error::QuizError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for a full quiz-generation run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2quiz::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .batch_capacity(10)
///     .workers(3)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Pages per generation batch. Default: 10.
    ///
    /// Small enough that a single model call stays well inside context
    /// limits, large enough that a 300-page document needs only 30 calls.
    pub batch_capacity: usize,

    /// Number of concurrent generation workers. Default: 3.
    ///
    /// Generation is expensive and externally rate-limited; three workers
    /// keep the provider busy without tripping per-minute quotas.
    pub workers: usize,

    /// Empty-page ratio above which the direct extraction pass is discarded
    /// and the whole document is re-extracted via OCR. Default: 0.9.
    ///
    /// Strictly greater-than: a document at exactly the threshold keeps its
    /// direct result.
    pub empty_page_threshold: f64,

    /// Maximum extracted page count before the run is rejected. Default: 300.
    pub max_pages: usize,

    /// Maximum stored-object size accepted by the ingestion task, in MB.
    /// Default: 50. Strictly greater-than: exactly 50.0 MB is accepted.
    pub max_upload_mb: u64,

    /// Retry ceiling for transient storage failures during fetch. Default: 3.
    ///
    /// Backoff between attempts is `2^retry_count` seconds.
    pub fetch_retries: u32,

    /// Maximum retry attempts for one generation call. Default: 3.
    pub generation_retries: u32,

    /// Initial generation retry delay in milliseconds (exponential backoff).
    /// Default: 500. Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-generation-call timeout in seconds. Default: 60.
    pub generation_timeout_secs: u64,

    /// Timeout for the direct text-extraction pass in seconds. Default: 30.
    pub extract_timeout_secs: u64,

    /// Timeout for the whole OCR pass in seconds. Default: 120.
    ///
    /// Deliberately distinct from (and longer than) the direct pass: OCR
    /// rasterises every page and runs a vision call per page, a
    /// high-latency, high-memory branch.
    pub ocr_timeout_secs: u64,

    /// Soft task budget in seconds; checked between stages for graceful
    /// early termination. Default: 300.
    pub soft_time_limit_secs: u64,

    /// Hard task budget in seconds; the task is forcibly terminated beyond
    /// it regardless of state. Default: 600.
    pub hard_time_limit_secs: u64,

    /// Maximum rasterised page dimension in pixels for the OCR pass.
    /// Default: 2000. Caps memory on oversized pages independent of DPI.
    pub max_rendered_pixels: u32,

    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses the
    /// provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic"). If None along with
    /// `provider`, the factory auto-detects from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom generation system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Sampling temperature for generation. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens per generation response. Default: 4096.
    pub max_tokens: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_capacity: 10,
            workers: 3,
            empty_page_threshold: 0.9,
            max_pages: 300,
            max_upload_mb: 50,
            fetch_retries: 3,
            generation_retries: 3,
            retry_backoff_ms: 500,
            generation_timeout_secs: 60,
            extract_timeout_secs: 30,
            ocr_timeout_secs: 120,
            soft_time_limit_secs: 300,
            hard_time_limit_secs: 600,
            max_rendered_pixels: 2000,
            model: None,
            provider_name: None,
            provider: None,
            system_prompt: None,
            temperature: 0.2,
            max_tokens: 4096,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("batch_capacity", &self.batch_capacity)
            .field("workers", &self.workers)
            .field("empty_page_threshold", &self.empty_page_threshold)
            .field("max_pages", &self.max_pages)
            .field("max_upload_mb", &self.max_upload_mb)
            .field("fetch_retries", &self.fetch_retries)
            .field("generation_retries", &self.generation_retries)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("soft_time_limit_secs", &self.soft_time_limit_secs)
            .field("hard_time_limit_secs", &self.hard_time_limit_secs)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn batch_capacity(mut self, n: usize) -> Self {
        self.config.batch_capacity = n.max(1);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn empty_page_threshold(mut self, ratio: f64) -> Self {
        self.config.empty_page_threshold = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn max_upload_mb(mut self, mb: u64) -> Self {
        self.config.max_upload_mb = mb.max(1);
        self
    }

    pub fn fetch_retries(mut self, n: u32) -> Self {
        self.config.fetch_retries = n;
        self
    }

    pub fn generation_retries(mut self, n: u32) -> Self {
        self.config.generation_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.generation_timeout_secs = secs;
        self
    }

    pub fn extract_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extract_timeout_secs = secs;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn soft_time_limit_secs(mut self, secs: u64) -> Self {
        self.config.soft_time_limit_secs = secs;
        self
    }

    pub fn hard_time_limit_secs(mut self, secs: u64) -> Self {
        self.config.hard_time_limit_secs = secs;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, QuizError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(QuizError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.batch_capacity == 0 {
            return Err(QuizError::InvalidConfig(
                "Batch capacity must be ≥ 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.empty_page_threshold) {
            return Err(QuizError::InvalidConfig(format!(
                "Empty-page threshold must be in [0, 1], got {}",
                c.empty_page_threshold
            )));
        }
        if c.soft_time_limit_secs > c.hard_time_limit_secs {
            return Err(QuizError::InvalidConfig(format!(
                "Soft budget ({}s) must not exceed hard budget ({}s)",
                c.soft_time_limit_secs, c.hard_time_limit_secs
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_constants() {
        let c = PipelineConfig::default();
        assert_eq!(c.batch_capacity, 10);
        assert_eq!(c.workers, 3);
        assert_eq!(c.empty_page_threshold, 0.9);
        assert_eq!(c.max_pages, 300);
        assert_eq!(c.max_upload_mb, 50);
        assert_eq!(c.fetch_retries, 3);
        assert_eq!(c.soft_time_limit_secs, 300);
        assert_eq!(c.hard_time_limit_secs, 600);
    }

    #[test]
    fn builder_clamps_and_validates() {
        let c = PipelineConfig::builder()
            .workers(0)
            .batch_capacity(0)
            .build()
            .unwrap();
        // Setters clamp to 1 instead of letting build() fail.
        assert_eq!(c.workers, 1);
        assert_eq!(c.batch_capacity, 1);

        let err = PipelineConfig::builder()
            .soft_time_limit_secs(700)
            .hard_time_limit_secs(600)
            .build();
        assert!(matches!(err, Err(QuizError::InvalidConfig(_))));
    }
}
