//! The generation capability: turn a batch of page texts into quiz questions.
//!
//! The capability itself is a trait so the pool, the ingestion task, and the
//! integration tests never care whether questions come from a live LLM or a
//! canned fake. [`LlmQuizGenerator`] is the production implementation over
//! the `edgequake-llm` provider abstraction.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s, totalling < 4 s of back-off per batch. A batch
//! that still fails is recorded with zero questions — never propagated.

use crate::config::PipelineConfig;
use crate::error::{BatchError, QuizError};
use crate::prompts::QUIZ_SYSTEM_PROMPT;
use crate::quiz::{Batch, BatchResult, QuizBatch, QuizQuestion};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// External capability that converts one batch of page texts into questions.
///
/// Implementations may fail or time out; the pool treats any failure as
/// "zero questions for this batch", never as fatal to the run. The error
/// type is a plain detail string because the failure is absorbed into a
/// [`BatchError`] at the call site.
#[async_trait]
pub trait QuizGenerator: Send + Sync {
    async fn generate(&self, batch: &Batch) -> Result<QuizBatch, String>;
}

/// Run one batch through the generator with timeout, retry, and backoff.
///
/// Always returns a [`BatchResult`] — a failed batch carries
/// `error: Some(..)` and an empty question list so the caller can report
/// partial completeness without special cases.
pub async fn process_batch(
    generator: &Arc<dyn QuizGenerator>,
    batch: &Batch,
    worker: usize,
    config: &PipelineConfig,
) -> BatchResult {
    let start = Instant::now();
    let call_budget = Duration::from_secs(config.generation_timeout_secs);
    let mut last_err: Option<String> = None;
    let mut timed_out = false;

    for attempt in 0..=config.generation_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Batch {}: retry {}/{} after {}ms",
                batch.index, attempt, config.generation_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_budget, generator.generate(batch)).await {
            Ok(Ok(quiz_batch)) => {
                debug!(
                    "Batch {}: {} questions in {:?} (worker {})",
                    batch.index,
                    quiz_batch.questions.len(),
                    start.elapsed(),
                    worker
                );
                return BatchResult {
                    batch_index: batch.index,
                    worker,
                    questions: quiz_batch.questions,
                    retries: attempt as u8,
                    error: None,
                };
            }
            Ok(Err(detail)) => {
                warn!(
                    "Batch {}: attempt {} failed — {}",
                    batch.index,
                    attempt + 1,
                    detail
                );
                timed_out = false;
                last_err = Some(detail);
            }
            Err(_) => {
                warn!(
                    "Batch {}: attempt {} timed out after {}s",
                    batch.index,
                    attempt + 1,
                    config.generation_timeout_secs
                );
                timed_out = true;
                last_err = None;
            }
        }
    }

    let error = if timed_out {
        BatchError::Timeout {
            batch: batch.index,
            secs: config.generation_timeout_secs,
        }
    } else {
        BatchError::Generation {
            batch: batch.index,
            retries: config.generation_retries as u8,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        }
    };

    BatchResult {
        batch_index: batch.index,
        worker,
        questions: Vec::new(),
        retries: config.generation_retries as u8,
        error: Some(error),
    }
}

/// LLM-backed generation capability.
///
/// Sends the batch's pages as a JSON array in a single user turn and parses
/// the JSON array the prompt demands back out of the response. Questions
/// that fail the structural invariants (4 options, answer ∈ options) are
/// dropped with a warning rather than poisoning the whole batch.
pub struct LlmQuizGenerator {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmQuizGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| QUIZ_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Build a generator from the config's provider settings.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, QuizError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl QuizGenerator for LlmQuizGenerator {
    async fn generate(&self, batch: &Batch) -> Result<QuizBatch, String> {
        let payload =
            serde_json::to_string(&batch.pages).map_err(|e| format!("serialise batch: {e}"))?;

        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(payload),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| format!("{e}"))?;

        parse_question_array(&response.content, batch.index)
    }
}

/// Parse the model's response into a [`QuizBatch`].
///
/// Tolerates a fenced response despite the prompt forbidding fences —
/// smaller models add them anyway. Ill-formed questions are dropped with a
/// warning; an unparseable response is a batch failure.
fn parse_question_array(content: &str, batch_index: usize) -> Result<QuizBatch, String> {
    let trimmed = strip_fences(content);

    let parsed: Vec<QuizQuestion> = serde_json::from_str(trimmed)
        .map_err(|e| format!("response is not a question array: {e}"))?;

    let total = parsed.len();
    let questions: Vec<QuizQuestion> = parsed.into_iter().filter(|q| q.is_well_formed()).collect();
    if questions.len() < total {
        warn!(
            "Batch {}: dropped {} ill-formed question(s)",
            batch_index,
            total - questions.len()
        );
    }

    Ok(QuizBatch { questions })
}

/// Strip a single wrapping code fence, with or without a language tag.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed
///    and configured the provider entirely; used as-is. This is also the
///    test seam.
/// 2. **Named provider + model** (`config.provider_name`) — reads the
///    corresponding API key from the environment via the factory.
/// 3. **OpenAI preference** — when `OPENAI_API_KEY` is set, default to
///    OpenAI even if other provider keys are present.
/// 4. **Full auto-detection** — the factory scans all known API key
///    variables and picks the first available provider.
pub(crate) fn resolve_provider(
    config: &PipelineConfig,
) -> Result<Arc<dyn LLMProvider>, QuizError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_provider(name, model);
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| QuizError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                 Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, QuizError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        QuizError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question_json() -> &'static str {
        r#"[
            {
                "question": "According to the Public Service Rules, who is a junior officer?",
                "options": ["GL.06 and below", "GL.07 and above", "Contract staff", "Appointees"],
                "answer": "GL.06 and below",
                "explanation": "The PSR defines a junior officer as GL.06 and below."
            }
        ]"#
    }

    #[test]
    fn parses_plain_array() {
        let batch = parse_question_array(question_json(), 0).unwrap();
        assert_eq!(batch.questions.len(), 1);
        assert!(batch.questions[0].is_well_formed());
    }

    #[test]
    fn parses_fenced_array() {
        let fenced = format!("```json\n{}\n```", question_json());
        let batch = parse_question_array(&fenced, 0).unwrap();
        assert_eq!(batch.questions.len(), 1);
    }

    #[test]
    fn empty_array_is_a_valid_zero_question_batch() {
        let batch = parse_question_array("[]", 0).unwrap();
        assert!(batch.questions.is_empty());
    }

    #[test]
    fn drops_ill_formed_questions() {
        let mixed = r#"[
            {"question": "q1", "options": ["a", "b", "c", "d"], "answer": "a", "explanation": "e"},
            {"question": "q2", "options": ["a", "b"], "answer": "a", "explanation": "e"},
            {"question": "q3", "options": ["a", "b", "c", "d"], "answer": "z", "explanation": "e"}
        ]"#;
        let batch = parse_question_array(mixed, 0).unwrap();
        assert_eq!(batch.questions.len(), 1);
        assert_eq!(batch.questions[0].question, "q1");
    }

    #[test]
    fn garbage_is_a_batch_failure() {
        assert!(parse_question_array("not json", 0).is_err());
    }

    struct FailingGenerator;

    #[async_trait]
    impl QuizGenerator for FailingGenerator {
        async fn generate(&self, _batch: &Batch) -> Result<QuizBatch, String> {
            Err("HTTP 503".into())
        }
    }

    #[tokio::test]
    async fn process_batch_absorbs_failure() {
        let generator: Arc<dyn QuizGenerator> = Arc::new(FailingGenerator);
        let config = PipelineConfig::builder()
            .generation_retries(1)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        let batch = Batch {
            index: 4,
            pages: vec!["text".into()],
        };

        let result = process_batch(&generator, &batch, 0, &config).await;
        assert_eq!(result.batch_index, 4);
        assert!(result.questions.is_empty());
        assert!(matches!(
            result.error,
            Some(BatchError::Generation { batch: 4, .. })
        ));
    }
}
