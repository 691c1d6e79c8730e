//! # pdf2quiz
//!
//! Turn PDF documents into multiple-choice quizzes with LLMs.
//!
//! ## Why this crate?
//!
//! Writing a good quiz from a long document is slow, repetitive work. This
//! crate automates the whole path: it extracts per-page text (falling back
//! to OCR when the PDF has no usable text layer), fans the pages out to a
//! bounded pool of generation workers, renders the collected questions into
//! a printable PDF, then uploads the result and emails the requester a
//! download link.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Ingest   size gate, fetch from storage with retry/backoff
//!  ├─ 2. Extract  pdfium text layer; wholesale OCR when >90 % blank
//!  ├─ 3. Batch    partition pages into fixed-capacity batches of 10
//!  ├─ 4. Generate 3 workers pull batches from a sentinel-terminated queue
//!  ├─ 5. Render   questions → paginated A4 PDF (printpdf)
//!  └─ 6. Deliver  upload under a fresh key + email notification
//! ```
//!
//! Per-batch generation failures are absorbed: the delivered quiz simply
//! contains fewer questions. Only an unreadable document, a gate, or a
//! failed upload fails a run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2quiz::{Collaborators, IngestionTask, PipelineConfig};
//! use pdf2quiz::pipeline::extract::PdfiumExtractor;
//! use pdf2quiz::pipeline::generate::LlmQuizGenerator;
//! use pdf2quiz::notify::BrevoNotifier;
//! use pdf2quiz::storage::S3CompatibleStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::default();
//!     let deps = Collaborators {
//!         store: Arc::new(S3CompatibleStore::from_env()?),
//!         extractor: Arc::new(PdfiumExtractor::new(config.clone())),
//!         generator: Arc::new(LlmQuizGenerator::from_config(&config)?),
//!         notifier: Arc::new(BrevoNotifier::from_env()?),
//!     };
//!     let task = IngestionTask::new(deps, config);
//!     let report = task.run("uploads/lecture.pdf", "student@example.com").await;
//!     println!("{:?}", report.state);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2quiz` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pdf2quiz = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod delivery;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod prompts;
pub mod quiz;
pub mod storage;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{BatchError, DeadlineKind, QuizError};
pub use notify::Notifier;
pub use pipeline::extract::TextExtractor;
pub use pipeline::generate::QuizGenerator;
pub use pipeline::run_pipeline;
pub use quiz::{
    Batch, BatchResult, DeliveryOutcome, ExtractionMethod, ExtractionResult, PipelineReport,
    QuizBatch, QuizQuestion,
};
pub use storage::ObjectStore;
pub use task::{IngestionTask, TaskReport, TaskState};

use std::sync::Arc;

/// The capability set the pipeline and ingestion task operate through.
///
/// Every external effect — storage, extraction, generation, notification —
/// goes through a trait object here, so tests swap in in-memory fakes and
/// production wires up pdfium, an LLM provider, and HTTP clients.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ObjectStore>,
    pub extractor: Arc<dyn TextExtractor>,
    pub generator: Arc<dyn QuizGenerator>,
    pub notifier: Arc<dyn Notifier>,
}
