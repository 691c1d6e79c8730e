//! Pipeline stages for document-to-quiz generation.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets us swap
//! implementations (e.g. a different OCR backend) without touching other
//! stages.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ batch ──▶ pool ──▶ merge ──▶ render ──▶ deliver
//! (pdfium/OCR) (pure)  (W workers) (ordered) (printpdf) (upload+notify)
//! ```
//!
//! 1. [`extract`] — per-page text via the pdfium text layer, with a
//!    wholesale OCR fallback when the document is mostly blank
//! 2. [`ocr`]     — the fallback itself: rasterise + vision transcription
//! 3. [`batch`]   — pure partitioning into fixed-capacity page batches
//! 4. [`generate`] — the generation capability with retry/backoff; the
//!    only stage with per-batch network I/O
//! 5. [`pool`]    — sentinel-terminated worker pool bounding generation
//!    concurrency, plus ordered aggregation
//! 6. [`render`]  — deterministic text layout serialised through printpdf

pub mod batch;
pub mod extract;
pub mod generate;
pub mod ocr;
pub mod pool;
pub mod render;

use crate::config::PipelineConfig;
use crate::delivery;
use crate::error::QuizError;
use crate::quiz::PipelineReport;
use crate::Collaborators;
use tokio::sync::watch;
use tracing::{info, warn};

/// Run the post-extraction pipeline: batch, generate, render, deliver.
///
/// This is the independent unit of work the ingestion task schedules after
/// a successful extraction. `cancel` stops the worker pool's future
/// dequeues when flipped; in-flight generation calls finish on their own
/// timeouts.
///
/// Per-batch generation failures degrade output completeness (the report
/// carries the count) but only an upload failure or a render failure makes
/// the run itself fail.
pub async fn run_pipeline(
    pages: Vec<String>,
    email: String,
    deps: Collaborators,
    config: PipelineConfig,
    cancel: watch::Receiver<bool>,
) -> Result<PipelineReport, QuizError> {
    let batches = batch::partition(&pages, config.batch_capacity);
    let total_batches = batches.len();
    info!(
        "Starting quiz generation: {} page(s) in {} batch(es), {} worker(s)",
        pages.len(),
        total_batches,
        config.workers
    );

    let per_worker =
        pool::run_pool(deps.generator.clone(), batches, &config, cancel).await;
    let (questions, results) = pool::merge(per_worker);

    let failed_batches = results.iter().filter(|r| r.error.is_some()).count();
    if failed_batches > 0 {
        warn!(
            "{}/{} batch(es) failed generation; continuing with {} question(s)",
            failed_batches,
            total_batches,
            questions.len()
        );
    }

    let pdf_bytes = render::render_pdf(&questions)?;
    let outcome = delivery::deliver(&deps.store, &deps.notifier, pdf_bytes, &email).await?;

    Ok(PipelineReport {
        total_batches,
        failed_batches,
        questions: questions.len(),
        delivery: outcome,
    })
}
