//! Page-level text extraction with an OCR fallback.
//!
//! ## The fallback policy
//!
//! The direct pass reads the PDF's native text layer via pdfium — cheap and
//! accurate for digitally produced documents. Scanned documents have no text
//! layer, so the direct pass comes back mostly blank. When the blank-page
//! ratio exceeds the configured threshold (default 0.9, strictly
//! greater-than), the direct result is discarded wholesale and the entire
//! document is re-extracted through the OCR pass instead. Sources are never
//! mixed per page: a result is either all-direct or all-OCR.
//!
//! OCR is the expensive branch — it rasterises every page and runs a vision
//! call per page — so it carries its own, longer timeout distinct from the
//! direct pass.
//!
//! ## Why spawn_blocking?
//!
//! pdfium wraps a C++ library with thread-local state that is not safe to
//! call from async contexts. `tokio::task::spawn_blocking` keeps the
//! CPU-bound extraction off the runtime worker threads.

use crate::config::PipelineConfig;
use crate::error::QuizError;
use crate::pipeline::ocr;
use crate::quiz::{ExtractionMethod, ExtractionResult};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::future::Future;
use std::path::Path;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// Capability that turns a PDF on disk into ordered per-page text.
///
/// A trait so the ingestion task and the integration tests can substitute a
/// fake; [`PdfiumExtractor`] is the production implementation.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, pdf: &Path) -> Result<ExtractionResult, QuizError>;
}

/// Whether the direct result must be rejected in favour of OCR.
///
/// Strictly greater-than: a document at exactly the threshold keeps its
/// direct extraction.
pub fn needs_ocr(empty_ratio: f64, threshold: f64) -> bool {
    empty_ratio > threshold
}

/// pdfium-backed extractor: direct text layer, OCR fallback.
pub struct PdfiumExtractor {
    config: PipelineConfig,
}

impl PdfiumExtractor {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }
}

/// Fallback policy over two interchangeable passes.
///
/// Runs the direct pass, measures its blank-page ratio, and either keeps it
/// or throws it away and runs the OCR pass over the entire document. Exactly
/// one pass produces the returned pages: per-page mixing never happens.
///
/// Generic over the passes so the policy is exercised without pdfium or a
/// vision provider; [`PdfiumExtractor`] wires in the real ones.
async fn extract_with_fallback<D, O, DFut, OFut>(
    direct_pass: D,
    ocr_pass: O,
    threshold: f64,
) -> Result<ExtractionResult, QuizError>
where
    D: FnOnce() -> DFut,
    O: FnOnce() -> OFut,
    DFut: Future<Output = Result<Vec<String>, QuizError>>,
    OFut: Future<Output = Result<Vec<String>, QuizError>>,
{
    let pages = direct_pass().await?;

    if pages.is_empty() {
        return Err(QuizError::EmptyInput);
    }

    let direct = ExtractionResult::new(pages, ExtractionMethod::Direct);
    let ratio = direct.empty_ratio();
    debug!(
        "Direct extraction: {} pages, empty ratio {:.2}",
        direct.page_count(),
        ratio
    );

    if !needs_ocr(ratio, threshold) {
        return Ok(direct);
    }

    info!(
        "{:.0}% of pages are blank (threshold {:.0}%), re-extracting whole document via OCR",
        ratio * 100.0,
        threshold * 100.0
    );

    let ocr_pages = ocr_pass().await?;
    Ok(ExtractionResult::new(ocr_pages, ExtractionMethod::Ocr))
}

#[async_trait]
impl TextExtractor for PdfiumExtractor {
    async fn extract(&self, pdf: &Path) -> Result<ExtractionResult, QuizError> {
        let direct_budget = Duration::from_secs(self.config.extract_timeout_secs);
        let ocr_budget = Duration::from_secs(self.config.ocr_timeout_secs);

        extract_with_fallback(
            || async move {
                timeout(direct_budget, extract_text_layer(pdf))
                    .await
                    .map_err(|_| QuizError::Extraction {
                        detail: format!(
                            "direct extraction timed out after {}s",
                            self.config.extract_timeout_secs
                        ),
                    })?
            },
            || async move {
                timeout(ocr_budget, ocr::ocr_extract(pdf, &self.config))
                    .await
                    .map_err(|_| QuizError::Extraction {
                        detail: format!(
                            "OCR pass timed out after {}s",
                            self.config.ocr_timeout_secs
                        ),
                    })?
            },
            self.config.empty_page_threshold,
        )
        .await
    }
}

/// Direct text-layer pass: one string per page, in page order.
///
/// A page without a text layer yields an empty string — indices stay
/// contiguous so the emptiness ratio and all downstream batching see the
/// true page count.
async fn extract_text_layer(pdf_path: &Path) -> Result<Vec<String>, QuizError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || extract_text_layer_blocking(&path))
        .await
        .map_err(|e| QuizError::Internal(format!("Extraction task panicked: {e}")))?
}

fn extract_text_layer_blocking(pdf_path: &Path) -> Result<Vec<String>, QuizError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| QuizError::Extraction {
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let mut texts = Vec::with_capacity(pages.len() as usize);

    for page in pages.iter() {
        let text = page.text().map(|t| t.all()).unwrap_or_default();
        texts.push(text);
    }

    Ok(texts)
}
