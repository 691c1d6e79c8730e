//! Data model for the document-to-quiz pipeline.
//!
//! Everything here is a one-shot derived artefact: an [`ExtractionResult`]
//! is produced once per document and never mutated, [`Batch`]es partition it,
//! and the final ordered question collection exists only long enough to be
//! rendered and delivered. None of these types carries a lifecycle of its
//! own beyond a single request.

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Which pass produced an [`ExtractionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Native text-layer extraction.
    Direct,
    /// Wholesale forced-OCR pass over every page.
    Ocr,
}

/// Ordered per-page text for one document.
///
/// Page `i`'s text lives at index `i`; indices are contiguous from 0 by
/// construction. A page whose extraction (or OCR) produced nothing holds an
/// empty string — gaps are never allowed to arise silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pages: Vec<String>,
    method: ExtractionMethod,
}

impl ExtractionResult {
    pub fn new(pages: Vec<String>, method: ExtractionMethod) -> Self {
        Self { pages, method }
    }

    pub fn method(&self) -> ExtractionMethod {
        self.method
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<String> {
        self.pages
    }

    /// Fraction of pages whose text is blank or whitespace-only.
    ///
    /// Always in `[0, 1]`; an empty result reads as fully blank so the
    /// caller's zero-page check stays the authoritative one.
    pub fn empty_ratio(&self) -> f64 {
        if self.pages.is_empty() {
            return 1.0;
        }
        let blank = self
            .pages
            .iter()
            .filter(|p| p.trim().is_empty())
            .count();
        blank as f64 / self.pages.len() as f64
    }
}

/// A contiguous slice of page texts submitted as one unit to the generation
/// capability. `index` is the batch's position in partition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub pages: Vec<String>,
}

/// One multiple-choice question.
///
/// The wire format matches what the generation prompt asks the model for:
/// exactly four options and an answer that is literally one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    pub explanation: String,
}

impl QuizQuestion {
    /// Check the structural invariants: exactly 4 options, answer ∈ options.
    pub fn is_well_formed(&self) -> bool {
        self.options.len() == 4 && self.options.iter().any(|o| o == &self.answer)
    }
}

/// The questions produced by one generation call for one batch.
///
/// A batch the model judges irrelevant (table of contents, index pages)
/// legitimately yields zero questions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizBatch {
    pub questions: Vec<QuizQuestion>,
}

/// Outcome of generating one batch, successful or not.
///
/// Always produced — a generation failure is recorded here with zero
/// questions rather than aborting the run (losing a handful of pages beats
/// failing an entire multi-hundred-page document).
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Batch position in partition order.
    pub batch_index: usize,
    /// Which pool worker consumed this batch.
    pub worker: usize,
    pub questions: Vec<QuizQuestion>,
    pub retries: u8,
    pub error: Option<BatchError>,
}

/// Result of the upload-then-notify delivery step.
///
/// Storage and notification are independent: `stored=true, notified=false`
/// is a valid terminal outcome, and a notification failure never invalidates
/// a successful store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub stored: bool,
    pub location: Option<String>,
    pub notified: bool,
}

/// Summary of one full pipeline run (post-extraction).
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub total_batches: usize,
    pub failed_batches: usize,
    pub questions: usize,
    pub delivery: DeliveryOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_ratio_bounds() {
        let all_text =
            ExtractionResult::new(pages(&["a", "b", "c"]), ExtractionMethod::Direct);
        assert_eq!(all_text.empty_ratio(), 0.0);

        let all_blank =
            ExtractionResult::new(pages(&["", "  ", "\n\t"]), ExtractionMethod::Direct);
        assert_eq!(all_blank.empty_ratio(), 1.0);

        let half = ExtractionResult::new(pages(&["a", ""]), ExtractionMethod::Direct);
        assert_eq!(half.empty_ratio(), 0.5);
    }

    #[test]
    fn empty_ratio_counts_whitespace_only_as_blank() {
        let r = ExtractionResult::new(
            pages(&["   \n  ", "real text", "\u{00A0}x"]),
            ExtractionMethod::Direct,
        );
        // Only the first page is blank; NBSP followed by 'x' is content.
        assert!((r.empty_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn question_well_formedness() {
        let mut q = QuizQuestion {
            question: "Capital of France?".into(),
            options: pages(&["Paris", "London", "Berlin", "Madrid"]),
            answer: "Paris".into(),
            explanation: "Paris is the capital of France.".into(),
        };
        assert!(q.is_well_formed());

        q.answer = "Rome".into();
        assert!(!q.is_well_formed());

        q.answer = "Paris".into();
        q.options.pop();
        assert!(!q.is_well_formed());
    }
}
