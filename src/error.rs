//! Error types for the pdf2quiz library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`QuizError`] — **Fatal**: the run cannot proceed at all (unreadable
//!   document, size gate, retries exhausted, upload failure). Returned as
//!   `Err(QuizError)` from the top-level pipeline and task functions.
//!
//! * [`BatchError`] — **Non-fatal**: a single batch of pages failed
//!   generation (transient API error, timeout) but every other batch is
//!   fine. Stored inside [`crate::quiz::BatchResult`] so a multi-hundred-page
//!   document never fails wholesale because one batch misbehaved.
//!
//! Notification failures deserve a special note: once the rendered quiz is
//! stored, a failed email must never flip the overall outcome to failure.
//! [`QuizError::Notification`] therefore only ever appears in logs and in
//! `DeliveryOutcome::notified`, never as a task result.

use thiserror::Error;

/// All fatal errors returned by the pdf2quiz library.
///
/// Batch-level failures use [`BatchError`] and are stored in
/// [`crate::quiz::BatchResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum QuizError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The document could not be opened or read as a PDF.
    #[error("Failed to extract text from document: {detail}")]
    Extraction { detail: String },

    /// Extraction produced zero pages.
    #[error("Document yielded no pages")]
    EmptyInput,

    /// The extracted page count exceeds the processing ceiling.
    #[error("Document has {pages} pages, maximum allowed is {limit}")]
    TooManyPages { pages: usize, limit: usize },

    /// The input string is not a PDF (extension or magic-byte check failed).
    #[error("File is not a valid PDF: '{input}'")]
    NotAPdf { input: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The stored object exceeds the ingestion size ceiling.
    #[error("Object is {size_mb:.1} MB, maximum allowed is {limit_mb} MB")]
    SizeLimitExceeded { size_mb: f64, limit_mb: u64 },

    /// A retryable storage failure during fetch/download.
    #[error("Transient storage error for '{key}': {detail}")]
    TransientStorage { key: String, detail: String },

    /// The fetch retry ceiling was exhausted.
    #[error("Storage fetch for '{key}' failed after {retries} retries: {detail}")]
    RetriesExhausted {
        key: String,
        retries: u32,
        detail: String,
    },

    /// The rendered quiz could not be uploaded. Notification is skipped.
    #[error("Upload failed: {detail}")]
    Upload { detail: String },

    /// The completion notification could not be dispatched.
    ///
    /// Logged and absorbed by delivery — `stored=true, notified=false` is a
    /// valid terminal outcome.
    #[error("Notification to '{to}' failed: {detail}")]
    Notification { to: String, detail: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// printpdf could not serialise the quiz document.
    #[error("Quiz rendering failed: {detail}")]
    Render { detail: String },

    /// The LLM provider backing generation or OCR is not configured.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A task time budget elapsed.
    #[error("Task exceeded its {kind} time budget of {secs}s")]
    DeadlineExceeded { kind: DeadlineKind, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuizError {
    /// Whether the ingestion task may retry the failing step.
    ///
    /// Only transient storage failures are retryable; everything else is a
    /// document- or configuration-level fault that retrying cannot fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, QuizError::TransientStorage { .. })
    }
}

/// Which of the two task time budgets elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineKind {
    /// Graceful early termination between pipeline stages.
    Soft,
    /// Forcible termination of the whole task.
    Hard,
}

impl std::fmt::Display for DeadlineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeadlineKind::Soft => write!(f, "soft"),
            DeadlineKind::Hard => write!(f, "hard"),
        }
    }
}

/// A non-fatal error for a single batch of pages.
///
/// Stored alongside [`crate::quiz::BatchResult`] when generation fails.
/// The failed batch contributes zero questions; the run continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum BatchError {
    /// Generation call failed after retries.
    #[error("Batch {batch}: generation failed after {retries} retries: {detail}")]
    Generation {
        batch: usize,
        retries: u8,
        detail: String,
    },

    /// Generation call timed out.
    #[error("Batch {batch}: generation timed out after {secs}s")]
    Timeout { batch: usize, secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_limit_display() {
        let e = QuizError::SizeLimitExceeded {
            size_mb: 50.1,
            limit_mb: 50,
        };
        let msg = e.to_string();
        assert!(msg.contains("50.1"), "got: {msg}");
        assert!(msg.contains("50 MB"), "got: {msg}");
    }

    #[test]
    fn transient_classification() {
        let transient = QuizError::TransientStorage {
            key: "uploads/a.pdf".into(),
            detail: "connection reset".into(),
        };
        assert!(transient.is_transient());

        let gated = QuizError::SizeLimitExceeded {
            size_mb: 51.0,
            limit_mb: 50,
        };
        assert!(!gated.is_transient());
    }

    #[test]
    fn deadline_display() {
        let e = QuizError::DeadlineExceeded {
            kind: DeadlineKind::Soft,
            secs: 300,
        };
        assert!(e.to_string().contains("soft"));
        assert!(e.to_string().contains("300"));
    }

    #[test]
    fn batch_error_display() {
        let e = BatchError::Generation {
            batch: 2,
            retries: 3,
            detail: "HTTP 503".into(),
        };
        assert!(e.to_string().contains("Batch 2"));
        assert!(e.to_string().contains("HTTP 503"));
    }
}
