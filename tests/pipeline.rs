//! End-to-end pipeline tests over in-memory capability fakes.
//!
//! Every external effect (storage, extraction, generation, notification)
//! goes through the trait seams in [`pdf2quiz::Collaborators`], so the full
//! ingest → extract → batch → generate → render → deliver path runs here
//! without pdfium, an LLM key, or the network. Time-dependent tests run on
//! tokio's paused clock and never actually sleep.

use async_trait::async_trait;
use pdf2quiz::pipeline::extract::needs_ocr;
use pdf2quiz::pipeline::run_pipeline;
use pdf2quiz::{
    Batch, Collaborators, ExtractionMethod, ExtractionResult, IngestionTask, Notifier,
    ObjectStore, PipelineConfig, QuizBatch, QuizError, QuizGenerator, QuizQuestion, TaskState,
    TextExtractor,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

// ── Fakes ────────────────────────────────────────────────────────────────

/// Extractor that returns canned pages regardless of input bytes.
struct FakeExtractor {
    pages: Vec<String>,
}

impl FakeExtractor {
    fn with_pages(n: usize) -> Self {
        FakeExtractor {
            pages: (1..=n).map(|i| format!("Content of page {i}")).collect(),
        }
    }
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, _pdf: &Path) -> Result<ExtractionResult, QuizError> {
        Ok(ExtractionResult::new(
            self.pages.clone(),
            ExtractionMethod::Direct,
        ))
    }
}

/// Generator producing one question per page, failing selected batches.
struct FakeGenerator {
    fail_batches: Vec<usize>,
}

impl FakeGenerator {
    fn reliable() -> Self {
        FakeGenerator {
            fail_batches: vec![],
        }
    }

    fn failing(batches: Vec<usize>) -> Self {
        FakeGenerator {
            fail_batches: batches,
        }
    }
}

#[async_trait]
impl QuizGenerator for FakeGenerator {
    async fn generate(&self, batch: &Batch) -> Result<QuizBatch, String> {
        if self.fail_batches.contains(&batch.index) {
            return Err("simulated provider outage".to_string());
        }
        let questions = batch
            .pages
            .iter()
            .map(|page| QuizQuestion {
                question: format!("[batch {}] What does this page say: {page}?", batch.index),
                options: vec![
                    "Alpha".to_string(),
                    "Beta".to_string(),
                    "Gamma".to_string(),
                    "Delta".to_string(),
                ],
                answer: "Alpha".to_string(),
                explanation: "The page says so.".to_string(),
            })
            .collect();
        Ok(QuizBatch { questions })
    }
}

/// In-memory object store with scriptable head size and fetch failures.
struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    head_size: u64,
    /// Number of leading head/get calls that fail transiently.
    transient_failures: AtomicUsize,
    gets: AtomicUsize,
}

impl MemoryStore {
    fn with_head_size(head_size: u64) -> Self {
        MemoryStore {
            objects: Mutex::new(HashMap::new()),
            head_size,
            transient_failures: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
        }
    }

    fn flaky(head_size: u64, failures: usize) -> Self {
        let store = Self::with_head_size(head_size);
        store.transient_failures.store(failures, Ordering::SeqCst);
        store
    }

    fn stored_keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn stored_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    fn consume_failure(&self, key: &str) -> Result<(), QuizError> {
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(QuizError::TransientStorage {
                key: key.to_string(),
                detail: "connection reset".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, QuizError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes);
        Ok(format!("mem://{key}"))
    }

    async fn head_object(&self, key: &str) -> Result<u64, QuizError> {
        self.consume_failure(key)?;
        Ok(self.head_size)
    }

    async fn get_object(&self, _key: &str) -> Result<Vec<u8>, QuizError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(b"%PDF-1.7 fake".to_vec())
    }

    async fn presign_put(&self, key: &str, _content_type: &str) -> Result<String, QuizError> {
        Ok(format!("mem://presigned/{key}"))
    }
}

/// Notifier recording every sent message.
#[derive(Default)]
struct MemoryNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl MemoryNotifier {
    fn messages(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), QuizError> {
        self.sent.lock().unwrap().push((
            to.to_string(),
            subject.to_string(),
            html_body.to_string(),
        ));
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn test_config() -> PipelineConfig {
    PipelineConfig::default()
}

fn deps(
    store: Arc<MemoryStore>,
    notifier: Arc<MemoryNotifier>,
    extractor: FakeExtractor,
    generator: FakeGenerator,
) -> Collaborators {
    Collaborators {
        store,
        extractor: Arc::new(extractor),
        generator: Arc::new(generator),
        notifier,
    }
}

fn pages(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("Content of page {i}")).collect()
}

fn no_cancel() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

// ── Full pipeline ────────────────────────────────────────────────────────

#[tokio::test]
async fn twelve_pages_become_two_batches_one_upload_one_email() {
    let store = Arc::new(MemoryStore::with_head_size(1024));
    let notifier = Arc::new(MemoryNotifier::default());
    let deps = deps(
        store.clone(),
        notifier.clone(),
        FakeExtractor::with_pages(12),
        FakeGenerator::reliable(),
    );

    let report = run_pipeline(
        pages(12),
        "student@example.com".to_string(),
        deps,
        test_config(),
        no_cancel(),
    )
    .await
    .unwrap();

    // 12 pages at capacity 10 split into batches of 10 and 2.
    assert_eq!(report.total_batches, 2);
    assert_eq!(report.failed_batches, 0);
    assert_eq!(report.questions, 12);
    assert!(report.delivery.stored);
    assert!(report.delivery.notified);

    let keys = store.stored_keys();
    assert_eq!(keys.len(), 1, "exactly one upload per run");
    assert!(keys[0].starts_with("results/quiz_"));
    assert!(keys[0].ends_with(".pdf"));
    let bytes = store.stored_bytes(&keys[0]).unwrap();
    assert!(bytes.starts_with(b"%PDF"), "stored object is a PDF");

    let sent = notifier.messages();
    assert_eq!(sent.len(), 1, "exactly one notification per run");
    assert_eq!(sent[0].0, "student@example.com");
    assert!(
        sent[0].2.contains(&report.delivery.location.clone().unwrap()),
        "email body carries the download location"
    );
}

#[tokio::test]
async fn failed_batch_degrades_output_without_failing_the_run() {
    let store = Arc::new(MemoryStore::with_head_size(1024));
    let notifier = Arc::new(MemoryNotifier::default());
    let deps = deps(
        store.clone(),
        notifier.clone(),
        FakeExtractor::with_pages(25),
        FakeGenerator::failing(vec![1]),
    );

    let report = run_pipeline(
        pages(25),
        "student@example.com".to_string(),
        deps,
        test_config(),
        no_cancel(),
    )
    .await
    .unwrap();

    // 25 pages → batches of 10, 10, 5; the middle batch contributes nothing.
    assert_eq!(report.total_batches, 3);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.questions, 15);
    assert!(report.delivery.stored);
    assert!(report.delivery.notified, "delivery proceeds despite the gap");
    assert_eq!(store.stored_keys().len(), 1);
}

#[tokio::test]
async fn empty_page_ratio_drives_the_ocr_decision() {
    let blank = ExtractionResult::new(vec![String::new(); 5], ExtractionMethod::Direct);
    assert_eq!(blank.empty_ratio(), 1.0);
    assert!(needs_ocr(blank.empty_ratio(), 0.9));

    // 9 of 10 blank is exactly 0.9 — at the threshold the direct result
    // stands (strictly greater-than).
    let mut mostly_blank = vec![String::new(); 9];
    mostly_blank.push("Real text".to_string());
    let result = ExtractionResult::new(mostly_blank, ExtractionMethod::Direct);
    assert_eq!(result.empty_ratio(), 0.9);
    assert!(!needs_ocr(result.empty_ratio(), 0.9));
}

// ── Ingestion task ───────────────────────────────────────────────────────

#[tokio::test]
async fn oversized_object_is_gated_without_download() {
    let store = Arc::new(MemoryStore::with_head_size(51 * 1024 * 1024));
    let notifier = Arc::new(MemoryNotifier::default());
    let deps = deps(
        store.clone(),
        notifier.clone(),
        FakeExtractor::with_pages(5),
        FakeGenerator::reliable(),
    );
    let task = IngestionTask::new(deps, test_config());

    let report = task.run("uploads/huge.pdf", "student@example.com").await;

    assert_eq!(report.state, TaskState::Gated);
    assert_eq!(report.stage, TaskState::Fetching, "size gate fires while fetching");
    assert!(report.last_error.unwrap().contains("MB"));
    assert_eq!(
        store.gets.load(Ordering::SeqCst),
        0,
        "gated objects are never downloaded"
    );
}

#[tokio::test]
async fn object_at_exactly_the_size_limit_is_accepted() {
    let store = Arc::new(MemoryStore::with_head_size(50 * 1024 * 1024));
    let notifier = Arc::new(MemoryNotifier::default());
    let deps = deps(
        store.clone(),
        notifier.clone(),
        FakeExtractor::with_pages(5),
        FakeGenerator::reliable(),
    );
    let task = IngestionTask::new(deps, test_config());

    let report = task.run("uploads/exactly50.pdf", "student@example.com").await;

    assert_eq!(report.state, TaskState::Scheduled);
    assert_eq!(report.retry_count, 0);
    assert_eq!(store.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn too_many_pages_is_gated_before_generation() {
    let store = Arc::new(MemoryStore::with_head_size(1024));
    let notifier = Arc::new(MemoryNotifier::default());
    let deps = deps(
        store.clone(),
        notifier.clone(),
        FakeExtractor::with_pages(301),
        FakeGenerator::reliable(),
    );
    let task = IngestionTask::new(deps, test_config());

    let report = task.run("uploads/tome.pdf", "student@example.com").await;

    assert_eq!(report.state, TaskState::Gated);
    assert_eq!(report.stage, TaskState::Extracting, "page gate fires after extraction");
    let detail = report.last_error.unwrap();
    assert!(detail.contains("301"), "got: {detail}");
    assert!(detail.contains("300"), "got: {detail}");
    assert!(store.stored_keys().is_empty(), "nothing was generated");
}

#[tokio::test(start_paused = true)]
async fn transient_fetch_failures_are_retried_with_backoff() {
    let store = Arc::new(MemoryStore::flaky(1024, 2));
    let notifier = Arc::new(MemoryNotifier::default());
    let deps = deps(
        store.clone(),
        notifier.clone(),
        FakeExtractor::with_pages(5),
        FakeGenerator::reliable(),
    );
    let task = IngestionTask::new(deps, test_config());

    let started = tokio::time::Instant::now();
    let report = task.run("uploads/flaky.pdf", "student@example.com").await;
    let elapsed = started.elapsed();

    assert_eq!(report.state, TaskState::Scheduled);
    assert_eq!(report.retry_count, 2);
    // Two retries back off 1s then 2s; the paused clock only moves for the
    // sleeps, so the schedule is visible in elapsed virtual time.
    assert!(
        elapsed >= Duration::from_secs(3),
        "expected at least 1s + 2s of backoff, got {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_secs(4),
        "a third backoff step should not have run, got {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_task() {
    // More consecutive transient failures than the retry ceiling allows.
    let store = Arc::new(MemoryStore::flaky(1024, 10));
    let notifier = Arc::new(MemoryNotifier::default());
    let deps = deps(
        store.clone(),
        notifier.clone(),
        FakeExtractor::with_pages(5),
        FakeGenerator::reliable(),
    );
    let task = IngestionTask::new(deps, test_config());

    let report = task.run("uploads/down.pdf", "student@example.com").await;

    assert_eq!(report.state, TaskState::Failed);
    assert_eq!(report.stage, TaskState::Fetching);
    assert_eq!(report.retry_count, 3);
    let detail = report.last_error.unwrap();
    assert!(detail.contains("after 3 retries"), "got: {detail}");
}

#[tokio::test]
async fn zero_pages_terminate_cleanly() {
    let store = Arc::new(MemoryStore::with_head_size(1024));
    let notifier = Arc::new(MemoryNotifier::default());
    let deps = deps(
        store.clone(),
        notifier.clone(),
        FakeExtractor { pages: vec![] },
        FakeGenerator::reliable(),
    );

    let report = run_pipeline(
        vec![],
        "student@example.com".to_string(),
        deps,
        test_config(),
        no_cancel(),
    )
    .await
    .unwrap();

    // Zero pages still terminate cleanly: no batches, an empty quiz PDF.
    assert_eq!(report.total_batches, 0);
    assert_eq!(report.questions, 0);
    assert!(report.delivery.stored);
}
