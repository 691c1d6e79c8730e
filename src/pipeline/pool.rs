//! The bounded worker pool: a sentinel-terminated shared queue feeding a
//! fixed number of concurrent generation workers.
//!
//! ## Protocol
//!
//! One producer enqueues every batch in partition order, then exactly `W`
//! stop sentinels — one per worker. Each worker loops dequeue → generate →
//! accumulate, and exits after consuming exactly one sentinel. Because the
//! sentinels sit behind all the work items in FIFO order, every batch is
//! consumed exactly once and every worker is guaranteed exactly one
//! termination event, no matter how unevenly work was distributed.
//!
//! The queue (an unbounded mpsc channel behind a mutex-guarded receiver) is
//! the only synchronization point; a worker's accumulator is merged into the
//! final collection only after that worker has observed its sentinel and
//! joined.
//!
//! ## Failure and cancellation
//!
//! A generation failure on one batch is absorbed into its [`BatchResult`]
//! and never halts the other workers. Cancellation is observed between
//! dequeues: flipping the watch flag stops future dequeues while in-flight
//! generation calls run to their own timeout.

use crate::config::PipelineConfig;
use crate::pipeline::generate::{process_batch, QuizGenerator};
use crate::quiz::{Batch, BatchResult, QuizQuestion};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// A queue item: either work or the designated stop signal.
enum QueueItem {
    Work(Batch),
    Stop,
}

/// Shared receiving side of the batch queue.
type SharedQueue = Arc<Mutex<mpsc::UnboundedReceiver<QueueItem>>>;

/// Run `config.workers` concurrent workers over the given batches.
///
/// Returns one accumulator per worker, in worker order. Within an
/// accumulator, results appear in the order that worker consumed its
/// batches; interleaving across workers is unordered.
///
/// `cancel` stops future dequeues when set to `true`; workers drain nothing
/// further and exit after their current batch.
pub async fn run_pool(
    generator: Arc<dyn QuizGenerator>,
    batches: Vec<Batch>,
    config: &PipelineConfig,
    cancel: watch::Receiver<bool>,
) -> Vec<Vec<BatchResult>> {
    let workers = config.workers;
    let total = batches.len();

    let (tx, rx) = mpsc::unbounded_channel();

    // Producer side: all work first, then one sentinel per worker. The
    // channel is unbounded so the producer can never block against its own
    // consumers.
    for batch in batches {
        // send only fails if the receiver is gone, which cannot happen here
        let _ = tx.send(QueueItem::Work(batch));
    }
    for _ in 0..workers {
        let _ = tx.send(QueueItem::Stop);
    }
    drop(tx);

    info!(
        "Queued {} batch(es) and {} sentinel(s) for {} worker(s)",
        total, workers, workers
    );

    let queue: SharedQueue = Arc::new(Mutex::new(rx));

    let handles: Vec<_> = (0..workers)
        .map(|worker_id| {
            let queue = Arc::clone(&queue);
            let generator = Arc::clone(&generator);
            let config = config.clone();
            let cancel = cancel.clone();
            tokio::spawn(
                async move { worker_loop(worker_id, queue, generator, config, cancel).await },
            )
        })
        .collect();

    let mut per_worker = Vec::with_capacity(workers);
    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(results) => per_worker.push(results),
            Err(e) => {
                warn!("Worker {} panicked: {}", worker_id, e);
                per_worker.push(Vec::new());
            }
        }
    }
    per_worker
}

/// One worker: dequeue until a sentinel (or cancellation), generating as we go.
async fn worker_loop(
    worker_id: usize,
    queue: SharedQueue,
    generator: Arc<dyn QuizGenerator>,
    config: PipelineConfig,
    cancel: watch::Receiver<bool>,
) -> Vec<BatchResult> {
    let mut results = Vec::new();

    loop {
        if *cancel.borrow() {
            warn!("Worker {}: cancelled, stopping dequeues", worker_id);
            break;
        }

        // Hold the lock only across the dequeue, never across generation,
        // so workers run their expensive calls fully concurrently.
        let item = { queue.lock().await.recv().await };

        match item {
            Some(QueueItem::Work(batch)) => {
                debug!("Worker {}: picked up batch {}", worker_id, batch.index);
                let result = process_batch(&generator, &batch, worker_id, &config).await;
                results.push(result);
            }
            Some(QueueItem::Stop) => {
                debug!("Worker {}: received sentinel, stopping", worker_id);
                break;
            }
            // Channel closed without a sentinel: only possible if the pool
            // was torn down early; treat like a sentinel.
            None => break,
        }
    }

    results
}

/// Merge per-worker accumulators into the final ordered question collection.
///
/// Concatenates accumulators in worker order; within one worker, question
/// order follows its consumed-batch order. Never deduplicates — similar
/// questions from different pages are legitimate — and never drops a
/// successfully generated question. The flattened batch results are
/// returned alongside for completeness reporting.
pub fn merge(per_worker: Vec<Vec<BatchResult>>) -> (Vec<QuizQuestion>, Vec<BatchResult>) {
    let mut questions = Vec::new();
    let mut all_results = Vec::new();

    for worker_results in per_worker {
        for result in worker_results {
            questions.extend(result.questions.iter().cloned());
            all_results.push(result);
        }
    }

    (questions, all_results)
}
