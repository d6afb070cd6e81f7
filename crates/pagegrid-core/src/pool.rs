//! Worker pool for OCR of scanned PDFs.
//!
//! Architecture: the page range is split into fixed-size batches and each
//! batch becomes one job on a shared queue. `num_workers` worker tasks drain
//! the queue; each job renders its pages and runs OCR on the blocking
//! thread pool, then answers on the job's oneshot channel. A failing batch
//! cancels the run so queued batches are answered without doing work.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{OcrEngine, OcrLine, PdfBackend};
use crate::batch::{PageBatch, plan_batches, worker_count};
use crate::{Config, ExtractError, ProgressEvent, ProgressFn};

/// Recognized lines of one batch.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub batch: PageBatch,
    pub lines: Vec<OcrLine>,
    pub elapsed: Duration,
}

/// A batch OCR job submitted to the pool.
pub struct BatchJob {
    pub batch: PageBatch,
    pub total_batches: usize,
    pub result_tx: oneshot::Sender<Result<BatchOutput, ExtractError>>,
}

/// Everything a worker needs besides the job itself.
struct WorkerContext {
    path: PathBuf,
    backend: Arc<dyn PdfBackend>,
    engine: Arc<dyn OcrEngine>,
    config: Arc<Config>,
    progress: ProgressFn,
}

/// A pool of worker tasks that process batch OCR jobs.
///
/// Submit jobs via [`submit()`](OcrPool::submit), receive results via the
/// oneshot receiver paired with each job.
pub struct OcrPool {
    job_tx: async_channel::Sender<BatchJob>,
    pool_handle: JoinHandle<()>,
}

impl OcrPool {
    /// Create a new pool with `num_workers` worker tasks working on `path`.
    pub fn new(
        path: PathBuf,
        backend: Arc<dyn PdfBackend>,
        engine: Arc<dyn OcrEngine>,
        config: Arc<Config>,
        progress: ProgressFn,
        cancel: CancellationToken,
        num_workers: usize,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<BatchJob>();
        let ctx = Arc::new(WorkerContext {
            path,
            backend,
            engine,
            config,
            progress,
        });

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for id in 0..num_workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    id,
                    job_rx.clone(),
                    ctx.clone(),
                    cancel.clone(),
                )));
            }

            // Drop our clone so workers are the last holders
            drop(job_rx);

            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Get a cloneable sender for submitting jobs from multiple tasks.
    pub fn sender(&self) -> async_channel::Sender<BatchJob> {
        self.job_tx.clone()
    }

    /// Submit a job to the pool.
    pub async fn submit(&self, job: BatchJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the pool and wait for all workers to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    id: usize,
    rx: async_channel::Receiver<BatchJob>,
    ctx: Arc<WorkerContext>,
    cancel: CancellationToken,
) {
    while let Ok(job) = rx.recv().await {
        if cancel.is_cancelled() {
            tracing::debug!(worker = id, batch = job.batch.index, "skipping: cancelled");
            let _ = job.result_tx.send(Err(ExtractError::Cancelled));
            continue;
        }

        (ctx.progress)(ProgressEvent::BatchStarted {
            batch: job.batch,
            total_batches: job.total_batches,
        });

        let batch = job.batch;
        let blocking_ctx = ctx.clone();
        let blocking_cancel = cancel.clone();
        let result = tokio::task::spawn_blocking(move || {
            run_batch(
                blocking_ctx.backend.as_ref(),
                blocking_ctx.engine.as_ref(),
                &blocking_ctx.path,
                batch,
                &blocking_ctx.config,
                &blocking_cancel,
            )
        })
        .await
        .unwrap_or_else(|e| Err(ExtractError::from(e)));

        match &result {
            Ok(output) => {
                tracing::debug!(
                    worker = id,
                    first = batch.first,
                    last = batch.last,
                    lines = output.lines.len(),
                    elapsed_ms = output.elapsed.as_millis() as u64,
                    "batch complete"
                );
                (ctx.progress)(ProgressEvent::BatchComplete {
                    batch,
                    total_batches: job.total_batches,
                    lines: output.lines.len(),
                    elapsed: output.elapsed,
                });
            }
            Err(ExtractError::Cancelled) => {}
            Err(e) => {
                tracing::warn!(worker = id, first = batch.first, last = batch.last, error = %e, "batch failed, cancelling run");
                cancel.cancel();
            }
        }

        let _ = job.result_tx.send(result);
    }
}

/// Render and recognize one batch. Blocking.
///
/// Lines are tagged with their page, trimmed, and dropped when empty or
/// below `config.min_confidence`.
pub fn run_batch(
    backend: &dyn PdfBackend,
    engine: &dyn OcrEngine,
    path: &Path,
    batch: PageBatch,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<BatchOutput, ExtractError> {
    let started = Instant::now();
    let images = backend.render_pages(path, batch.first, batch.last, config.dpi)?;
    if cancel.is_cancelled() {
        return Err(ExtractError::Cancelled);
    }
    let recognized = engine.recognize_batch(&images)?;

    let mut lines = Vec::new();
    for (image, page_lines) in images.iter().zip(recognized) {
        for line in page_lines {
            let text = line.text.trim();
            if text.is_empty() {
                continue;
            }
            if let (Some(min), Some(conf)) = (config.min_confidence, line.confidence)
                && conf < min
            {
                continue;
            }
            lines.push(OcrLine {
                page: image.page,
                text: text.to_string(),
                confidence: line.confidence,
            });
        }
    }

    Ok(BatchOutput {
        batch,
        lines,
        elapsed: started.elapsed(),
    })
}

/// Result of OCR over a whole document.
#[derive(Debug, Clone)]
pub struct OcrRun {
    pub page_count: u32,
    pub batches: usize,
    /// Recognized lines in page order.
    pub lines: Vec<OcrLine>,
}

/// OCR every page of `path` through a pool of workers.
///
/// Batches may finish in any order; the returned lines are always in page
/// order. The first failing batch aborts the run and its error is returned.
pub async fn run_ocr(
    path: &Path,
    backend: Arc<dyn PdfBackend>,
    engine: Arc<dyn OcrEngine>,
    config: Arc<Config>,
    progress: ProgressFn,
    cancel: CancellationToken,
) -> Result<OcrRun, ExtractError> {
    let page_count = {
        let backend = backend.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || backend.page_count(&path)).await??
    };

    let batches = plan_batches(page_count, config.batch_size);
    if batches.is_empty() {
        return Ok(OcrRun {
            page_count,
            batches: 0,
            lines: Vec::new(),
        });
    }

    let total_batches = batches.len();
    let num_workers = worker_count(config.max_workers, total_batches);
    tracing::info!(
        path = %path.display(),
        pages = page_count,
        batches = total_batches,
        workers = num_workers,
        "starting OCR"
    );

    // A child token lets a failing batch stop this run without cancelling the caller.
    let run_cancel = cancel.child_token();
    let pool = OcrPool::new(
        path.to_path_buf(),
        backend,
        engine,
        config,
        progress,
        run_cancel.clone(),
        num_workers,
    );

    let mut receivers = Vec::with_capacity(total_batches);
    for batch in batches {
        let (result_tx, result_rx) = oneshot::channel();
        pool.submit(BatchJob {
            batch,
            total_batches,
            result_tx,
        })
        .await;
        receivers.push(result_rx);
    }

    let mut outputs = Vec::with_capacity(total_batches);
    let mut failure: Option<ExtractError> = None;
    for rx in receivers {
        let err = match rx.await {
            Ok(Ok(output)) => {
                outputs.push(output);
                continue;
            }
            Ok(Err(e)) => e,
            Err(_) => ExtractError::Worker("worker dropped a batch".into()),
        };
        // Keep the root cause rather than the cancellations it triggered.
        match failure {
            None | Some(ExtractError::Cancelled) => failure = Some(err),
            Some(_) => {}
        }
    }

    pool.shutdown().await;

    if let Some(err) = failure {
        return Err(err);
    }

    outputs.sort_by_key(|o| o.batch.first);
    Ok(OcrRun {
        page_count,
        batches: total_batches,
        lines: outputs.into_iter().flat_map(|o| o.lines).collect(),
    })
}
