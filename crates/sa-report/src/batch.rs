//! Folder-level batch driver
//!
//! Candidate files are split into fixed-size batches that run one after
//! another. Within a batch, files are processed in parallel on a rayon pool
//! sized to the worker count, so at most `workers` documents are alive at
//! any time and everything a batch allocated is released before the next
//! one starts. A [`CancelToken`] is checked before every batch and every file.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use sa_engine::SaConfig;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::FileError;
use crate::summary::{output_path_for, CommitGate, OUTPUT_SUFFIX};
use crate::{process_file, FileOutcome};

/// Batch size, worker count and per-file limit for a run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOptions {
    /// Files per batch; batches run one after another
    pub batch_size: usize,
    /// Files processed concurrently within a batch
    pub workers: usize,
    /// Per-file limit; `None` lets a file run as long as it needs
    pub file_timeout: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            workers: 4,
            file_timeout: None,
        }
    }
}

/// Cooperative cancellation shared between a run and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop before the next batch and before any file not yet started.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A file that produced no summary, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub file: String,
    pub reason: String,
}

/// Outcome of a whole run. Counts are independent of completion order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    /// Candidate files after skipping already processed ones
    pub total: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedFile>,
    /// Files never started because the run was cancelled
    pub not_run: usize,
    pub batches: usize,
    /// Files that completed with at least one aggregation warning
    pub warnings: usize,
    pub elapsed: Duration,
    pub files_per_second: f64,
}

impl BatchSummary {
    /// Files that were started, whatever their outcome
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

/// Drives the per-file pipeline over a folder with a shared, read-only configuration.
pub struct BatchRunner {
    config: Arc<SaConfig>,
    options: BatchOptions,
    cancel: CancelToken,
}

impl BatchRunner {
    /// Create a runner with default options and a fresh cancel token.
    pub fn new(config: Arc<SaConfig>) -> Self {
        Self {
            config,
            options: BatchOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Override batch size, worker count or per-file timeout.
    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a cancel token with whoever controls the run.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process every unprocessed dump in `folder`.
    ///
    /// Only enumeration and pool construction can fail the run; per-file
    /// problems end up in [`BatchSummary::failed`].
    pub fn run(&self, folder: &Path, progress: &(dyn Fn(&str) + Sync)) -> Result<BatchSummary> {
        let started_at = Utc::now();
        let start = Instant::now();

        let (files, skipped) = enumerate_candidates(folder)?;
        let batch_size = self.options.batch_size.max(1);
        let workers = self.options.workers.max(1);
        let batch_count = files.len().div_ceil(batch_size);

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("aec-worker-{i}"))
            .build()
            .context("Failed to build worker pool")?;

        info!(
            folder = %folder.display(),
            total = files.len(),
            skipped,
            batch_size,
            workers,
            "starting batch run"
        );
        progress(&format!(
            "Found {} files to process ({} already processed)",
            files.len(),
            skipped
        ));

        let mut outcomes: Vec<(PathBuf, Result<FileOutcome, FileError>)> = Vec::with_capacity(files.len());
        let mut not_run = 0;
        let mut batches = 0;

        for (index, chunk) in files.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                not_run += files.len() - index * batch_size;
                break;
            }

            batches += 1;
            progress(&format!("Batch {}/{}: {} files", index + 1, batch_count, chunk.len()));

            let results: Vec<Option<(PathBuf, Result<FileOutcome, FileError>)>> = pool.install(|| {
                chunk
                    .par_iter()
                    .map(|path| {
                        if self.cancel.is_cancelled() {
                            return None;
                        }
                        let result = self.process(path);
                        report(path, &result, progress);
                        Some((path.clone(), result))
                    })
                    .collect()
            });

            for result in results {
                match result {
                    Some(outcome) => outcomes.push(outcome),
                    None => not_run += 1,
                }
            }
            info!(batch = index + 1, of = batch_count, "batch complete");
        }

        let summary = summarize(started_at, start.elapsed(), skipped, outcomes, not_run, batches);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            not_run = summary.not_run,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            files_per_second = summary.files_per_second,
            "batch run finished"
        );
        progress(&format!(
            "Processed {} files in {:.2}s ({:.1} files/s): {} succeeded, {} failed",
            summary.processed(),
            summary.elapsed.as_secs_f64(),
            summary.files_per_second,
            summary.succeeded,
            summary.failed.len()
        ));

        Ok(summary)
    }

    fn process(&self, path: &Path) -> Result<FileOutcome, FileError> {
        match self.options.file_timeout {
            None => guarded(|| process_file(path, &self.config, &CommitGate::new())),
            Some(limit) => self.process_with_timeout(path, limit),
        }
    }

    /// Run the pipeline on its own thread and stop waiting after `limit`.
    ///
    /// A timed-out pipeline keeps running detached, but its [`CommitGate`] is
    /// abandoned so it can no longer persist output. If the pipeline already
    /// started persisting, its result is awaited instead.
    fn process_with_timeout(&self, path: &Path, limit: Duration) -> Result<FileOutcome, FileError> {
        let (tx, rx) = mpsc::channel();
        let gate = Arc::new(CommitGate::new());

        let config = Arc::clone(&self.config);
        let owned_path = path.to_path_buf();
        let worker_gate = Arc::clone(&gate);
        thread::Builder::new()
            .name("aec-file".to_string())
            .spawn(move || {
                let result = guarded(|| process_file(&owned_path, &config, &worker_gate));
                let _ = tx.send(result);
            })
            .map_err(FileError::Spawn)?;

        let disconnected = || FileError::Panicked("worker exited without a result".to_string());
        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) if gate.abandon() => Err(FileError::Timeout(limit)),
            Err(mpsc::RecvTimeoutError::Timeout) => rx.recv().unwrap_or_else(|_| Err(disconnected())),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(disconnected()),
        }
    }
}

/// Run a folder with default batch options.
pub fn run_folder(folder: &Path, config: &SaConfig, progress: &(dyn Fn(&str) + Sync)) -> Result<BatchSummary> {
    BatchRunner::new(Arc::new(config.clone())).run(folder, progress)
}

/// `*.xml` files in `folder` without a summary yet, sorted by name, plus the
/// number skipped because their summary exists.
pub fn enumerate_candidates(folder: &Path) -> Result<(Vec<PathBuf>, usize)> {
    if !folder.is_dir() {
        bail!("{} is not a directory", folder.display());
    }

    let mut files = Vec::new();
    let mut skipped = 0;
    for entry in fs::read_dir(folder).with_context(|| format!("Failed to read {}", folder.display()))? {
        let path = entry?.path();
        if !path.is_file() || !is_input_name(&path) {
            continue;
        }
        if output_path_for(&path).exists() {
            skipped += 1;
        } else {
            files.push(path);
        }
    }
    files.sort();

    Ok((files, skipped))
}

fn is_input_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xml") && !lower.ends_with(&OUTPUT_SUFFIX.to_ascii_lowercase())
}

fn guarded<F>(pipeline: F) -> Result<FileOutcome, FileError>
where
    F: FnOnce() -> Result<FileOutcome, FileError>,
{
    panic::catch_unwind(AssertUnwindSafe(pipeline))
        .unwrap_or_else(|payload| Err(FileError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn report(path: &Path, result: &Result<FileOutcome, FileError>, progress: &(dyn Fn(&str) + Sync)) {
    let name = display_name(path);
    match result {
        Ok(outcome) if outcome.warnings > 0 => {
            progress(&format!("OK {name} ({} warnings)", outcome.warnings));
        }
        Ok(_) => progress(&format!("OK {name}")),
        Err(err) => {
            warn!(file = %path.display(), error = %err, "file failed");
            progress(&format!("FAILED {name}: {err}"));
        }
    }
}

fn summarize(
    started_at: DateTime<Utc>,
    elapsed: Duration,
    skipped: usize,
    outcomes: Vec<(PathBuf, Result<FileOutcome, FileError>)>,
    not_run: usize,
    batches: usize,
) -> BatchSummary {
    let total = outcomes.len() + not_run;
    let mut succeeded = 0;
    let mut warnings = 0;
    let mut failed = Vec::new();

    for (path, result) in outcomes {
        match result {
            Ok(outcome) => {
                succeeded += 1;
                if outcome.warnings > 0 {
                    warnings += 1;
                }
            }
            Err(err) => failed.push(FailedFile {
                file: display_name(&path),
                reason: err.to_string(),
            }),
        }
    }
    failed.sort_by(|a, b| a.file.cmp(&b.file));

    let seconds = elapsed.as_secs_f64();
    let processed = succeeded + failed.len();
    let files_per_second = if seconds > 0.0 { processed as f64 / seconds } else { 0.0 };

    BatchSummary {
        started_at,
        total,
        skipped,
        succeeded,
        failed,
        not_run,
        batches,
        warnings,
        elapsed,
        files_per_second,
    }
}
