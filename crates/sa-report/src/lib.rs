//! Summary writer and concurrent batch driver for AEC Audit
//!
//! This crate runs the per-file pipeline (load, extract, aggregate, write)
//! and drives it over whole folders of AEC/AWB dumps.
//!
//! # Features
//!
//! - **Atomic output**: each `<stem>_new.xml` is complete or absent
//! - **Idempotent runs**: files with an existing summary are skipped
//! - **Bounded parallelism**: fixed-size batches on a rayon pool with cancellation
//! - **Per-file isolation**: load errors, missing analyzers, panics and
//!   timeouts fail one file and never the run

pub mod batch;
pub mod error;
pub mod summary;

#[cfg(test)]
mod fixtures;

pub use batch::{run_folder, BatchOptions, BatchRunner, BatchSummary, CancelToken, FailedFile};
pub use error::{FileError, WriteError};
pub use summary::{output_path_for, sanitize_tag, CommitGate, Summary};

use std::path::{Path, PathBuf};

use sa_engine::{aggregate, AggregationResult, Document, FrameContext, SaConfig, SaRecord, SaSet};
use serde::Serialize;
use tracing::info_span;

/// Everything derived from one dump, before anything is written.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub frame: FrameContext,
    /// Extracted analyzers in configured output order
    pub sas: Vec<SaRecord>,
    pub result: AggregationResult,
}

/// Result of a file that produced a summary.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub output: PathBuf,
    pub warnings: usize,
}

/// Load and aggregate one dump without writing anything.
pub fn analyze_file(path: &Path, config: &SaConfig) -> Result<Analysis, FileError> {
    let _span = info_span!("file", file = %path.display()).entered();

    let doc = Document::load(path)?;
    let set = SaSet::collect(&doc, config)?;
    let result = aggregate(&set, config);
    let frame = FrameContext::from_document(&doc);

    Ok(Analysis {
        frame,
        sas: set.ordered(&config.order).cloned().collect(),
        result,
    })
}

/// Run the whole pipeline for one file and write `<stem>_new.xml` beside it.
///
/// Nothing is written when `gate` is abandoned before the summary is persisted.
pub fn process_file(path: &Path, config: &SaConfig, gate: &CommitGate) -> Result<FileOutcome, FileError> {
    let analysis = analyze_file(path, config)?;
    let output = output_path_for(path);

    let summary = Summary::new(&analysis.frame, analysis.sas.iter().collect(), &analysis.result);
    summary.write(&output, gate)?;

    Ok(FileOutcome {
        output,
        warnings: analysis.result.warnings.len(),
    })
}
