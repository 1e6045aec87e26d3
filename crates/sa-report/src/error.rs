use std::io;
use std::time::Duration;

use sa_engine::{AggregationError, LoadError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write summary: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode summary: {0}")]
    Encode(String),

    #[error("file was abandoned after a timeout, summary not persisted")]
    Abandoned,
}

/// Why one file in a batch produced no summary.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] io::Error),
}
