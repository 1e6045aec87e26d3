//! Error types for the SA engine
//!
//! Loading and configuration errors are resolved close to where they occur:
//! a [`LoadError`] fails a single file, a [`ConfigError`] is turned into the
//! built-in defaults by [`crate::SaConfig::load_or_default`]. An
//! [`AggregationError`] is the only way the engine refuses to produce a result.

use std::path::PathBuf;

/// Failure to turn a file into a navigable document.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no parsable XML content: {0}")]
    Malformed(String),
}

/// Problems with an `SA.ini` style configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("config has no [SA_CONFIG] section")]
    MissingSection,

    #[error("config section [SA_CONFIG] is missing key `{0}`")]
    MissingKey(&'static str),
}

/// Preconditions that make a file unprocessable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    #[error("neither FrameSA nor EVFrameSA is present")]
    MissingFrameSa,

    #[error("required SA `{0}` is missing")]
    MissingRequiredSa(String),
}
