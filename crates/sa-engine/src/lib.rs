//! Sensitivity-analyzer extraction and exposure aggregation for AEC Audit
//!
//! This crate reads AEC/AWB XML dumps, extracts the per-analyzer
//! recommendations and frame metadata, and computes the confidence-weighted
//! safe exposure and DRC gain.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod frame;
pub mod sa;
pub mod xml;

pub use aggregate::{aggregate, AggregationResult, AggregationWarning, Contributor, Exclusion, SaSet};
pub use config::SaConfig;
pub use error::{AggregationError, ConfigError, LoadError};
pub use frame::FrameContext;
pub use sa::{extract_sa, format_number, CalcStep, Interval, OperationKind, SaRecord};
pub use xml::{Document, Element};
