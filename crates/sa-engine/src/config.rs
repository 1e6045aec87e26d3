//! Analyzer lists driving extraction, output order and aggregation
//!
//! The configuration comes from an `SA.ini` style file with one section:
//!
//! ```ini
//! [SA_CONFIG]
//! required_sas = FrameSA, SatPrevSA, DarkPrevSA, BrightenImgSA, ShortAggSA, SafeAggSA
//! optional_sas = FaceSA, TouchSA
//! sa_order     = FrameSA, FaceSA, TouchSA, SatPrevSA, DarkPrevSA, BrightenImgSA, ShortAggSA, SafeAggSA
//! agg_sas      = SatPrevSA, DarkPrevSA, BrightenImgSA, TouchSA
//! ```
//!
//! A missing or broken file is never fatal: [`SaConfig::load_or_default`]
//! substitutes the built-in lists and logs the reason once.

use std::collections::BTreeSet;
use std::path::Path;

use ini::Ini;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

pub const SECTION: &str = "SA_CONFIG";

const KEY_REQUIRED: &str = "required_sas";
const KEY_OPTIONAL: &str = "optional_sas";
const KEY_ORDER: &str = "sa_order";
const KEY_AGGREGATABLE: &str = "agg_sas";
const KEY_DIVERGENCE: &str = "divergence_tolerance";

const DEFAULT_REQUIRED: &[&str] = &[
    "FrameSA",
    "SatPrevSA",
    "DarkPrevSA",
    "BrightenImgSA",
    "ShortAggSA",
    "SafeAggSA",
];

const DEFAULT_OPTIONAL: &[&str] = &["FaceSA", "TouchSA", "HistSA", "ExtremeColorSA", "LowLightSA"];

const DEFAULT_ORDER: &[&str] = &[
    "FrameSA",
    "EVFrameSA",
    "FaceSA",
    "TouchSA",
    "SatPrevSA",
    "DarkPrevSA",
    "BrightenImgSA",
    "HistSA",
    "ExtremeColorSA",
    "LowLightSA",
    "ShortAggSA",
    "SafeAggSA",
];

const DEFAULT_AGGREGATABLE: &[&str] = &[
    "SatPrevSA",
    "DarkPrevSA",
    "BrightenImgSA",
    "TouchSA",
    "HistSA",
    "ExtremeColorSA",
    "LowLightSA",
];

/// Relative difference between computed and reported safe values
/// above which a divergence is reported.
pub const DEFAULT_DIVERGENCE_TOLERANCE: f64 = 0.05;

/// Immutable for the lifetime of a batch run; share it by reference or `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaConfig {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub order: Vec<String>,
    pub aggregatable: BTreeSet<String>,
    pub divergence_tolerance: f64,
}

impl Default for SaConfig {
    fn default() -> Self {
        Self {
            required: owned(DEFAULT_REQUIRED),
            optional: owned(DEFAULT_OPTIONAL),
            order: owned(DEFAULT_ORDER),
            aggregatable: DEFAULT_AGGREGATABLE.iter().map(|s| s.to_string()).collect(),
            divergence_tolerance: DEFAULT_DIVERGENCE_TOLERANCE,
        }
    }
}

impl SaConfig {
    /// Load the configuration, falling back to the built-in lists on any error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                info!(path = %path.display(), "loaded SA configuration");
                config
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "using built-in SA configuration");
                Self::default()
            }
        }
    }

    /// Load the configuration strictly.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&content)
    }

    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let section = ini.section(Some(SECTION)).ok_or(ConfigError::MissingSection)?;

        let list = |key: &'static str| -> Result<Vec<String>, ConfigError> {
            section
                .get(key)
                .map(split_list)
                .ok_or(ConfigError::MissingKey(key))
        };

        let divergence_tolerance = match section.get(KEY_DIVERGENCE) {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite() && *t >= 0.0)
                .ok_or_else(|| ConfigError::Parse(format!("{KEY_DIVERGENCE} = {raw:?}")))?,
            None => DEFAULT_DIVERGENCE_TOLERANCE,
        };

        Ok(Self {
            required: list(KEY_REQUIRED)?,
            optional: list(KEY_OPTIONAL)?,
            order: list(KEY_ORDER)?,
            aggregatable: list(KEY_AGGREGATABLE)?.into_iter().collect(),
            divergence_tolerance,
        })
    }

    pub fn is_aggregatable(&self, name: &str) -> bool {
        self.aggregatable.contains(name)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
