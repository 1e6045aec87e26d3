//! Confidence-weighted aggregation of analyzer recommendations
//!
//! Processing a dump runs in two phases:
//!
//! 1. [`SaSet::collect`] resolves the frame analyzer (FrameSA, else EVFrameSA)
//!    and every required analyzer. It fails fast, and this is the only
//!    fatal path.
//! 2. [`aggregate`] classifies the scene, selects contributors by comparing
//!    each candidate's adjustment interval against a reference interval,
//!    computes the weighted aggregate and derives the DRC gain. Numeric
//!    trouble here degrades to zero values plus a recorded warning.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SaConfig;
use crate::error::AggregationError;
use crate::sa::{
    extract_sa, format_number, Interval, SaRecord, BASE_SAS, EV_FRAME_SA, FACE_SA, FRAME_SA,
    SAFE_AGG_SA, SHORT_AGG_SA,
};
use crate::xml::Document;

/// Analyzers extracted from one dump, keyed by name.
#[derive(Debug, Clone)]
pub struct SaSet {
    frame: SaRecord,
    records: HashMap<String, SaRecord>,
}

impl SaSet {
    /// Resolve the frame analyzer and all required analyzers, then pick up
    /// whatever optional, ordered or base analyzers are present.
    pub fn collect(doc: &Document, config: &SaConfig) -> Result<Self, AggregationError> {
        let frame = match extract_sa(doc, FRAME_SA) {
            Some(frame) => frame,
            None => {
                let substitute = extract_sa(doc, EV_FRAME_SA).ok_or(AggregationError::MissingFrameSa)?;
                info!(
                    confidence = substitute.confidence,
                    adjratio_start = substitute.adjratio.start,
                    "FrameSA absent, using EVFrameSA as frame analyzer"
                );
                substitute
            }
        };

        let mut records = HashMap::new();
        records.insert(frame.name.clone(), frame.clone());

        for name in &config.required {
            if name == FRAME_SA || records.contains_key(name) {
                continue;
            }
            let record = extract_sa(doc, name)
                .ok_or_else(|| AggregationError::MissingRequiredSa(name.clone()))?;
            records.insert(name.clone(), record);
        }

        let best_effort = config
            .optional
            .iter()
            .chain(&config.order)
            .map(String::as_str)
            .chain(BASE_SAS)
            .chain([SAFE_AGG_SA, SHORT_AGG_SA]);
        for name in best_effort {
            if records.contains_key(name) {
                continue;
            }
            if let Some(record) = extract_sa(doc, name) {
                records.insert(name.to_string(), record);
            }
        }

        Ok(Self { frame, records })
    }

    /// Build a set directly from records; the frame record must be supplied separately.
    pub fn from_records(frame: SaRecord, others: impl IntoIterator<Item = SaRecord>) -> Self {
        let mut records: HashMap<String, SaRecord> = others
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();
        records.insert(frame.name.clone(), frame.clone());
        Self { frame, records }
    }

    pub fn frame(&self) -> &SaRecord {
        &self.frame
    }

    /// `FrameSA`, or `EVFrameSA` when it was substituted
    pub fn frame_name(&self) -> &str {
        &self.frame.name
    }

    pub fn get(&self, name: &str) -> Option<&SaRecord> {
        self.records.get(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in the given order, skipping names that were not extracted.
    pub fn ordered<'a>(&'a self, order: &'a [String]) -> impl Iterator<Item = &'a SaRecord> + 'a {
        order.iter().filter_map(move |name| self.records.get(name))
    }
}

/// One analyzer's weight and the value chosen from its interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub confidence: f64,
    pub value: f64,
}

/// Why a candidate did not contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exclusion {
    /// Not listed in `agg_sas`
    NotAggregatable,
    ZeroConfidence,
    /// An interval bound is negative
    NegativeBound,
    /// The interval overlaps the reference interval, so no bound is nearer
    OverlapsReference,
    /// A base analyzer the dump does not contain
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Excluded {
    pub name: String,
    pub reason: Exclusion,
}

/// Degraded-but-completed conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregationWarning {
    ZeroConfidenceSum,
    ZeroShortAgg,
    MissingSa(String),
    SafeValueDivergence { computed: f64, reported: f64 },
}

impl fmt::Display for AggregationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationWarning::ZeroConfidenceSum => {
                write!(f, "confidence sum is zero, aggregate set to 0")
            }
            AggregationWarning::ZeroShortAgg => {
                write!(f, "{SHORT_AGG_SA} adjustment ratio is zero or too small, DRC gain set to 0")
            }
            AggregationWarning::MissingSa(name) => write!(f, "{name} not present, its value reads as 0"),
            AggregationWarning::SafeValueDivergence { computed, reported } => write!(
                f,
                "computed aggregate {} diverges from reported {SAFE_AGG_SA} {}",
                format_number(*computed),
                format_number(*reported)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTerm {
    pub formula: String,
    pub value: f64,
}

/// Outcome of aggregating one dump. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub is_face_scene: bool,
    pub frame_source: String,
    pub framesa_term: FrameTerm,
    pub contributing: Vec<Contributor>,
    pub excluded: Vec<Excluded>,
    pub aggregate_formula: String,
    pub aggregate_value: f64,
    pub reported_safe_value: f64,
    pub short_agg_value: f64,
    pub drc_gain: f64,
    pub drc_gain_formula: String,
    pub warnings: Vec<AggregationWarning>,
}

/// Pick the bound of `candidate` nearest to `reference`.
///
/// A candidate entirely above the reference contributes its start, one
/// entirely below contributes its end. Overlapping intervals are ambiguous
/// and yield `None`.
pub fn tie_break(candidate: Interval, reference: Interval) -> Option<f64> {
    if candidate.start >= reference.end {
        Some(candidate.start)
    } else if candidate.end <= reference.start {
        Some(candidate.end)
    } else {
        None
    }
}

fn select(candidate: &SaRecord, reference: Interval, config: &SaConfig) -> Result<f64, Exclusion> {
    if !config.is_aggregatable(&candidate.name) {
        return Err(Exclusion::NotAggregatable);
    }
    if candidate.confidence == 0.0 {
        return Err(Exclusion::ZeroConfidence);
    }
    if !candidate.adjratio.is_non_negative() {
        return Err(Exclusion::NegativeBound);
    }
    tie_break(candidate.adjratio, reference).ok_or(Exclusion::OverlapsReference)
}

/// Aggregate the analyzers of one dump.
pub fn aggregate(set: &SaSet, config: &SaConfig) -> AggregationResult {
    let frame = set.frame();
    let mut warnings = Vec::new();

    // Scene classification picks the interval that governs tie-breaking.
    let face = set.get(FACE_SA).filter(|face| face.confidence != 0.0);
    let is_face_scene = face.is_some();
    let reference = face.unwrap_or(frame).adjratio;

    let mut contributing = Vec::new();
    let mut excluded = Vec::new();
    if let Some(face) = face {
        contributing.push(Contributor {
            name: FACE_SA.to_string(),
            confidence: face.confidence,
            value: face.adjratio.start,
        });
    }

    let mut seen: HashSet<&str> = HashSet::from([FACE_SA]);
    let optional_present = config
        .optional
        .iter()
        .map(String::as_str)
        .filter(|name| set.get(name).is_some());
    for name in BASE_SAS.into_iter().chain(optional_present) {
        if !seen.insert(name) {
            continue;
        }
        let Some(candidate) = set.get(name) else {
            debug!(sa = name, "base analyzer absent");
            excluded.push(Excluded { name: name.to_string(), reason: Exclusion::Absent });
            continue;
        };

        match select(candidate, reference, config) {
            Ok(value) => contributing.push(Contributor {
                name: name.to_string(),
                confidence: candidate.confidence,
                value,
            }),
            Err(reason) => {
                debug!(sa = name, ?reason, "analyzer excluded from aggregation");
                excluded.push(Excluded { name: name.to_string(), reason });
            }
        }
    }

    let frame_product = frame.confidence * frame.adjratio.start;
    let framesa_term = FrameTerm {
        formula: format!(
            "{} * {} = {}",
            format_number(frame.confidence),
            format_number(frame.adjratio.start),
            format_number(frame_product)
        ),
        value: frame_product,
    };

    let weighted: f64 = contributing.iter().map(|c| c.confidence * c.value).sum::<f64>() + frame_product;
    let confidence_sum: f64 = contributing.iter().map(|c| c.confidence).sum::<f64>() + frame.confidence;
    let mean = weighted / confidence_sum;
    let aggregate_value = if confidence_sum == 0.0 || !mean.is_finite() {
        warnings.push(AggregationWarning::ZeroConfidenceSum);
        0.0
    } else {
        mean
    };
    let aggregate_formula = aggregate_formula(&contributing, frame, aggregate_value);

    let reported_safe_value = adjratio_start_or_warn(set, SAFE_AGG_SA, &mut warnings);
    let short_agg_value = adjratio_start_or_warn(set, SHORT_AGG_SA, &mut warnings);

    if set.get(SAFE_AGG_SA).is_some() {
        let scale = reported_safe_value.abs().max(f64::EPSILON);
        if (aggregate_value - reported_safe_value).abs() > config.divergence_tolerance * scale {
            warnings.push(AggregationWarning::SafeValueDivergence {
                computed: aggregate_value,
                reported: reported_safe_value,
            });
        }
    }

    // Subnormal denominators overflow just like zero ones.
    let gain = reported_safe_value / short_agg_value;
    let drc_gain = if short_agg_value == 0.0 || !gain.is_finite() {
        if set.get(SHORT_AGG_SA).is_some() {
            warnings.push(AggregationWarning::ZeroShortAgg);
        }
        0.0
    } else {
        round2(gain)
    };
    let drc_gain_formula = format!(
        "{SAFE_AGG_SA} / {SHORT_AGG_SA} = {} / {} = {}",
        format_number(reported_safe_value),
        format_number(short_agg_value),
        format_number(drc_gain)
    );

    for warning in &warnings {
        warn!(%warning, "aggregation degraded");
    }

    AggregationResult {
        is_face_scene,
        frame_source: set.frame_name().to_string(),
        framesa_term,
        contributing,
        excluded,
        aggregate_formula,
        aggregate_value,
        reported_safe_value,
        short_agg_value,
        drc_gain,
        drc_gain_formula,
        warnings,
    }
}

/// `(FaceSA[0.9 * 1.1] + ... + FrameSA[0.8 * 1.2]) / (0.9 + ... + 0.8) = 1.15`
fn aggregate_formula(contributing: &[Contributor], frame: &SaRecord, value: f64) -> String {
    let mut terms: Vec<String> = contributing
        .iter()
        .map(|c| format!("{}[{} * {}]", c.name, format_number(c.confidence), format_number(c.value)))
        .collect();
    terms.push(format!(
        "{FRAME_SA}[{} * {}]",
        format_number(frame.confidence),
        format_number(frame.adjratio.start)
    ));

    let mut weights: Vec<String> = contributing.iter().map(|c| format_number(c.confidence)).collect();
    weights.push(format_number(frame.confidence));

    format!(
        "({}) / ({}) = {}",
        terms.join(" + "),
        weights.join(" + "),
        format_number(value)
    )
}

fn adjratio_start_or_warn(set: &SaSet, name: &str, warnings: &mut Vec<AggregationWarning>) -> f64 {
    match set.get(name) {
        Some(record) => record.adjratio.start,
        None => {
            warnings.push(AggregationWarning::MissingSa(name.to_string()));
            0.0
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sa(name: &str, confidence: f64, start: f64, end: f64) -> SaRecord {
        SaRecord {
            name: name.to_string(),
            id: String::new(),
            luma: 50.0,
            target: Interval::new(45.0, 55.0),
            confidence,
            adjratio: Interval::new(start, end),
            steps: Vec::new(),
        }
    }

    /// Frame reference interval [1.0, 1.2]; SafeAgg and ShortAgg present.
    fn base_set(extra: Vec<SaRecord>) -> SaSet {
        let mut records = vec![
            sa("SatPrevSA", 0.5, 1.4, 1.6),   // above reference -> start 1.4
            sa("DarkPrevSA", 0.25, 0.6, 0.9), // below reference -> end 0.9
            sa("BrightenImgSA", 0.3, 1.1, 1.5), // overlaps -> excluded
            sa("SafeAggSA", 1.0, 1.1, 1.1),
            sa("ShortAggSA", 1.0, 0.55, 0.55),
        ];
        records.extend(extra);
        SaSet::from_records(sa("FrameSA", 1.0, 1.0, 1.2), records)
    }

    fn names(result: &AggregationResult) -> Vec<&str> {
        result.contributing.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_tie_break_picks_nearer_bound() {
        let reference = Interval::new(1.0, 1.2);
        assert_eq!(tie_break(Interval::new(1.2, 1.5), reference), Some(1.2));
        assert_eq!(tie_break(Interval::new(0.5, 1.0), reference), Some(1.0));
        assert_eq!(tie_break(Interval::new(1.1, 1.5), reference), None);
        assert_eq!(tie_break(Interval::new(0.9, 1.1), reference), None);
        assert_eq!(tie_break(Interval::new(0.8, 1.6), reference), None);
    }

    #[test]
    fn test_non_face_scene_aggregate() {
        let config = SaConfig::default();
        let result = aggregate(&base_set(vec![]), &config);

        assert!(!result.is_face_scene);
        assert_eq!(result.frame_source, "FrameSA");
        assert_eq!(names(&result), vec!["SatPrevSA", "DarkPrevSA"]);
        assert_eq!(result.contributing[0].value, 1.4);
        assert_eq!(result.contributing[1].value, 0.9);
        assert!(result.excluded.contains(&Excluded {
            name: "BrightenImgSA".to_string(),
            reason: Exclusion::OverlapsReference,
        }));

        // (0.5*1.4 + 0.25*0.9 + 1.0*1.0) / (0.5 + 0.25 + 1.0)
        let expected = (0.7 + 0.225 + 1.0) / 1.75;
        assert!((result.aggregate_value - expected).abs() < 1e-12);
        assert!(!result.aggregate_formula.contains("FaceSA"));
        assert!(result.aggregate_formula.starts_with("(SatPrevSA[0.5 * 1.4] + DarkPrevSA[0.25 * 0.9] + FrameSA[1 * 1])"));
        assert_eq!(result.framesa_term.formula, "1 * 1 = 1");
    }

    #[test]
    fn test_drc_gain_rounded() {
        let result = aggregate(&base_set(vec![]), &SaConfig::default());

        assert_eq!(result.reported_safe_value, 1.1);
        assert_eq!(result.short_agg_value, 0.55);
        assert_eq!(result.drc_gain, 2.0);
        assert_eq!(result.drc_gain_formula, "SafeAggSA / ShortAggSA = 1.1 / 0.55 = 2");
    }

    #[test]
    fn test_drc_gain_zero_denominator() {
        let set = SaSet::from_records(
            sa("FrameSA", 1.0, 1.0, 1.2),
            vec![sa("SafeAggSA", 1.0, 1.1, 1.1), sa("ShortAggSA", 1.0, 0.0, 0.0)],
        );
        let result = aggregate(&set, &SaConfig::default());

        assert_eq!(result.drc_gain, 0.0);
        assert!(result.drc_gain.is_finite());
        assert!(result.warnings.contains(&AggregationWarning::ZeroShortAgg));
    }

    #[test]
    fn test_drc_gain_subnormal_denominator() {
        let set = SaSet::from_records(
            sa("FrameSA", 1.0, 1.0, 1.2),
            vec![sa("SafeAggSA", 1.0, 1.1, 1.1), sa("ShortAggSA", 1.0, 1e-320, 1e-320)],
        );
        let result = aggregate(&set, &SaConfig::default());

        assert_eq!(result.drc_gain, 0.0);
        assert!(result.warnings.contains(&AggregationWarning::ZeroShortAgg));
        assert!(!result.drc_gain_formula.contains("inf"));
    }

    #[test]
    fn test_zero_confidence_excluded() {
        let set = base_set(vec![sa("HistSA", 0.0, 2.0, 2.5)]);
        let result = aggregate(&set, &SaConfig::default());

        assert!(!names(&result).contains(&"HistSA"));
        assert!(result.excluded.contains(&Excluded {
            name: "HistSA".to_string(),
            reason: Exclusion::ZeroConfidence,
        }));
    }

    #[test]
    fn test_negative_and_not_aggregatable_excluded() {
        let mut config = SaConfig::default();
        config.aggregatable.remove("DarkPrevSA");
        let set = base_set(vec![sa("TouchSA", 0.4, -1.0, 2.0)]);
        let result = aggregate(&set, &config);

        let reasons: Vec<(&str, Exclusion)> = result
            .excluded
            .iter()
            .map(|e| (e.name.as_str(), e.reason))
            .collect();
        assert!(reasons.contains(&("DarkPrevSA", Exclusion::NotAggregatable)));
        assert!(reasons.contains(&("TouchSA", Exclusion::NegativeBound)));
        assert_eq!(names(&result), vec!["SatPrevSA"]);
    }

    #[test]
    fn test_face_scene_prepends_face_and_uses_face_reference() {
        // Face reference [1.5, 1.7]: SatPrevSA [1.4, 1.6] now overlaps,
        // BrightenImgSA [1.1, 1.5] is entirely below and contributes its end.
        let set = base_set(vec![sa("FaceSA", 0.9, 1.5, 1.7)]);
        let result = aggregate(&set, &SaConfig::default());

        assert!(result.is_face_scene);
        assert_eq!(names(&result), vec!["FaceSA", "DarkPrevSA", "BrightenImgSA"]);
        assert_eq!(result.contributing[0].value, 1.5);
        assert_eq!(result.contributing[2].value, 1.5);
        assert!(result.aggregate_formula.starts_with("(FaceSA[0.9 * 1.5]"));
        assert!(result.aggregate_formula.contains("+ FrameSA[1 * 1]) / (0.9 + "));
    }

    #[test]
    fn test_zero_confidence_face_is_not_face_scene() {
        let set = base_set(vec![sa("FaceSA", 0.0, 1.5, 1.7)]);
        let result = aggregate(&set, &SaConfig::default());

        assert!(!result.is_face_scene);
        assert!(!names(&result).contains(&"FaceSA"));
        assert_eq!(names(&result), vec!["SatPrevSA", "DarkPrevSA"]);
    }

    #[test]
    fn test_scene_branches_are_exclusive() {
        // The same candidate resolves against exactly one reference per file.
        let touch = sa("TouchSA", 0.4, 1.3, 1.45);
        let without_face = aggregate(&base_set(vec![touch.clone()]), &SaConfig::default());
        let with_face = aggregate(
            &base_set(vec![touch, sa("FaceSA", 0.9, 1.5, 1.7)]),
            &SaConfig::default(),
        );

        let chosen = |r: &AggregationResult| {
            r.contributing.iter().find(|c| c.name == "TouchSA").map(|c| c.value)
        };
        assert_eq!(chosen(&without_face), Some(1.3));
        assert_eq!(chosen(&with_face), Some(1.45));
        assert_eq!(names(&with_face).iter().filter(|n| **n == "TouchSA").count(), 1);
    }

    #[test]
    fn test_base_name_listed_as_optional_counted_once() {
        let mut config = SaConfig::default();
        config.optional.push("SatPrevSA".to_string());
        let result = aggregate(&base_set(vec![]), &config);

        assert_eq!(names(&result).iter().filter(|n| **n == "SatPrevSA").count(), 1);
    }

    #[test]
    fn test_zero_confidence_sum() {
        let set = SaSet::from_records(
            sa("FrameSA", 0.0, 1.0, 1.2),
            vec![sa("SafeAggSA", 1.0, 1.1, 1.1), sa("ShortAggSA", 1.0, 0.5, 0.5)],
        );
        let result = aggregate(&set, &SaConfig::default());

        assert_eq!(result.aggregate_value, 0.0);
        assert!(result.warnings.contains(&AggregationWarning::ZeroConfidenceSum));
    }

    #[test]
    fn test_missing_safe_and_short_degrade() {
        let set = SaSet::from_records(sa("FrameSA", 1.0, 1.0, 1.2), vec![]);
        let result = aggregate(&set, &SaConfig::default());

        assert_eq!(result.reported_safe_value, 0.0);
        assert_eq!(result.drc_gain, 0.0);
        assert!(result.warnings.contains(&AggregationWarning::MissingSa("SafeAggSA".to_string())));
        assert!(result.warnings.contains(&AggregationWarning::MissingSa("ShortAggSA".to_string())));
        assert_eq!(
            result.excluded.iter().filter(|e| e.reason == Exclusion::Absent).count(),
            3
        );
    }

    #[test]
    fn test_divergence_is_reported_not_corrected() {
        let set = SaSet::from_records(
            sa("FrameSA", 1.0, 1.0, 1.2),
            vec![sa("SafeAggSA", 1.0, 2.0, 2.0), sa("ShortAggSA", 1.0, 1.0, 1.0)],
        );
        let result = aggregate(&set, &SaConfig::default());

        assert_eq!(result.aggregate_value, 1.0);
        assert_eq!(result.reported_safe_value, 2.0);
        assert!(result.warnings.contains(&AggregationWarning::SafeValueDivergence {
            computed: 1.0,
            reported: 2.0,
        }));
    }

    mod collect {
        use super::*;

        fn entry(name: &str, confidence: f64, start: f64, end: f64) -> String {
            format!(
                "<General_SAs><Analyzer_Name>{name}</Analyzer_Name><Analyzer_ID>1</Analyzer_ID>
                 <Luma_Component><Luma>50</Luma></Luma_Component>
                 <Target_Component><Start>45</Start><End>55</End></Target_Component>
                 <Confidence_Component><Confidence>{confidence}</Confidence></Confidence_Component>
                 <Adjustment_Ratio><Start>{start}</Start><End>{end}</End></Adjustment_Ratio></General_SAs>"
            )
        }

        fn required_without_frame() -> Vec<String> {
            ["SatPrevSA", "DarkPrevSA", "BrightenImgSA", "ShortAggSA", "SafeAggSA"]
                .iter()
                .map(|n| entry(n, 0.5, 1.0, 1.1))
                .collect()
        }

        fn parse(entries: &[String]) -> Document {
            Document::parse(format!("<AEC>{}</AEC>", entries.concat()).as_bytes()).unwrap()
        }

        #[test]
        fn test_ev_frame_substitution() {
            let mut entries = required_without_frame();
            entries.push(entry("EVFrameSA", 0.8, 1.2, 1.3));
            let doc = parse(&entries);

            let set = SaSet::collect(&doc, &SaConfig::default()).unwrap();
            assert_eq!(set.frame_name(), "EVFrameSA");

            let result = aggregate(&set, &SaConfig::default());
            assert_eq!(result.frame_source, "EVFrameSA");
            assert!((result.framesa_term.value - 0.96).abs() < 1e-12);
            assert_eq!(result.framesa_term.formula, "0.8 * 1.2 = 0.96");
        }

        #[test]
        fn test_missing_frame_is_fatal() {
            let doc = parse(&required_without_frame());
            let err = SaSet::collect(&doc, &SaConfig::default()).unwrap_err();
            assert_eq!(err, AggregationError::MissingFrameSa);
        }

        #[test]
        fn test_required_after_bad_fragment_is_found() {
            let mut entries = required_without_frame();
            entries.insert(entries.len() - 1, "<!garbage>".to_string());
            entries.push(entry("FrameSA", 1.0, 1.0, 1.2));
            let doc = parse(&entries);

            let set = SaSet::collect(&doc, &SaConfig::default()).unwrap();
            assert!(set.get("SafeAggSA").is_some());
            assert_eq!(set.frame_name(), "FrameSA");
        }

        #[test]
        fn test_missing_required_is_fatal() {
            let mut entries: Vec<String> = ["SatPrevSA", "DarkPrevSA", "BrightenImgSA", "ShortAggSA"]
                .iter()
                .map(|n| entry(n, 0.5, 1.0, 1.1))
                .collect();
            entries.push(entry("FrameSA", 1.0, 1.0, 1.2));
            let doc = parse(&entries);

            let err = SaSet::collect(&doc, &SaConfig::default()).unwrap_err();
            assert_eq!(err, AggregationError::MissingRequiredSa("SafeAggSA".to_string()));
        }

        #[test]
        fn test_optional_absence_is_not_fatal_and_order_is_respected() {
            let mut entries = required_without_frame();
            entries.push(entry("FrameSA", 1.0, 1.0, 1.2));
            entries.push(entry("HistSA", 0.3, 2.0, 2.2));
            let doc = parse(&entries);
            let config = SaConfig::default();

            let set = SaSet::collect(&doc, &config).unwrap();
            assert!(set.get("FaceSA").is_none());
            assert!(set.get("HistSA").is_some());

            let ordered: Vec<&str> = set.ordered(&config.order).map(|r| r.name.as_str()).collect();
            assert_eq!(
                ordered,
                vec!["FrameSA", "SatPrevSA", "DarkPrevSA", "BrightenImgSA", "HistSA", "ShortAggSA", "SafeAggSA"]
            );
        }
    }
}
