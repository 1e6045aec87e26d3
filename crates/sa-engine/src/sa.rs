//! Sensitivity-analyzer records and their extraction from a dump
//!
//! Each `General_SAs` entry describes one exposure heuristic: its luma, the
//! target interval it aims for, how confident it is, and the adjustment-ratio
//! interval it recommends. Extraction is all-or-nothing per analyzer: a record
//! either carries every mandatory scalar or it does not exist.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::xml::{Document, Element};

/// Element holding one analyzer entry.
pub const SA_NODE: &str = "General_SAs";

/// Analyzers whose adjustment intervals are always aggregation candidates.
pub const BASE_SAS: [&str; 3] = ["SatPrevSA", "DarkPrevSA", "BrightenImgSA"];

pub const FRAME_SA: &str = "FrameSA";
pub const EV_FRAME_SA: &str = "EVFrameSA";
pub const FACE_SA: &str = "FaceSA";
pub const SAFE_AGG_SA: &str = "SafeAggSA";
pub const SHORT_AGG_SA: &str = "ShortAggSA";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn is_non_negative(&self) -> bool {
        self.start >= 0.0 && self.end >= 0.0
    }
}

/// Arithmetic operator of a recorded calculation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Division,
    Multiplication,
    Addition,
    Subtraction,
    Min,
    Max,
    CondSmaller,
    CondLarger,
    CondEqual,
    Largest,
    Smallest,
    /// A method tag this build does not know, kept verbatim
    Unknown(String),
}

impl OperationKind {
    /// Map a `Method` tag onto an operator. Never fails.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "division" | "divide" | "div" => OperationKind::Division,
            "multiplication" | "multiply" | "mul" => OperationKind::Multiplication,
            "addition" | "add" => OperationKind::Addition,
            "subtraction" | "subtract" | "sub" => OperationKind::Subtraction,
            "min" => OperationKind::Min,
            "max" => OperationKind::Max,
            "condsmaller" | "condsmall" => OperationKind::CondSmaller,
            "condlarger" | "condlarge" => OperationKind::CondLarger,
            "condequal" | "condeq" => OperationKind::CondEqual,
            "largest" => OperationKind::Largest,
            "smallest" => OperationKind::Smallest,
            _ => OperationKind::Unknown(tag.trim().to_string()),
        }
    }

    /// Canonical tag used when writing summaries
    pub fn tag(&self) -> &str {
        match self {
            OperationKind::Division => "Division",
            OperationKind::Multiplication => "Multiplication",
            OperationKind::Addition => "Addition",
            OperationKind::Subtraction => "Subtraction",
            OperationKind::Min => "Min",
            OperationKind::Max => "Max",
            OperationKind::CondSmaller => "CondSmaller",
            OperationKind::CondLarger => "CondLarger",
            OperationKind::CondEqual => "CondEqual",
            OperationKind::Largest => "Largest",
            OperationKind::Smallest => "Smallest",
            OperationKind::Unknown(raw) => raw,
        }
    }

    /// Render the operation over its operands, e.g. `1.2 / 0.8`.
    pub fn render(&self, ops: &[f64; 4]) -> String {
        let [a, b, c, d] = ops.map(format_number);
        match self {
            OperationKind::Division => format!("{a} / {b}"),
            OperationKind::Multiplication => format!("{a} * {b}"),
            OperationKind::Addition => format!("{a} + {b}"),
            OperationKind::Subtraction => format!("{a} - {b}"),
            OperationKind::Min => format!("min({a}, {b})"),
            OperationKind::Max => format!("max({a}, {b})"),
            OperationKind::CondSmaller => format!("{a} < {b} ? {c} : {d}"),
            OperationKind::CondLarger => format!("{a} > {b} ? {c} : {d}"),
            OperationKind::CondEqual => format!("{a} == {b} ? {c} : {d}"),
            OperationKind::Largest => format!("max({a}, {b}, {c}, {d})"),
            OperationKind::Smallest => format!("min({a}, {b}, {c}, {d})"),
            OperationKind::Unknown(raw) => format!("{raw}({a}, {b}, {c}, {d})"),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One upstream calculation, recorded as the analyzer reported it.
///
/// `output_value` is copied from the dump and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcStep {
    pub label: String,
    pub operands: [f64; 4],
    pub method: OperationKind,
    pub output_value: f64,
}

impl CalcStep {
    /// `expression = output`, e.g. `1.2 / 0.8 = 1.5`
    pub fn describe(&self) -> String {
        format!(
            "{} = {}",
            self.method.render(&self.operands),
            format_number(self.output_value)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaRecord {
    pub name: String,
    pub id: String,
    pub luma: f64,
    pub target: Interval,
    pub confidence: f64,
    pub adjratio: Interval,
    pub steps: Vec<CalcStep>,
}

/// Extract the analyzer called `name`.
///
/// The first `General_SAs` entry (in document order) whose `Analyzer_Name`
/// matches is used. Returns `None` if there is no such entry or if any of its
/// mandatory scalars is missing or not numeric.
pub fn extract_sa(doc: &Document, name: &str) -> Option<SaRecord> {
    let node = doc
        .find_all(SA_NODE)
        .into_iter()
        .find(|node| node.child("Analyzer_Name").map(Element::text) == Some(name))?;

    record_from_node(node, name)
}

fn record_from_node(node: &Element, name: &str) -> Option<SaRecord> {
    let luma = component_value(node, "Luma_Component", "Luma")?;
    let target = interval(node, "Target_Component")?;
    let confidence = component_value(node, "Confidence_Component", "Confidence")?;
    let adjratio = interval(node, "Adjustment_Ratio")?;

    let id = node
        .child("Analyzer_ID")
        .map(|el| el.text().to_string())
        .unwrap_or_default();

    Some(SaRecord {
        name: name.to_string(),
        id,
        luma,
        target,
        confidence,
        adjratio,
        steps: extract_steps(node),
    })
}

/// A scalar that sits either in a named child of the component or, failing
/// that, directly in the component's text.
fn component_value(node: &Element, component: &str, leaf: &str) -> Option<f64> {
    let component = node.child(component)?;
    match component.child(leaf) {
        Some(value) => value.number(),
        None => component.number(),
    }
}

fn interval(node: &Element, component: &str) -> Option<Interval> {
    let component = node.child(component)?;
    let start = component.child("Start")?.number()?;
    let end = component.child("End")?.number()?;
    Some(Interval::new(start, end))
}

/// Collect calculation steps up to the first one with a blank output name.
fn extract_steps(node: &Element) -> Vec<CalcStep> {
    let mut steps = Vec::new();

    for op in node.children_named("Arithmetic_Operators") {
        let label = op
            .child("Output_Data_Name")
            .map(Element::text)
            .unwrap_or_default();
        if label.is_empty() {
            break;
        }

        let operand = |i: usize| {
            op.child(&format!("Operand_{i}"))
                .and_then(Element::number)
                .unwrap_or(0.0)
        };

        steps.push(CalcStep {
            label: label.to_string(),
            operands: [operand(1), operand(2), operand(3), operand(4)],
            method: OperationKind::from_tag(op.child("Method").map(Element::text).unwrap_or_default()),
            output_value: op.child("Output_Value").and_then(Element::number).unwrap_or(0.0),
        });
    }

    steps
}

/// Render a number with at most four decimals and no trailing zeros.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    // Avoid printing "-0"
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{rounded}")
}
