//! Normalized `<stem>_new.xml` summary documents
//!
//! A summary is rendered into memory first and then persisted through a
//! temporary file in the target directory, so a reader either sees the
//! complete document or nothing at all.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use sa_engine::{format_number, AggregationResult, FrameContext, SaRecord};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::WriteError;

/// Suffix marking a processed file; inputs carrying it are never reprocessed.
pub const OUTPUT_SUFFIX: &str = "_new.xml";

const FACE_ASSIST_TOKEN: &str = "FACE Assist";

/// `<dir>/<stem>_new.xml` for an input at `<dir>/<stem>.xml`.
pub fn output_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{OUTPUT_SUFFIX}"))
}

/// Turn an arbitrary label into a legal XML element name.
pub fn sanitize_tag(label: &str) -> String {
    let mut tag: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match tag.chars().next() {
        None => tag.push('_'),
        Some(first) if !(first.is_ascii_alphabetic() || first == '_') => tag.insert(0, '_'),
        Some(_) => {}
    }
    tag
}

const OPEN: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

/// Arbitrates between a pipeline persisting its summary and a watchdog
/// giving up on it. Exactly one side wins.
#[derive(Debug, Default)]
pub struct CommitGate(AtomicU8);

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to persist. Fails once the file has been abandoned.
    pub fn begin_commit(&self) -> bool {
        self.0
            .compare_exchange(OPEN, COMMITTING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Give up on the file. Fails once a commit has started.
    pub fn abandon(&self) -> bool {
        self.0
            .compare_exchange(OPEN, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// True once a watchdog has given up on the file
    pub fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::SeqCst) == ABANDONED
    }
}

/// Everything one output document is built from.
pub struct Summary<'a> {
    frame: &'a FrameContext,
    sas: Vec<&'a SaRecord>,
    result: &'a AggregationResult,
}

impl<'a> Summary<'a> {
    /// `sas` must already be in configured output order.
    pub fn new(frame: &'a FrameContext, sas: Vec<&'a SaRecord>, result: &'a AggregationResult) -> Self {
        Self { frame, sas, result }
    }

    pub fn render(&self) -> Result<Vec<u8>, WriteError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_document(&mut writer)
            .map_err(|e| WriteError::Encode(e.to_string()))?;
        Ok(writer.into_inner())
    }

    /// Render and atomically persist to `path`.
    ///
    /// When `gate` was abandoned before the document is ready, the
    /// temporary file is discarded and nothing appears at `path`.
    pub fn write(&self, path: &Path, gate: &CommitGate) -> Result<(), WriteError> {
        if gate.is_abandoned() {
            return Err(WriteError::Abandoned);
        }
        let bytes = self.render()?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;

        if !gate.begin_commit() {
            return Err(WriteError::Abandoned);
        }
        tmp.persist(path).map_err(|e| WriteError::Io(e.error))?;

        debug!(output = %path.display(), bytes = bytes.len(), "summary written");
        Ok(())
    }

    fn write_document(&self, w: &mut Writer<Vec<u8>>) -> std::io::Result<()> {
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        w.write_event(Event::Start(BytesStart::new("Analyzer")))?;

        let frame = self.frame;
        let scalars = [
            ("lux_index", frame.lux_index),
            ("ava_luma", frame.ava_luma),
            ("fps", frame.fps),
            ("sat_ratio", frame.sat_ratio),
            ("dark_ratio", frame.dark_ratio),
            ("CCT", frame.cct),
            ("short_gain", frame.short_gain),
            ("long_gain", frame.long_gain),
            ("safe_gain", frame.safe_gain),
            ("r_gain", frame.r_gain),
            ("b_gain", frame.b_gain),
        ];
        for (tag, value) in scalars {
            if let Some(value) = value {
                text_element(w, tag, &format_number(value))?;
            }
        }
        if let Some(settled) = &frame.aec_settled {
            text_element(w, "aec_settled", settled)?;
        }
        if let Some(index) = &frame.triangle_index {
            text_element(w, "triangle_index", index)?;
        }

        w.write_event(Event::Start(BytesStart::new("SA")))?;
        for sa in &self.sas {
            write_sa(w, sa)?;
        }
        w.write_event(Event::End(BytesEnd::new("SA")))?;

        let result = self.result;
        text_element(w, "FrameSA", &result.framesa_term.formula)?;
        text_element(w, "SafeAggSAAdjRatio", &result.aggregate_formula)?;
        text_element(w, "DRCgain", &result.drc_gain_formula)?;
        text_element(w, "Short", &format_number(result.short_agg_value))?;
        text_element(w, "Safe", &format_number(result.reported_safe_value))?;

        let mut descriptions = frame.awb_descriptions.clone();
        if frame.face_assist_active() {
            descriptions.push(FACE_ASSIST_TOKEN.to_string());
        }
        text_element(w, "awb_sa", &descriptions.join(","))?;
        text_element(w, "channel0_hist", &join_numbers(&frame.channel0_hist))?;
        text_element(w, "channel1_hist", &join_numbers(&frame.channel1_hist))?;

        w.write_event(Event::End(BytesEnd::new("Analyzer")))
    }
}

fn write_sa(w: &mut Writer<Vec<u8>>, sa: &SaRecord) -> std::io::Result<()> {
    let tag = sanitize_tag(&sa.name);
    let mut start = BytesStart::new(tag.as_str());
    start.push_attribute(("name", sa.name.as_str()));
    w.write_event(Event::Start(start))?;

    text_element(w, "id", &sa.id)?;
    text_element(w, "luma", &format_number(sa.luma))?;
    interval_element(w, "target", sa.target.start, sa.target.end)?;
    text_element(w, "confidence", &format_number(sa.confidence))?;
    interval_element(w, "adjratio", sa.adjratio.start, sa.adjratio.end)?;

    w.write_event(Event::Start(BytesStart::new("step")))?;
    for step in &sa.steps {
        let label = sanitize_tag(&step.label);
        let mut op = BytesStart::new(label.as_str());
        op.push_attribute(("method", step.method.tag()));
        w.write_event(Event::Start(op))?;
        w.write_event(Event::Text(BytesText::new(&step.describe())))?;
        w.write_event(Event::End(BytesEnd::new(label.as_str())))?;
    }
    w.write_event(Event::End(BytesEnd::new("step")))?;

    w.write_event(Event::End(BytesEnd::new(tag.as_str())))
}

fn interval_element(w: &mut Writer<Vec<u8>>, tag: &str, start: f64, end: f64) -> std::io::Result<()> {
    w.write_event(Event::Start(BytesStart::new(tag)))?;
    text_element(w, "start", &format_number(start))?;
    text_element(w, "end", &format_number(end))?;
    w.write_event(Event::End(BytesEnd::new(tag)))
}

fn text_element(w: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> std::io::Result<()> {
    w.write_event(Event::Start(BytesStart::new(tag)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(tag)))
}

fn join_numbers(values: &[f64]) -> String {
    values.iter().map(|v| format_number(*v)).collect::<Vec<_>>().join(",")
}
