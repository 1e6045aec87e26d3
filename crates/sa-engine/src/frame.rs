//! Frame-level metadata parsed independently of the analyzers

use serde::{Deserialize, Serialize};

use crate::xml::{parse_number, Document, Element};

/// Maximum samples kept for the first channel histogram.
pub const CHANNEL0_CAP: usize = 256;
/// Maximum samples kept for the second channel histogram.
pub const CHANNEL1_CAP: usize = 255;

/// Channel whose value grid carries the luma histogram.
const HISTOGRAM_CHANNEL_ID: &str = "6";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameContext {
    pub lux_index: Option<f64>,
    pub ava_luma: Option<f64>,
    pub fps: Option<f64>,
    pub sat_ratio: Option<f64>,
    pub dark_ratio: Option<f64>,
    pub cct: Option<f64>,
    pub short_gain: Option<f64>,
    pub long_gain: Option<f64>,
    pub safe_gain: Option<f64>,
    pub r_gain: Option<f64>,
    pub b_gain: Option<f64>,
    pub triangle_index: Option<String>,
    pub aec_settled: Option<String>,
    pub face_assist_confidence: Option<f64>,
    pub channel0_hist: Vec<f64>,
    pub channel1_hist: Vec<f64>,
    pub awb_descriptions: Vec<String>,
}

impl FrameContext {
    pub fn from_document(doc: &Document) -> Self {
        let gains: Vec<Option<f64>> = doc
            .find_all("Exposure_Information")
            .into_iter()
            .take(3)
            .map(|info| info.child("Gain").and_then(Element::number))
            .collect();
        let gain = |i: usize| gains.get(i).copied().flatten();

        let channels = doc.find_path_all("AECX_CoreStats/Channels_List");

        Self {
            lux_index: number_at(doc, "Current_Frame/Lux_Index"),
            ava_luma: number_at(doc, "AECX_Metering/Average_Luma"),
            fps: number_at(doc, "Current_Frame/Frame_Rate"),
            sat_ratio: number_at(doc, "AECX_Metering/Saturation_Ratio"),
            dark_ratio: number_at(doc, "AECX_Metering/Dark_Ratio"),
            cct: number_at(doc, "AWB_CurFrameDecision/CCT"),
            short_gain: gain(0),
            long_gain: gain(1),
            safe_gain: gain(2),
            r_gain: number_at(doc, "AWB_CurFrameDecision/R_Gain"),
            b_gain: number_at(doc, "AWB_CurFrameDecision/B_Gain"),
            triangle_index: text_at(doc, "AWB_TriangleGainAdjust/Triangle_Index"),
            aec_settled: doc
                .find("AEC_Settled")
                .map(Element::text)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            face_assist_confidence: number_at(doc, "AWB_SA_Face_Assist/Face_Assist_Confidence"),
            channel0_hist: channels
                .first()
                .map(|c| histogram(c, CHANNEL0_CAP))
                .unwrap_or_default(),
            channel1_hist: channels
                .get(1)
                .map(|c| histogram(c, CHANNEL1_CAP))
                .unwrap_or_default(),
            awb_descriptions: doc
                .find_path_all("AWB_SAGen1Data/SA_Description")
                .into_iter()
                .map(Element::text)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Whether face assist contributed to the AWB decision
    pub fn face_assist_active(&self) -> bool {
        self.face_assist_confidence.is_some_and(|c| c != 0.0)
    }
}

fn number_at(doc: &Document, path: &str) -> Option<f64> {
    doc.find_path(path).and_then(Element::number)
}

fn text_at(doc: &Document, path: &str) -> Option<String> {
    doc.find_path(path)
        .map(Element::text)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Samples of `Channel_Data[@ID="6"]/Value_Grid`, capped at `cap`.
fn histogram(channels: &Element, cap: usize) -> Vec<f64> {
    let Some(grid) = channels
        .children_named("Channel_Data")
        .find(|c| c.attr("ID") == Some(HISTOGRAM_CHANNEL_ID))
        .and_then(|c| c.child("Value_Grid"))
    else {
        return Vec::new();
    };

    if grid.children().is_empty() {
        grid.text()
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter_map(parse_number)
            .take(cap)
            .collect()
    } else {
        grid.children()
            .iter()
            .filter_map(Element::number)
            .take(cap)
            .collect()
    }
}
