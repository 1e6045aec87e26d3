//! XML dump builders shared by the tests in this crate

const REQUIRED: [(&str, f64, f64, f64); 6] = [
    ("FrameSA", 1.0, 1.0, 1.2),
    ("SatPrevSA", 0.5, 1.4, 1.6),
    ("DarkPrevSA", 0.25, 0.6, 0.9),
    ("BrightenImgSA", 0.3, 1.1, 1.5),
    ("ShortAggSA", 1.0, 0.55, 0.55),
    ("SafeAggSA", 1.0, 1.1, 1.1),
];

pub(crate) fn sa_entry(name: &str, confidence: f64, start: f64, end: f64) -> String {
    format!(
        "<General_SAs>
           <Analyzer_Name>{name}</Analyzer_Name>
           <Analyzer_ID>1</Analyzer_ID>
           <Luma_Component><Luma>50</Luma></Luma_Component>
           <Target_Component><Start>45</Start><End>55</End></Target_Component>
           <Confidence_Component><Confidence>{confidence}</Confidence></Confidence_Component>
           <Adjustment_Ratio><Start>{start}</Start><End>{end}</End></Adjustment_Ratio>
           <Arithmetic_Operators>
             <Output_Data_Name>Ratio</Output_Data_Name>
             <Operand_1>{start}</Operand_1><Operand_2>1</Operand_2>
             <Method>Division</Method><Output_Value>{start}</Output_Value>
           </Arithmetic_Operators>
           <Arithmetic_Operators><Output_Data_Name></Output_Data_Name></Arithmetic_Operators>
         </General_SAs>"
    )
}

fn wrap(entries: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\"?>
<aec:AEC xmlns:aec=\"urn:aec\">
  <Current_Frame><Lux_Index>320</Lux_Index><Frame_Rate>30</Frame_Rate></Current_Frame>
  <AWB_CurFrameDecision><CCT>5000</CCT><R_Gain>1.9</R_Gain><B_Gain>1.6</B_Gain></AWB_CurFrameDecision>
  <Exposure_Information><Gain>1</Gain></Exposure_Information>
  <Exposure_Information><Gain>4</Gain></Exposure_Information>
  <Exposure_Information><Gain>2</Gain></Exposure_Information>
  {}
</aec:AEC>",
        entries.concat()
    )
}

/// A dump with every default-required analyzer, preceded by `extra`.
pub(crate) fn dump(extra: &[String]) -> String {
    let mut entries = extra.to_vec();
    entries.extend(REQUIRED.iter().map(|(n, c, s, e)| sa_entry(n, *c, *s, *e)));
    wrap(&entries)
}

/// A dump with every default-required analyzer except `missing`.
pub(crate) fn dump_without(missing: &str) -> String {
    let entries: Vec<String> = REQUIRED
        .iter()
        .filter(|(n, ..)| *n != missing)
        .map(|(n, c, s, e)| sa_entry(n, *c, *s, *e))
        .collect();
    wrap(&entries)
}
