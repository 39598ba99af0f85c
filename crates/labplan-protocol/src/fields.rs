//! Column names and ordered field maps exchanged with the table collaborators.

use crate::records::{LibraryRecord, UnitDescriptor};
use serde_json::{Map, Value};
use std::{error::Error, fmt};

/// Ordered `column -> value` map; key order is insertion order.
pub type FieldMap = Map<String, Value>;

pub const UNIT_PROJECT: &str = "实验项目";
pub const UNIT_DATE: &str = "测序日期";
pub const UNIT_INSTRUMENT_SN: &str = "测序仪SN";
pub const UNIT_RUN: &str = "Run数";
pub const UNIT_SERIAL: &str = "芯片SN";
pub const UNIT_MODEL: &str = "测序仪型号";
pub const UNIT_RESULT: &str = "试验结果";
pub const UNIT_REMARK: &str = "备注2";

pub const UNIT_COLUMNS: [&str; 8] = [
    UNIT_PROJECT,
    UNIT_DATE,
    UNIT_INSTRUMENT_SN,
    UNIT_RUN,
    UNIT_SERIAL,
    UNIT_MODEL,
    UNIT_RESULT,
    UNIT_REMARK,
];

pub const LIB_UNIT: &str = "芯片";
pub const LIB_DATA_VOLUME: &str = "芯片数据量";
pub const LIB_UPLOAD_DATE: &str = "上机时间";
pub const LIB_ANALYSIS_DATE: &str = "分析时间";
pub const LIB_NAME: &str = "样本名称";
pub const LIB_ID: &str = "文库编号";
pub const LIB_INDEX: &str = "index";
pub const LIB_CLEAN_READS: &str = "Clean Reads";
pub const LIB_Q20: &str = "≥Q20%";
pub const LIB_Q30: &str = "Q30";
pub const LIB_SPECIES: &str = "物种名称";
pub const LIB_CLASSIFICATION: &str = "分类";
pub const LIB_TAXID: &str = "taxid";
pub const LIB_LATIN: &str = "拉丁文";
pub const LIB_SPIKE_RPM: &str = "内部对照spike.1RPM值";
pub const LIB_RPM: &str = "rpm";
pub const LIB_UNIQ_RPM: &str = "uniq rpm";

pub const LIBRARY_COLUMNS: [&str; 17] = [
    LIB_UNIT,
    LIB_DATA_VOLUME,
    LIB_UPLOAD_DATE,
    LIB_ANALYSIS_DATE,
    LIB_NAME,
    LIB_ID,
    LIB_INDEX,
    LIB_CLEAN_READS,
    LIB_Q20,
    LIB_Q30,
    LIB_SPECIES,
    LIB_CLASSIFICATION,
    LIB_TAXID,
    LIB_LATIN,
    LIB_SPIKE_RPM,
    LIB_RPM,
    LIB_UNIQ_RPM,
];

/// Text shown in a table cell: strings verbatim, numbers in their shortest
/// form, null as empty.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// A cell that cannot be read into its record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub column: String,
    pub value: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Column '{}' has unusable value '{}'", self.column, self.value)
    }
}

impl Error for FieldError {}

/// Digits of a run cell, so `"run 0143"` is 143 and a blank cell is 0.
/// `None` when the digits do not fit a run number.
pub fn run_number(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok()
}

fn text(s: &str) -> Value {
    Value::String(s.to_string())
}

fn optional_number(v: Option<f64>) -> Value {
    v.and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| text(""))
}

fn field_text(map: &FieldMap, key: &str) -> String {
    map.get(key).map(cell_text).unwrap_or_default().trim().to_string()
}

impl UnitDescriptor {
    pub fn to_field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert(UNIT_PROJECT.into(), text(&self.project));
        map.insert(UNIT_DATE.into(), text(&self.date_code));
        map.insert(UNIT_INSTRUMENT_SN.into(), text(&self.instrument_serial));
        map.insert(UNIT_RUN.into(), Value::from(self.run));
        map.insert(UNIT_SERIAL.into(), text(&self.unit_serial));
        map.insert(UNIT_MODEL.into(), text(&self.model));
        map.insert(UNIT_RESULT.into(), text(&self.result));
        map.insert(UNIT_REMARK.into(), text(&self.remark));
        map
    }

    /// Reads an operator-edited row. Only the run cell is checked here; the
    /// library pass re-validates date and serial before use.
    pub fn from_field_map(map: &FieldMap) -> Result<Self, FieldError> {
        let run_text = field_text(map, UNIT_RUN);
        let run = run_number(&run_text).ok_or_else(|| FieldError {
            column: UNIT_RUN.to_string(),
            value: run_text.clone(),
        })?;
        Ok(Self {
            project: field_text(map, UNIT_PROJECT),
            date_code: field_text(map, UNIT_DATE),
            instrument_serial: field_text(map, UNIT_INSTRUMENT_SN),
            run,
            unit_serial: field_text(map, UNIT_SERIAL),
            model: field_text(map, UNIT_MODEL),
            result: field_text(map, UNIT_RESULT),
            remark: field_text(map, UNIT_REMARK),
        })
    }
}

impl LibraryRecord {
    pub fn to_field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert(LIB_UNIT.into(), text(&self.unit_serial));
        map.insert(LIB_DATA_VOLUME.into(), text(&self.data_volume));
        map.insert(LIB_UPLOAD_DATE.into(), text(&self.upload_date));
        map.insert(LIB_ANALYSIS_DATE.into(), text(""));
        map.insert(LIB_NAME.into(), text(&self.display_name));
        map.insert(LIB_ID.into(), text(&self.library_id));
        map.insert(LIB_INDEX.into(), text(&self.slot));
        map.insert(LIB_CLEAN_READS.into(), text(""));
        map.insert(LIB_Q20.into(), text(""));
        map.insert(LIB_Q30.into(), text(""));
        map.insert(LIB_SPECIES.into(), text(&self.species));
        map.insert(LIB_CLASSIFICATION.into(), text(&self.classification));
        map.insert(LIB_TAXID.into(), text(&self.taxid));
        map.insert(LIB_LATIN.into(), text(&self.latin_name));
        map.insert(LIB_SPIKE_RPM.into(), optional_number(self.spike_rpm));
        map.insert(LIB_RPM.into(), optional_number(self.rpm));
        map.insert(LIB_UNIQ_RPM.into(), text(""));
        map
    }
}
