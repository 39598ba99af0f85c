//! The lab's input sheet, exported as CSV: `key, value1, value2, value3,
//! remark`. Sample rows are keyed by their sample id; everything else is a
//! configuration key.

use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use itertools::Itertools;
use labplan_engine::{
    PlanParameters,
    codec::{DateCode, Slot},
    layout::parse_total_units,
};
use labplan_protocol::{InstrumentDescriptor, SampleRecord, SpeciesSpec, fields::run_number};
use lazy_static::lazy_static;
use regex::Regex;
use std::{collections::BTreeMap, io::Read, path::Path};

pub const KEY_RESEARCH_ID: &str = "研究编号";
pub const KEY_RESEARCH_LIST: &str = "研究列表";
pub const KEY_RESEARCH_NOTE: &str = "研究说明";
pub const KEY_START_DATE: &str = "实验启动时间";
pub const KEY_DAYS: &str = "实验时间（天）";
pub const KEY_SESSIONS_PER_DAY: &str = "每天场次";
pub const KEY_REPEATS: &str = "重复次数";
pub const KEY_CAPACITY: &str = "芯片容量";
pub const KEY_TOTAL_UNITS: &str = "样本单位总数";
pub const KEY_SLOT_START: &str = "接头起点";
pub const KEY_INSTRUMENT_COUNT: &str = "需要用到的测序仪台数";
pub const KEY_PC: &str = "F-PC";
pub const KEY_NC: &str = "F-NC";

lazy_static! {
    static ref SAMPLE_ID: Regex = Regex::new(r"^[A-Za-z]-\d{4}-\d{2}$").unwrap();
}

pub fn is_sample_id(text: &str) -> bool {
    SAMPLE_ID.is_match(text.trim())
}

/// Splits on `;` or the full-width `；`, dropping blanks.
pub fn split_list(text: &str) -> Vec<String> {
    text.replace('；', ";")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// One range for everyone, or one per name; any other count leaves them empty.
fn pair_ranges(count: usize, ranges: &[String]) -> Vec<String> {
    match ranges.len() {
        1 => vec![ranges[0].clone(); count],
        n if n == count => ranges.to_vec(),
        _ => vec![String::new(); count],
    }
}

fn soft_u32(text: &str) -> Option<u32> {
    let t = text.trim();
    t.parse::<u32>()
        .ok()
        .or_else(|| t.parse::<f64>().ok().filter(|v| *v >= 0.0 && v.is_finite()).map(|v| v as u32))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputTable {
    pub samples: Vec<SampleRecord>,
    values: BTreeMap<String, [String; 3]>,
}

impl InputTable {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut ret = Self::default();
        for (line, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("Bad input row {}", line + 1))?;
            let cell = |i: usize| record.get(i).unwrap_or_default().trim().to_string();
            let key = cell(0);
            if key.is_empty() {
                continue;
            }
            if is_sample_id(&key) {
                ret.samples.push(Self::sample_row(&key, &cell(1), &cell(2), &cell(3)));
            } else {
                ret.values.insert(key, [cell(1), cell(2), cell(3)]);
            }
        }
        log::info!(
            "Input sheet: {} sample(s), {} configuration key(s)",
            ret.samples.len(),
            ret.values.len()
        );
        Ok(ret)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Could not open input sheet '{}'", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Could not parse input sheet '{}'", path.display()))
    }

    fn sample_row(id: &str, pathogens: &str, rpm: &str, spike: &str) -> SampleRecord {
        let names = split_list(pathogens);
        let rpm = pair_ranges(names.len(), &split_list(rpm));
        let spike = pair_ranges(names.len(), &split_list(spike));
        let species = names
            .into_iter()
            .zip(rpm)
            .zip(spike)
            .map(|((name, rpm_range), spike_rpm_range)| SpeciesSpec::WithRanges {
                name,
                rpm_range,
                spike_rpm_range,
            });
        SampleRecord::new(id, species)
    }

    /// First value column of a configuration key, if non-blank.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.column(key, 0)
    }

    pub fn value3(&self, key: &str) -> Option<&str> {
        self.column(key, 2)
    }

    fn column(&self, key: &str, i: usize) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v[i].as_str())
            .filter(|s| !s.is_empty())
    }

    /// `研究编号-研究列表-研究说明`, skipping blank parts.
    pub fn project_label(&self) -> String {
        [KEY_RESEARCH_ID, KEY_RESEARCH_LIST, KEY_RESEARCH_NOTE]
            .iter()
            .filter_map(|k| self.value(k))
            .join("-")
    }

    /// Sequencers listed as `测序仪{i}-SN` / `测序仪{i}-RUN`. Blank serials
    /// are kept so the planner can report them.
    pub fn instruments(&self) -> Result<Vec<InstrumentDescriptor>> {
        let count = self
            .value(KEY_INSTRUMENT_COUNT)
            .and_then(soft_u32)
            .unwrap_or(0);
        (1..=count)
            .filter(|i| self.values.contains_key(&format!("测序仪{i}-SN")))
            .map(|i| {
                let serial = self.value(&format!("测序仪{i}-SN")).unwrap_or_default();
                let key = format!("测序仪{i}-RUN");
                let raw = self.value(&key).unwrap_or_default();
                let run = run_number(raw)
                    .ok_or_else(|| anyhow!("Bad {key} '{raw}' in input sheet"))?;
                Ok(InstrumentDescriptor::new(serial, run))
            })
            .collect()
    }

    /// Overlays the sheet's keys on `params`. Numeric keys are soft: an
    /// unparseable value leaves the parameter as it was.
    pub fn apply_to(&self, params: &mut PlanParameters) -> Result<()> {
        params.project = self.project_label();
        if let Some(id) = self.value(KEY_RESEARCH_ID) {
            params.research_id = id.to_string();
        }
        if let Some(raw) = self.value(KEY_START_DATE) {
            params.start_date = DateCode::parse(raw)
                .with_context(|| format!("Bad {KEY_START_DATE} in input sheet"))?
                .to_string();
        }
        if let Some(days) = self.value(KEY_DAYS).and_then(soft_u32) {
            params.days = days;
        }
        if let Some(sessions) = self.value(KEY_SESSIONS_PER_DAY).and_then(soft_u32) {
            params.sessions_per_day = sessions;
        }
        if let Some(repeats) = self.value(KEY_REPEATS).and_then(soft_u32) {
            params.repeats = Some(repeats).filter(|r| *r > 0);
        }
        if let Some(capacity) = self.value(KEY_CAPACITY).and_then(soft_u32) {
            if capacity > 0 {
                params.capacity = capacity as usize;
            }
        }
        if let Some(total) = self.value(KEY_TOTAL_UNITS) {
            params.total_units = parse_total_units(total);
        }
        if let Some(slot) = self.value(KEY_SLOT_START) {
            params.slot_start = slot
                .parse::<Slot>()
                .with_context(|| format!("Bad {KEY_SLOT_START} in input sheet"))?;
        }
        if let Some(range) = self.value3(KEY_PC) {
            params.pc_spike_rpm_range = range.to_string();
        }
        if let Some(range) = self.value3(KEY_NC) {
            params.nc_spike_rpm_range = range.to_string();
        }
        Ok(())
    }
}
