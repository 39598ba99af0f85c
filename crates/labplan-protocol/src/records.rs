use serde::{Deserialize, Serialize};

/// A pathogen/species as it arrives from the input sheet: either a bare name
/// or a name with its rpm ranges. Normalized into [`SpeciesEntry`] before it
/// reaches the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpeciesSpec {
    Name(String),
    WithRanges {
        name: String,
        #[serde(default)]
        rpm_range: String,
        #[serde(default)]
        spike_rpm_range: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesEntry {
    pub name: String,
    pub rpm_range: String,
    pub spike_rpm_range: String,
}

impl From<SpeciesSpec> for SpeciesEntry {
    fn from(spec: SpeciesSpec) -> Self {
        match spec {
            SpeciesSpec::Name(name) => Self {
                name: name.trim().to_string(),
                ..Self::default()
            },
            SpeciesSpec::WithRanges {
                name,
                rpm_range,
                spike_rpm_range,
            } => Self {
                name: name.trim().to_string(),
                rpm_range: rpm_range.trim().to_string(),
                spike_rpm_range: spike_rpm_range.trim().to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sample_id: String,
    #[serde(default)]
    pub species: Vec<SpeciesEntry>,
}

impl SampleRecord {
    pub fn new<I, S>(sample_id: &str, species: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SpeciesEntry>,
    {
        Self {
            sample_id: sample_id.trim().to_string(),
            species: species.into_iter().map(Into::into).collect(),
        }
    }

    /// First non-empty spike range among the species entries; the whole
    /// sample shares one spike value.
    pub fn spike_rpm_range(&self) -> Option<&str> {
        self.species
            .iter()
            .map(|s| s.spike_rpm_range.trim())
            .find(|r| !r.is_empty())
    }
}

/// One row of the PC or NC control catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlEntry {
    pub species: String,
    pub classification: String,
    pub taxid: String,
    pub rpm: String,
}

/// Species list lookup result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesInfo {
    pub classification: String,
    pub taxid: String,
    pub latin_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentDescriptor {
    pub serial: String,
    #[serde(default)]
    pub run_start: u32,
    #[serde(default)]
    pub model: Option<String>,
}

impl InstrumentDescriptor {
    pub fn new(serial: &str, run_start: u32) -> Self {
        Self {
            serial: serial.trim().to_string(),
            run_start,
            model: None,
        }
    }
}

/// One chip on one sequencer run. `result` and `remark` belong to the
/// operator and are only carried through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitDescriptor {
    pub project: String,
    pub date_code: String,
    pub instrument_serial: String,
    pub run: u32,
    pub unit_serial: String,
    pub model: String,
    pub result: String,
    pub remark: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LibraryKind {
    Sample,
    PositiveControl,
    NegativeControl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRecord {
    pub kind: LibraryKind,
    pub unit_serial: String,
    pub data_volume: String,
    pub upload_date: String,
    pub display_name: String,
    pub library_id: String,
    pub slot: String,
    pub species: String,
    pub classification: String,
    pub taxid: String,
    pub latin_name: String,
    pub rpm: Option<f64>,
    pub spike_rpm: Option<f64>,
}
