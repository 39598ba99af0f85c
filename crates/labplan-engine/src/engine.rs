use crate::{
    codec::{self, DateCode, Slot},
    error::{ErrorCode, PlanError},
    layout::{ChipLayout, UnitDemand, parse_total_units},
    libraries::{ControlCatalogs, LibraryPlanConfig, LibraryPlanner},
    units::{RunCounters, UnitPlanRequest, plan_units},
};
use labplan_protocol::{
    InstrumentDescriptor, LibraryRecord, SampleRecord, SpeciesInfo, UnitDescriptor,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type OpId = String;
pub type RunId = String;

const SUPPORTED_PARAMETERS: [&str; 13] = [
    "capacity",
    "days",
    "sessions_per_day",
    "repeats",
    "total_units",
    "slot_start",
    "start_date",
    "research_id",
    "controls_per_unit",
    "data_volume",
    "control_prefix",
    "pc_spike_rpm_range",
    "nc_spike_rpm_range",
];

/// Read-only inputs handed over by the input sheet and the catalogs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanInputs {
    pub samples: Vec<SampleRecord>,
    pub instruments: Vec<InstrumentDescriptor>,
    pub controls: ControlCatalogs,
    pub species: BTreeMap<String, SpeciesInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanParameters {
    pub project: String,
    pub start_date: String,
    pub days: u32,
    pub sessions_per_day: u32,
    pub repeats: Option<u32>,
    /// Zero means "not declared"; the unit count then follows the samples.
    pub total_units: usize,
    pub capacity: usize,
    pub slot_start: Slot,
    pub research_id: String,
    pub controls_per_unit: bool,
    pub data_volume: String,
    pub control_prefix: String,
    pub pc_spike_rpm_range: String,
    pub nc_spike_rpm_range: String,
}

impl Default for PlanParameters {
    fn default() -> Self {
        let lib = LibraryPlanConfig::default();
        Self {
            project: String::new(),
            start_date: String::new(),
            days: 1,
            sessions_per_day: 1,
            repeats: None,
            total_units: 0,
            capacity: lib.capacity,
            slot_start: lib.slot_start,
            research_id: lib.research_id,
            controls_per_unit: lib.controls_per_unit,
            data_volume: lib.data_volume,
            control_prefix: lib.control_prefix,
            pc_spike_rpm_range: lib.pc_spike_rpm_range,
            nc_spike_rpm_range: lib.nc_spike_rpm_range,
        }
    }
}

impl PlanParameters {
    pub fn library_config(&self) -> LibraryPlanConfig {
        LibraryPlanConfig {
            slot_start: self.slot_start,
            capacity: self.capacity,
            controls_per_unit: self.controls_per_unit,
            research_id: self.research_id.clone(),
            control_prefix: self.control_prefix.clone(),
            data_volume: self.data_volume.clone(),
            pc_spike_rpm_range: self.pc_spike_rpm_range.clone(),
            nc_spike_rpm_range: self.nc_spike_rpm_range.clone(),
        }
    }

    /// Applies one named parameter. Returns the stored value as text.
    pub fn set(&mut self, name: &str, value: &Value) -> Result<String, PlanError> {
        match name {
            "capacity" => {
                let capacity = value_u64(name, value)? as usize;
                if capacity == 0 {
                    return Err(PlanError::config("Chip capacity must be a positive integer"));
                }
                self.capacity = capacity;
            }
            "days" => self.days = value_u32(name, value)?,
            "sessions_per_day" => self.sessions_per_day = value_u32(name, value)?,
            "repeats" => {
                self.repeats = match value {
                    Value::Null => None,
                    _ => Some(value_u32(name, value)?).filter(|r| *r > 0),
                }
            }
            "total_units" => {
                self.total_units = match value {
                    Value::String(s) => parse_total_units(s),
                    _ => usize::try_from(value_u64(name, value)?).map_err(|_| {
                        PlanError::invalid_input(format!("SetParameter {name} is out of range"))
                    })?,
                }
            }
            "slot_start" => self.slot_start = value_str(name, value)?.parse::<Slot>()?,
            "start_date" => {
                self.start_date = DateCode::parse(value_str(name, value)?)?.to_string()
            }
            "controls_per_unit" => {
                self.controls_per_unit = value.as_bool().ok_or_else(|| {
                    PlanError::invalid_input(format!("SetParameter {name} requires a boolean"))
                })?
            }
            "research_id" => self.research_id = value_str(name, value)?.trim().to_string(),
            "data_volume" => self.data_volume = value_str(name, value)?.trim().to_string(),
            "control_prefix" => self.control_prefix = value_str(name, value)?.trim().to_string(),
            "pc_spike_rpm_range" => {
                self.pc_spike_rpm_range = value_str(name, value)?.trim().to_string()
            }
            "nc_spike_rpm_range" => {
                self.nc_spike_rpm_range = value_str(name, value)?.trim().to_string()
            }
            _ => {
                return Err(PlanError::invalid_input(format!(
                    "Unknown parameter '{name}'"
                )));
            }
        }
        Ok(self.describe(name))
    }

    fn describe(&self, name: &str) -> String {
        match name {
            "capacity" => self.capacity.to_string(),
            "days" => self.days.to_string(),
            "sessions_per_day" => self.sessions_per_day.to_string(),
            "repeats" => self
                .repeats
                .map(|r| r.to_string())
                .unwrap_or_else(|| "auto".to_string()),
            "total_units" => self.total_units.to_string(),
            "slot_start" => self.slot_start.to_string(),
            "start_date" => self.start_date.clone(),
            "controls_per_unit" => self.controls_per_unit.to_string(),
            "research_id" => self.research_id.clone(),
            "data_volume" => self.data_volume.clone(),
            "control_prefix" => self.control_prefix.clone(),
            "pc_spike_rpm_range" => self.pc_spike_rpm_range.clone(),
            "nc_spike_rpm_range" => self.nc_spike_rpm_range.clone(),
            _ => String::new(),
        }
    }
}

fn value_u64(name: &str, value: &Value) -> Result<u64, PlanError> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => value.as_u64(),
    };
    parsed.ok_or_else(|| {
        PlanError::invalid_input(format!(
            "SetParameter {name} requires a non-negative integer, got {value}"
        ))
    })
}

fn value_u32(name: &str, value: &Value) -> Result<u32, PlanError> {
    u32::try_from(value_u64(name, value)?)
        .map_err(|_| PlanError::invalid_input(format!("SetParameter {name} is out of range")))
}

fn value_str<'v>(name: &str, value: &'v Value) -> Result<&'v str, PlanError> {
    value
        .as_str()
        .ok_or_else(|| PlanError::invalid_input(format!("SetParameter {name} requires a string")))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanState {
    pub inputs: PlanInputs,
    pub parameters: PlanParameters,
    pub units: Vec<UnitDescriptor>,
    pub libraries: Vec<LibraryRecord>,
    pub next_runs: RunCounters,
}

impl PlanState {
    pub fn load_from_path(path: &str) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path).map_err(|e| PlanError {
            code: ErrorCode::Io,
            message: format!("Could not read state file '{path}': {e}"),
            value: None,
        })?;
        serde_json::from_str(&text).map_err(|e| PlanError {
            code: ErrorCode::InvalidInput,
            message: format!("Could not parse state JSON '{path}': {e}"),
            value: None,
        })
    }

    pub fn save_to_path(&self, path: &str) -> Result<(), PlanError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| PlanError {
            code: ErrorCode::Internal,
            message: format!("Could not serialize state: {e}"),
            value: None,
        })?;
        std::fs::write(path, text).map_err(|e| PlanError {
            code: ErrorCode::Io,
            message: format!("Could not write state file '{path}': {e}"),
            value: None,
        })
    }

    /// The chip layout implied by the current parameters and PC catalog.
    pub fn layout(&self) -> Result<ChipLayout, PlanError> {
        ChipLayout::new(
            self.parameters.capacity,
            self.parameters.controls_per_unit,
            !self.inputs.controls.positive.is_empty(),
        )
    }

    pub fn unit_demand(&self) -> Result<UnitDemand, PlanError> {
        if self.parameters.total_units > 0 {
            return Ok(UnitDemand::Declared(self.parameters.total_units));
        }
        if self.inputs.samples.is_empty() {
            return Ok(UnitDemand::Declared(0));
        }
        Ok(UnitDemand::Samples {
            sample_count: self.inputs.samples.len(),
            layout: self.layout()?,
        })
    }

    pub fn summary(&self) -> StateSummary {
        StateSummary {
            project: self.parameters.project.clone(),
            start_date: self.parameters.start_date.clone(),
            samples: self.inputs.samples.len(),
            instruments: self.inputs.instruments.len(),
            positive_controls: self.inputs.controls.positive.len(),
            species_known: self.inputs.species.len(),
            units: self.units.len(),
            libraries: self.libraries.len(),
            next_runs: self
                .next_runs
                .iter()
                .map(|(sn, run)| (sn.clone(), *run))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSummary {
    pub project: String,
    pub start_date: String,
    pub samples: usize,
    pub instruments: usize,
    pub positive_controls: usize,
    pub species_known: usize,
    pub units: usize,
    pub libraries: usize,
    pub next_runs: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Pass one: rebuilds the chip list from the instrument starts.
    PlanUnits,
    /// Replaces the chip list with an operator-edited one.
    ReplaceUnits { units: Vec<UnitDescriptor> },
    /// Pass two. Without a seed the draws come from OS entropy.
    PlanLibraries {
        #[serde(default)]
        seed: Option<u64>,
    },
    SetParameter { name: String, value: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub run_id: RunId,
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpResult {
    pub op_id: OpId,
    pub unit_count: usize,
    pub library_count: usize,
    pub warnings: Vec<String>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub run_id: RunId,
    pub op: Operation,
    pub result: OpResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub protocol_version: String,
    pub supported_operations: Vec<String>,
    pub supported_parameters: Vec<String>,
    pub deterministic_with_seed: bool,
}

pub trait Engine {
    fn apply(&mut self, op: Operation) -> Result<OpResult, PlanError>;
    fn apply_workflow(&mut self, wf: Workflow) -> Result<Vec<OpResult>, PlanError>;
    fn snapshot(&self) -> &PlanState;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningEngine {
    state: PlanState,
    journal: Vec<OperationRecord>,
    op_counter: u64,
}

impl PlanningEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: PlanState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &PlanState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PlanState {
        &mut self.state
    }

    pub fn into_state(self) -> PlanState {
        self.state
    }

    pub fn journal(&self) -> &[OperationRecord] {
        &self.journal
    }

    pub fn capabilities() -> Capabilities {
        Capabilities {
            protocol_version: "v1".to_string(),
            supported_operations: vec![
                "PlanUnits".to_string(),
                "ReplaceUnits".to_string(),
                "PlanLibraries".to_string(),
                "SetParameter".to_string(),
            ],
            supported_parameters: SUPPORTED_PARAMETERS.iter().map(|s| s.to_string()).collect(),
            deterministic_with_seed: true,
        }
    }

    fn next_op_id(&mut self) -> OpId {
        self.op_counter += 1;
        format!("op-{}", self.op_counter)
    }

    /// Every branch computes into locals and only commits on success.
    fn apply_internal(&mut self, op: Operation) -> Result<OpResult, PlanError> {
        let mut result = OpResult {
            op_id: self.next_op_id(),
            ..OpResult::default()
        };

        match op {
            Operation::PlanUnits => {
                let params = &self.state.parameters;
                let request = UnitPlanRequest {
                    project: params.project.clone(),
                    start_date: params.start_date.clone(),
                    days: params.days,
                    sessions_per_day: params.sessions_per_day,
                    repeats: params.repeats,
                    capacity: params.capacity,
                    demand: self.state.unit_demand()?,
                };
                let plan = plan_units(
                    &request,
                    &self.state.inputs.instruments,
                    RunCounters::default(),
                )?;
                result.messages.push(format!(
                    "Planned {} chip(s): {} per sequencer per round, {} round(s)",
                    plan.units.len(),
                    plan.chips_per_round,
                    plan.repeats
                ));
                result.warnings.extend(plan.warnings);
                self.state.units = plan.units;
                self.state.next_runs = plan.next_runs;
                self.state.libraries.clear();
            }
            Operation::ReplaceUnits { units } => {
                let mut rederived = 0;
                let units: Vec<UnitDescriptor> = units
                    .into_iter()
                    .map(|mut unit| {
                        if unit.unit_serial.trim().is_empty() {
                            if let Ok(date) = DateCode::parse(&unit.date_code) {
                                unit.unit_serial =
                                    codec::unit_serial(&date, &unit.instrument_serial, unit.run);
                                rederived += 1;
                            }
                        }
                        unit
                    })
                    .collect();
                if rederived > 0 {
                    result
                        .messages
                        .push(format!("Re-derived {rederived} blank chip serial(s)"));
                }
                result
                    .messages
                    .push(format!("Replaced chip list with {} chip(s)", units.len()));
                self.state.units = units;
                self.state.libraries.clear();
            }
            Operation::PlanLibraries { seed } => {
                if self.state.units.is_empty() {
                    return Err(PlanError::invalid_input(
                        "No chips planned yet; run PlanUnits or ReplaceUnits first",
                    ));
                }
                let config = self.state.parameters.library_config();
                let planner = LibraryPlanner::new(
                    &config,
                    &self.state.inputs.controls,
                    &self.state.inputs.species,
                );
                let mut rng = match seed {
                    Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                    None => ChaCha8Rng::from_entropy(),
                };
                let libraries =
                    planner.plan(&self.state.units, &self.state.inputs.samples, &mut rng)?;
                let unmatched: Vec<&str> = self
                    .state
                    .inputs
                    .samples
                    .iter()
                    .flat_map(|s| s.species.iter())
                    .map(|s| s.name.as_str())
                    .filter(|name| !name.is_empty() && !self.state.inputs.species.contains_key(*name))
                    .collect();
                for name in unmatched {
                    let msg = format!("Species '{name}' not found in the species list");
                    if !result.warnings.contains(&msg) {
                        log::warn!("{msg}");
                        result.warnings.push(msg);
                    }
                }
                result.messages.push(format!(
                    "Planned {} library row(s) on {} chip(s)",
                    libraries.len(),
                    self.state.units.len()
                ));
                self.state.libraries = libraries;
            }
            Operation::SetParameter { name, value } => {
                let mut params = self.state.parameters.clone();
                let stored = params.set(&name, &value)?;
                self.state.parameters = params;
                result
                    .messages
                    .push(format!("Set parameter '{name}' to {stored}"));
            }
        }

        result.unit_count = self.state.units.len();
        result.library_count = self.state.libraries.len();
        Ok(result)
    }
}

impl Engine for PlanningEngine {
    fn apply(&mut self, op: Operation) -> Result<OpResult, PlanError> {
        let run_id = "interactive".to_string();
        let result = self.apply_internal(op.clone())?;
        self.journal.push(OperationRecord {
            run_id,
            op,
            result: result.clone(),
        });
        Ok(result)
    }

    fn apply_workflow(&mut self, wf: Workflow) -> Result<Vec<OpResult>, PlanError> {
        let mut results = Vec::new();
        for op in &wf.ops {
            let result = self.apply_internal(op.clone())?;
            self.journal.push(OperationRecord {
                run_id: wf.run_id.clone(),
                op: op.clone(),
                result: result.clone(),
            });
            results.push(result);
        }
        Ok(results)
    }

    fn snapshot(&self) -> &PlanState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labplan_protocol::{ControlEntry, LibraryKind, SpeciesSpec};
    use serde_json::json;

    fn state() -> PlanState {
        let mut state = PlanState::default();
        state.parameters.project = "F0020-分析性能".to_string();
        state.parameters.start_date = "260113".to_string();
        state.inputs.instruments = vec![InstrumentDescriptor::new("TPNB500477", 143)];
        state.inputs.samples = vec![SampleRecord::new(
            "F-0020-01",
            vec![SpeciesSpec::WithRanges {
                name: "肺炎支原体".to_string(),
                rpm_range: "1~10".to_string(),
                spike_rpm_range: "7000~10000".to_string(),
            }],
        )];
        state
    }

    #[test]
    fn test_plan_units_then_libraries() {
        let mut engine = PlanningEngine::from_state(state());
        let res = engine.apply(Operation::PlanUnits).unwrap();
        assert_eq!(res.op_id, "op-1");
        assert_eq!(res.unit_count, 1);
        assert_eq!(engine.state().units[0].run, 143);
        assert_eq!(engine.state().next_runs.get("TPNB500477"), Some(144));

        let res = engine
            .apply(Operation::PlanLibraries { seed: Some(42) })
            .unwrap();
        assert_eq!(res.library_count, 2);
        assert_eq!(res.warnings.len(), 1);
        let libs = &engine.state().libraries;
        assert_eq!(libs[0].library_id, "F-0020-01-477-A01-20260113");
        assert_eq!(libs[1].kind, LibraryKind::NegativeControl);
        assert_eq!(engine.journal().len(), 2);
    }

    #[test]
    fn test_declared_total_overrides_sample_demand() {
        let mut engine = PlanningEngine::from_state(state());
        engine
            .apply(Operation::SetParameter {
                name: "total_units".to_string(),
                value: json!(200),
            })
            .unwrap();
        let res = engine.apply(Operation::PlanUnits).unwrap();
        assert_eq!(res.unit_count, 3);
    }

    #[test]
    fn test_unit_demand_follows_library_layout() {
        let mut s = state();
        s.parameters.capacity = 4;
        s.inputs.controls.positive = vec![ControlEntry {
            species: "铜绿假单胞菌".to_string(),
            ..ControlEntry::default()
        }];
        s.inputs.samples = (1..=5)
            .map(|i| SampleRecord::new(&format!("F-0020-{i:02}"), Vec::<SpeciesSpec>::new()))
            .collect();
        let layout = s.layout().unwrap();
        assert_eq!(layout.sample_slots(), 2);
        let mut engine = PlanningEngine::from_state(s);
        let res = engine.apply(Operation::PlanUnits).unwrap();
        assert_eq!(res.unit_count, 3);
        engine
            .apply(Operation::PlanLibraries { seed: Some(1) })
            .unwrap();
        let sample_rows = engine
            .state()
            .libraries
            .iter()
            .filter(|l| l.kind == LibraryKind::Sample)
            .count();
        assert_eq!(sample_rows, 5);
    }

    #[test]
    fn test_failed_plan_libraries_keeps_previous_libraries() {
        let mut s = state();
        s.inputs.controls.positive = vec![ControlEntry {
            species: "铜绿假单胞菌".to_string(),
            rpm: "5".to_string(),
            ..ControlEntry::default()
        }];
        let mut engine = PlanningEngine::from_state(s);
        engine.apply(Operation::PlanUnits).unwrap();
        engine
            .apply(Operation::PlanLibraries { seed: Some(7) })
            .unwrap();
        let libraries = engine.state().libraries.clone();
        assert!(!libraries.is_empty());

        engine
            .apply(Operation::SetParameter {
                name: "capacity".to_string(),
                value: json!(2),
            })
            .unwrap();
        let err = engine
            .apply(Operation::PlanLibraries { seed: Some(8) })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);
        assert_eq!(engine.state().libraries, libraries);
        assert_eq!(engine.journal().len(), 3);
    }

    #[test]
    fn test_oversized_unit_plan_is_an_error() {
        let mut engine = PlanningEngine::from_state(state());
        engine.apply(Operation::PlanUnits).unwrap();
        let units = engine.state().units.clone();

        engine
            .apply(Operation::SetParameter {
                name: "total_units".to_string(),
                value: json!(1_000_000_000_000_000_000u64),
            })
            .unwrap();
        let err = engine.apply(Operation::PlanUnits).unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);
        assert_eq!(engine.state().units, units);

        let mut engine = PlanningEngine::from_state(state());
        for (name, value) in [("days", 100_000), ("sessions_per_day", 100_000)] {
            engine
                .apply(Operation::SetParameter {
                    name: name.to_string(),
                    value: json!(value),
                })
                .unwrap();
        }
        assert_eq!(
            engine.apply(Operation::PlanUnits).unwrap_err().code,
            ErrorCode::Config
        );

        let mut s = state();
        s.inputs.instruments = vec![InstrumentDescriptor::new("TPNB500477", u32::MAX)];
        s.parameters.days = 2;
        let err = PlanningEngine::from_state(s)
            .apply(Operation::PlanUnits)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Format);
    }

    #[test]
    fn test_failed_operations_do_not_commit() {
        let mut engine = PlanningEngine::from_state(state());
        engine.apply(Operation::PlanUnits).unwrap();
        engine
            .apply(Operation::PlanLibraries { seed: Some(7) })
            .unwrap();
        let before = engine.state().clone();

        let mut bad = before.units.clone();
        bad[0].instrument_serial = "SN".to_string();
        engine.apply(Operation::ReplaceUnits { units: bad }).unwrap();
        let err = engine
            .apply(Operation::PlanLibraries { seed: Some(7) })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Format);
        assert!(engine.state().libraries.is_empty());
        assert_eq!(engine.state().units[0].instrument_serial, "SN");

        let mut engine = PlanningEngine::from_state(before.clone());
        let err = engine
            .apply(Operation::SetParameter {
                name: "start_date".to_string(),
                value: json!("2026-01-13"),
            })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Format);
        assert_eq!(engine.state(), &before);
        assert!(engine.journal().is_empty());
    }

    #[test]
    fn test_plan_libraries_requires_units() {
        let mut engine = PlanningEngine::from_state(state());
        let err = engine
            .apply(Operation::PlanLibraries { seed: None })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_replace_units_rederives_blank_serials() {
        let mut engine = PlanningEngine::from_state(state());
        engine.apply(Operation::PlanUnits).unwrap();
        let mut units = engine.state().units.clone();
        units[0].run = 150;
        units[0].unit_serial = String::new();
        let res = engine.apply(Operation::ReplaceUnits { units }).unwrap();
        assert!(res.messages.iter().any(|m| m.contains("Re-derived 1")));
        assert_eq!(
            engine.state().units[0].unit_serial,
            "260113_TPNB500477_0150_AXXXXXXXXX"
        );
    }

    #[test]
    fn test_set_parameter_validation() {
        let mut engine = PlanningEngine::new();
        let set = |engine: &mut PlanningEngine, name: &str, value: Value| {
            engine.apply(Operation::SetParameter {
                name: name.to_string(),
                value,
            })
        };
        let res = set(&mut engine, "slot_start", json!("b05")).unwrap();
        assert!(res.messages[0].contains("B05"));
        assert_eq!(engine.state().parameters.slot_start.to_string(), "B05");
        assert_eq!(
            set(&mut engine, "slot_start", json!("C05")).unwrap_err().code,
            ErrorCode::Format
        );
        assert_eq!(
            set(&mut engine, "capacity", json!(0)).unwrap_err().code,
            ErrorCode::Config
        );
        assert_eq!(
            set(&mut engine, "capacity", json!("many")).unwrap_err().code,
            ErrorCode::InvalidInput
        );
        assert_eq!(
            set(&mut engine, "controls_per_unit", json!("yes")).unwrap_err().code,
            ErrorCode::InvalidInput
        );
        assert_eq!(
            set(&mut engine, "colour", json!(1)).unwrap_err().code,
            ErrorCode::InvalidInput
        );
        set(&mut engine, "capacity", json!("48")).unwrap();
        set(&mut engine, "repeats", json!(0)).unwrap();
        set(&mut engine, "total_units", json!("lots")).unwrap();
        let p = &engine.state().parameters;
        assert_eq!(p.capacity, 48);
        assert_eq!(p.repeats, None);
        assert_eq!(p.total_units, 0);
    }

    #[test]
    fn test_workflow_is_reproducible_with_seed() {
        let wf = Workflow {
            run_id: "batch-1".to_string(),
            ops: vec![
                Operation::SetParameter {
                    name: "days".to_string(),
                    value: json!(2),
                },
                Operation::PlanUnits,
                Operation::PlanLibraries { seed: Some(99) },
            ],
        };
        let mut a = PlanningEngine::from_state(state());
        let mut b = PlanningEngine::from_state(state());
        let ra = a.apply_workflow(wf.clone()).unwrap();
        let rb = b.apply_workflow(wf).unwrap();
        assert_eq!(ra, rb);
        assert_eq!(a.state().libraries, b.state().libraries);
        assert_eq!(a.state().units.len(), 2);
        assert_eq!(a.journal()[0].run_id, "batch-1");
    }

    #[test]
    fn test_operation_json_shape() {
        let op: Operation = serde_json::from_str(r#"{"PlanLibraries":{"seed":3}}"#).unwrap();
        assert_eq!(op, Operation::PlanLibraries { seed: Some(3) });
        let op: Operation = serde_json::from_str(r#""PlanUnits""#).unwrap();
        assert_eq!(op, Operation::PlanUnits);
        let caps = PlanningEngine::capabilities();
        assert_eq!(caps.protocol_version, "v1");
        assert!(caps.supported_parameters.contains(&"slot_start".to_string()));
    }

    #[test]
    fn test_state_save_and_load() {
        let mut engine = PlanningEngine::from_state(state());
        engine.apply(Operation::PlanUnits).unwrap();
        engine
            .apply(Operation::PlanLibraries { seed: Some(5) })
            .unwrap();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        engine.state().save_to_path(path).unwrap();
        let loaded = PlanState::load_from_path(path).unwrap();
        assert_eq!(&loaded, engine.state());
        assert_eq!(loaded.summary().libraries, 2);

        let err = PlanState::load_from_path("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.code, ErrorCode::Io);
    }
}
