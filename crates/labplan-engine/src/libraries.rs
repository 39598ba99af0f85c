//! Second pass: samples and controls onto the operator-confirmed chip list.

use crate::{
    codec::{self, DateCode, Slot},
    error::PlanError,
    layout::ChipLayout,
    range,
};
use labplan_protocol::{
    ControlEntry, LibraryKind, LibraryRecord, SampleRecord, SpeciesInfo, UnitDescriptor,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
};

pub const DEFAULT_DATA_VOLUME: &str = "420M";
pub const DEFAULT_CONTROL_PREFIX: &str = "F";
pub const NC_DEFAULT_SPECIES: &str = "/";

pub trait SpeciesLookup {
    fn species_info(&self, name: &str) -> Option<&SpeciesInfo>;
}

impl<S: BuildHasher> SpeciesLookup for HashMap<String, SpeciesInfo, S> {
    fn species_info(&self, name: &str) -> Option<&SpeciesInfo> {
        self.get(name)
    }
}

impl SpeciesLookup for BTreeMap<String, SpeciesInfo> {
    fn species_info(&self, name: &str) -> Option<&SpeciesInfo> {
        self.get(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlCatalogs {
    pub positive: Vec<ControlEntry>,
    pub negative: Vec<ControlEntry>,
}

impl ControlCatalogs {
    pub fn negative_species(&self) -> String {
        self.negative
            .first()
            .map(|nc| nc.species.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(NC_DEFAULT_SPECIES)
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryPlanConfig {
    pub slot_start: Slot,
    pub capacity: usize,
    pub controls_per_unit: bool,
    pub research_id: String,
    pub control_prefix: String,
    pub data_volume: String,
    pub pc_spike_rpm_range: String,
    pub nc_spike_rpm_range: String,
}

impl Default for LibraryPlanConfig {
    fn default() -> Self {
        Self {
            slot_start: Slot::FIRST,
            capacity: 96,
            controls_per_unit: true,
            research_id: String::new(),
            control_prefix: DEFAULT_CONTROL_PREFIX.to_string(),
            data_volume: DEFAULT_DATA_VOLUME.to_string(),
            pc_spike_rpm_range: String::new(),
            nc_spike_rpm_range: String::new(),
        }
    }
}

impl LibraryPlanConfig {
    /// `F-<research id>-CN-PC` / `-CN-NC`, or bare `PC` / `NC`.
    pub fn control_names(&self) -> (String, String) {
        let rid = self.research_id.trim();
        if rid.is_empty() {
            return ("PC".to_string(), "NC".to_string());
        }
        let prefix = self.control_prefix.trim();
        (
            format!("{prefix}-{rid}-CN-PC"),
            format!("{prefix}-{rid}-CN-NC"),
        )
    }
}

/// A chip whose edited fields passed validation.
struct ResolvedUnit {
    unit_serial: String,
    instrument: String,
    date: DateCode,
    serial_suffix: String,
}

impl ResolvedUnit {
    fn resolve(unit: &UnitDescriptor) -> Result<Self, PlanError> {
        let date = DateCode::parse(&unit.date_code)?;
        let instrument = unit.instrument_serial.trim().to_string();
        let serial_suffix = codec::last_digits(&instrument, 3)?;
        let unit_serial = match unit.unit_serial.trim() {
            "" => codec::unit_serial(&date, &instrument, unit.run),
            edited => edited.to_string(),
        };
        Ok(Self {
            unit_serial,
            instrument,
            date,
            serial_suffix,
        })
    }

    fn record(&self, config: &LibraryPlanConfig, kind: LibraryKind) -> LibraryRecord {
        LibraryRecord {
            kind,
            unit_serial: self.unit_serial.clone(),
            data_volume: config.data_volume.clone(),
            upload_date: self.date.dotted(),
            display_name: String::new(),
            library_id: String::new(),
            slot: String::new(),
            species: String::new(),
            classification: String::new(),
            taxid: String::new(),
            latin_name: String::new(),
            rpm: None,
            spike_rpm: None,
        }
    }
}

/// Per-call mutable state: the global adapter cursor and each sequencer's
/// position within its round. Dropped when the call returns.
struct PlanningSession {
    slot: Slot,
    positions: HashMap<String, usize>,
    chips_per_round: usize,
}

impl PlanningSession {
    fn take_slot(&mut self) -> Slot {
        let slot = self.slot;
        self.slot = slot.next();
        slot
    }

    fn next_position(&mut self, instrument: &str) -> Option<usize> {
        if self.chips_per_round == 0 {
            return None;
        }
        let position = self.positions.entry(instrument.to_string()).or_insert(0);
        let current = *position;
        *position = (current + 1) % self.chips_per_round;
        Some(current)
    }
}

pub struct LibraryPlanner<'a> {
    config: &'a LibraryPlanConfig,
    controls: &'a ControlCatalogs,
    species: &'a dyn SpeciesLookup,
}

impl<'a> LibraryPlanner<'a> {
    pub fn new(
        config: &'a LibraryPlanConfig,
        controls: &'a ControlCatalogs,
        species: &'a dyn SpeciesLookup,
    ) -> Self {
        Self {
            config,
            controls,
            species,
        }
    }

    pub fn layout(&self) -> Result<ChipLayout, PlanError> {
        ChipLayout::new(
            self.config.capacity,
            self.config.controls_per_unit,
            !self.controls.positive.is_empty(),
        )
    }

    fn lookup(&self, name: &str) -> SpeciesInfo {
        self.species.species_info(name).cloned().unwrap_or_default()
    }

    /// Builds the full library table. Either every chip is laid out or the
    /// call fails; nothing partial is returned.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        units: &[UnitDescriptor],
        samples: &[SampleRecord],
        rng: &mut R,
    ) -> Result<Vec<LibraryRecord>, PlanError> {
        let layout = self.layout()?;
        let resolved = units
            .iter()
            .map(ResolvedUnit::resolve)
            .collect::<Result<Vec<_>, _>>()?;

        let mut session = PlanningSession {
            slot: self.config.slot_start,
            positions: HashMap::new(),
            chips_per_round: layout.chips_per_round(samples.len()),
        };
        let (pc_name, nc_name) = self.config.control_names();
        let mut out = vec![];

        for unit in &resolved {
            let first_slot = session.slot;
            let segment = session
                .next_position(&unit.instrument)
                .map(|p| layout.segment(p, samples.len()))
                .unwrap_or(0..0);
            log::debug!(
                "chip {}: samples {:?} from adapter {first_slot}",
                unit.unit_serial,
                segment
            );

            for sample in &samples[segment] {
                self.emit_sample(unit, sample, session.take_slot(), rng, &mut out);
            }
            if self.config.controls_per_unit && !self.controls.positive.is_empty() {
                self.emit_positive(unit, &pc_name, session.take_slot(), rng, &mut out);
            }
            self.emit_negative(unit, &nc_name, session.take_slot(), rng, &mut out);
        }

        log::info!(
            "Planned {} library rows on {} chips ({} samples, {} sample slots per chip)",
            out.len(),
            resolved.len(),
            samples.len(),
            layout.sample_slots()
        );
        Ok(out)
    }

    fn emit_sample<R: Rng + ?Sized>(
        &self,
        unit: &ResolvedUnit,
        sample: &SampleRecord,
        slot: Slot,
        rng: &mut R,
        out: &mut Vec<LibraryRecord>,
    ) {
        let sample_id = sample.sample_id.trim();
        let library_id = format!(
            "{sample_id}-{}-{slot}-{}",
            unit.serial_suffix,
            unit.date.canonical()
        );
        let spike_rpm = sample
            .spike_rpm_range()
            .and_then(|r| range::sample_text(r, rng));

        let mut base = unit.record(self.config, LibraryKind::Sample);
        base.display_name = sample_id.to_string();
        base.library_id = library_id;
        base.slot = slot.to_string();
        base.spike_rpm = spike_rpm;

        if sample.species.is_empty() {
            out.push(base);
            return;
        }
        for species in &sample.species {
            let info = self.lookup(&species.name);
            out.push(LibraryRecord {
                species: species.name.clone(),
                classification: info.classification,
                taxid: info.taxid,
                latin_name: info.latin_name,
                rpm: range::sample_text(&species.rpm_range, rng),
                ..base.clone()
            });
        }
    }

    fn emit_positive<R: Rng + ?Sized>(
        &self,
        unit: &ResolvedUnit,
        pc_name: &str,
        slot: Slot,
        rng: &mut R,
        out: &mut Vec<LibraryRecord>,
    ) {
        let spike_rpm = range::sample_text(&self.config.pc_spike_rpm_range, rng);
        let mut base = unit.record(self.config, LibraryKind::PositiveControl);
        base.display_name = pc_name.to_string();
        base.library_id = format!("{pc_name}-{slot}-{}", unit.date.canonical());
        base.slot = slot.to_string();
        base.spike_rpm = spike_rpm;

        for pc in &self.controls.positive {
            let name = pc.species.trim();
            let info = self.lookup(name);
            let or_lookup = |own: &str, fallback: String| match own.trim() {
                "" => fallback,
                own => own.to_string(),
            };
            out.push(LibraryRecord {
                species: name.to_string(),
                classification: or_lookup(&pc.classification, info.classification),
                taxid: or_lookup(&pc.taxid, info.taxid),
                latin_name: info.latin_name,
                rpm: range::sample_text(&pc.rpm, rng),
                ..base.clone()
            });
        }
    }

    fn emit_negative<R: Rng + ?Sized>(
        &self,
        unit: &ResolvedUnit,
        nc_name: &str,
        slot: Slot,
        rng: &mut R,
        out: &mut Vec<LibraryRecord>,
    ) {
        let mut rec = unit.record(self.config, LibraryKind::NegativeControl);
        rec.display_name = nc_name.to_string();
        rec.library_id = format!("{nc_name}-{slot}-{}", unit.date.canonical());
        rec.slot = slot.to_string();
        rec.species = self.controls.negative_species();
        rec.spike_rpm = range::sample_text(&self.config.nc_spike_rpm_range, rng);
        out.push(rec);
    }
}
