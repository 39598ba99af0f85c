//! Builds a fresh planning state from the input sheet, the reference tables
//! and the site config. Precedence is config, then input sheet.

use crate::{
    catalog::{SequencerCatalog, SpeciesCatalog, load_controls},
    config::PlannerConfig,
    input::InputTable,
};
use anyhow::Result;
use labplan_engine::{PlanInputs, PlanParameters, PlanState};
use std::path::Path;

pub fn assemble(input: &InputTable, config: &PlannerConfig) -> Result<PlanState> {
    let mut parameters = PlanParameters::default();
    config.apply_to(&mut parameters);
    input.apply_to(&mut parameters)?;

    let catalogs = &config.catalogs;
    let species = match &catalogs.species {
        Some(path) => SpeciesCatalog::load(path)?,
        None => SpeciesCatalog::default(),
    };
    let sequencers = match &catalogs.sequencers {
        Some(path) => SequencerCatalog::load(path)?,
        None => SequencerCatalog::default(),
    };
    let controls = load_controls(
        catalogs.positive_controls.as_deref(),
        catalogs.negative_controls.as_deref(),
    )?;

    let mut instruments = input.instruments()?;
    sequencers.resolve(&mut instruments);
    for instrument in instruments.iter().filter(|i| i.model.is_none()) {
        log::debug!("No model on record for sequencer '{}'", instrument.serial);
    }

    Ok(PlanState {
        inputs: PlanInputs {
            samples: input.samples.clone(),
            instruments,
            controls,
            species: species.entries,
        },
        parameters,
        ..PlanState::default()
    })
}

pub fn assemble_from_path(input: &Path, config: &PlannerConfig) -> Result<PlanState> {
    let table = InputTable::from_path(input)?;
    assemble(&table, config)
}
