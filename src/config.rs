//! `labplan.toml`: site defaults for chip capacity, control naming and where
//! the lookup tables live. Every field is optional.

use anyhow::{Context, Result};
use labplan_engine::{PlanParameters, codec::Slot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "labplan.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub capacity: usize,
    pub sessions_per_day: u32,
    pub controls_per_unit: bool,
    pub data_volume: String,
    pub control_prefix: String,
    pub slot_start: Slot,
    pub catalogs: CatalogPaths,
    pub templates: TemplatePaths,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let params = PlanParameters::default();
        Self {
            capacity: params.capacity,
            sessions_per_day: params.sessions_per_day,
            controls_per_unit: params.controls_per_unit,
            data_volume: params.data_volume,
            control_prefix: params.control_prefix,
            slot_start: params.slot_start,
            catalogs: CatalogPaths::default(),
            templates: TemplatePaths::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogPaths {
    pub species: Option<PathBuf>,
    pub sequencers: Option<PathBuf>,
    pub positive_controls: Option<PathBuf>,
    pub negative_controls: Option<PathBuf>,
}

/// CSV files whose first row fixes the output column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatePaths {
    pub units: Option<PathBuf>,
    pub libraries: Option<PathBuf>,
}

impl PlannerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file '{}'", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Could not parse config file '{}'", path.display()))
    }

    /// A missing file yields the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config at '{}', using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).context("Could not serialize config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Could not write config file '{}'", path.display()))
    }

    pub fn apply_to(&self, params: &mut PlanParameters) {
        params.capacity = self.capacity;
        params.sessions_per_day = self.sessions_per_day;
        params.controls_per_unit = self.controls_per_unit;
        params.data_volume = self.data_volume.clone();
        params.control_prefix = self.control_prefix.clone();
        params.slot_start = self.slot_start;
    }
}
