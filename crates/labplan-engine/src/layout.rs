//! How one chip's adapter slots split between samples and controls. Both
//! planning passes derive chips-per-round from the same layout.

use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Declared unit count floor when the operator gives none.
pub const MIN_TOTAL_UNITS: usize = 54;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipLayout {
    capacity: usize,
    reserved_slots: usize,
}

impl ChipLayout {
    /// The NC block is always placed on every chip; the PC block only when
    /// controls are reserved per chip and a PC catalog exists.
    pub fn new(
        capacity: usize,
        controls_per_unit: bool,
        has_positive_controls: bool,
    ) -> Result<Self, PlanError> {
        if capacity == 0 {
            return Err(PlanError::config("Chip capacity must be a positive integer"));
        }
        let reserved_slots = usize::from(controls_per_unit && has_positive_controls) + 1;
        if capacity <= reserved_slots {
            return Err(PlanError::config(format!(
                "Chip capacity {capacity} leaves no room for samples after {reserved_slots} control slot(s)"
            )));
        }
        Ok(Self {
            capacity,
            reserved_slots,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reserved_slots(&self) -> usize {
        self.reserved_slots
    }

    pub fn sample_slots(&self) -> usize {
        self.capacity - self.reserved_slots
    }

    /// Zero when there are no samples.
    pub fn chips_per_round(&self, sample_count: usize) -> usize {
        sample_count.div_ceil(self.sample_slots())
    }

    /// Sample indices carried by the chip at `position` within a round.
    pub fn segment(&self, position: usize, sample_count: usize) -> Range<usize> {
        let k = self.sample_slots();
        let start = (position * k).min(sample_count);
        let end = ((position + 1) * k).min(sample_count);
        start..end
    }
}

/// How many sample+control slots the chip plan has to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitDemand {
    /// Operator-declared total; zero falls back to [`MIN_TOTAL_UNITS`].
    Declared(usize),
    Samples {
        sample_count: usize,
        layout: ChipLayout,
    },
}

impl UnitDemand {
    pub fn chips_per_round(&self, capacity: usize) -> usize {
        match self {
            Self::Declared(total) => {
                let total = if *total == 0 {
                    log::warn!("No total unit count declared, using floor of {MIN_TOTAL_UNITS}");
                    MIN_TOTAL_UNITS
                } else {
                    *total
                };
                total.div_ceil(capacity.max(1))
            }
            Self::Samples {
                sample_count,
                layout,
            } => layout.chips_per_round(*sample_count).max(1),
        }
    }
}

/// Soft parse of a declared total; anything unusable becomes 0, which the
/// planner treats as "not declared".
pub fn parse_total_units(text: &str) -> usize {
    let t = text.trim();
    t.parse::<usize>()
        .ok()
        .or_else(|| {
            t.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .map(|v| v.ceil() as usize)
        })
        .unwrap_or(0)
}
