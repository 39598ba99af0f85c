//! First pass: how many chips, on which sequencer, on which day, with which
//! run number.

use crate::{
    codec::{self, DateCode},
    error::PlanError,
    layout::UnitDemand,
};
use chrono::Days;
use labplan_protocol::{InstrumentDescriptor, UnitDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound on chips in one plan. Declared totals and day/session counts
/// beyond this are rejected instead of allocated.
pub const MAX_PLANNED_UNITS: usize = 100_000;

/// Next run number per sequencer serial. Each chip consumes the current value
/// and bumps it; counters never reset within a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters(BTreeMap<String, u32>);

impl RunCounters {
    /// Adds starting runs for sequencers not tracked yet. A serial listed
    /// twice takes the later start.
    pub fn seed(mut self, instruments: &[InstrumentDescriptor]) -> Self {
        let mut starts: BTreeMap<String, u32> = BTreeMap::new();
        for instrument in instruments {
            let serial = instrument.serial.trim();
            if serial.is_empty() {
                continue;
            }
            starts.insert(serial.to_string(), instrument.run_start);
        }
        for (serial, run) in starts {
            self.0.entry(serial).or_insert(run);
        }
        self
    }

    pub fn get(&self, serial: &str) -> Option<u32> {
        self.0.get(serial.trim()).copied()
    }

    fn take(&mut self, serial: &str) -> Result<u32, PlanError> {
        let counter = self.0.entry(serial.to_string()).or_insert(0);
        let run = *counter;
        *counter = run.checked_add(1).ok_or_else(|| {
            PlanError::format(
                format!("Run number of sequencer {serial} overflows after {run}"),
                serial,
            )
        })?;
        Ok(run)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u32)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPlanRequest {
    pub project: String,
    /// `YYMMDD` of the first sequencing day.
    pub start_date: String,
    pub days: u32,
    pub sessions_per_day: u32,
    /// Overrides `days * sessions_per_day` when set and non-zero.
    pub repeats: Option<u32>,
    pub capacity: usize,
    pub demand: UnitDemand,
}

impl UnitPlanRequest {
    pub fn sessions_per_day(&self) -> u32 {
        self.sessions_per_day.max(1)
    }

    pub fn repeats(&self) -> Result<u32, PlanError> {
        match self.repeats {
            Some(r) if r > 0 => Ok(r),
            _ => self
                .days
                .max(1)
                .checked_mul(self.sessions_per_day())
                .ok_or_else(|| {
                    PlanError::config(format!(
                        "{} day(s) x {} session(s) per day is too many rounds",
                        self.days, self.sessions_per_day
                    ))
                }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPlan {
    pub units: Vec<UnitDescriptor>,
    pub chips_per_round: usize,
    pub repeats: u32,
    pub next_runs: RunCounters,
    pub warnings: Vec<String>,
}

/// Emits chips date-major, then sequencer in list order, then run. The
/// library pass relies on this order.
pub fn plan_units(
    request: &UnitPlanRequest,
    instruments: &[InstrumentDescriptor],
    counters: RunCounters,
) -> Result<UnitPlan, PlanError> {
    if request.capacity == 0 {
        return Err(PlanError::config("Chip capacity must be a positive integer"));
    }
    let start = DateCode::parse(&request.start_date)?.to_calendar()?;
    let chips_per_round = request.demand.chips_per_round(request.capacity);
    let repeats = request.repeats()?;
    let sessions = request.sessions_per_day();

    let mut warnings = vec![];
    let usable: Vec<&InstrumentDescriptor> = instruments
        .iter()
        .enumerate()
        .filter_map(|(i, instrument)| {
            if instrument.serial.trim().is_empty() {
                let msg = format!("Sequencer #{} has no serial number and was skipped", i + 1);
                log::warn!("{msg}");
                warnings.push(msg);
                None
            } else {
                Some(instrument)
            }
        })
        .collect();

    let total = (repeats as usize)
        .checked_mul(usable.len())
        .and_then(|n| n.checked_mul(chips_per_round))
        .filter(|n| *n <= MAX_PLANNED_UNITS)
        .ok_or_else(|| {
            PlanError::config(format!(
                "{repeats} round(s) x {} sequencer(s) x {chips_per_round} chip(s) exceeds {MAX_PLANNED_UNITS} chips",
                usable.len()
            ))
        })?;

    let mut counters = counters.seed(instruments);
    let mut units = Vec::with_capacity(total);
    for repeat in 0..repeats {
        let day_offset = u64::from(repeat / sessions);
        let date = start
            .checked_add_days(Days::new(day_offset))
            .map(DateCode::from_calendar)
            .ok_or_else(|| {
                PlanError::invalid_input(format!(
                    "Day offset {day_offset} from {} is out of range",
                    request.start_date
                ))
            })?;
        for instrument in &usable {
            let serial = instrument.serial.trim();
            for _ in 0..chips_per_round {
                let run = counters.take(serial)?;
                units.push(UnitDescriptor {
                    project: request.project.clone(),
                    date_code: date.yymmdd().to_string(),
                    instrument_serial: serial.to_string(),
                    run,
                    unit_serial: codec::unit_serial(&date, serial, run),
                    model: instrument.model.clone().unwrap_or_default(),
                    result: String::new(),
                    remark: String::new(),
                });
            }
        }
    }

    log::info!(
        "Planned {} chips: {} repeat(s), {} sequencer(s), {} chip(s) per round",
        units.len(),
        repeats,
        usable.len(),
        chips_per_round
    );

    Ok(UnitPlan {
        units,
        chips_per_round,
        repeats,
        next_runs: counters,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorCode, layout::ChipLayout};

    fn request(start: &str) -> UnitPlanRequest {
        UnitPlanRequest {
            project: "F0020-分析性能-污染的控制措施".to_string(),
            start_date: start.to_string(),
            days: 1,
            sessions_per_day: 1,
            repeats: None,
            capacity: 96,
            demand: UnitDemand::Declared(0),
        }
    }

    fn instrument(serial: &str, run: u32) -> InstrumentDescriptor {
        InstrumentDescriptor::new(serial, run)
    }

    #[test]
    fn test_single_sequencer_single_chip() {
        let plan = plan_units(
            &request("260113"),
            &[instrument("TPNB500477", 143)],
            RunCounters::default(),
        )
        .unwrap();
        assert_eq!(plan.units.len(), 1);
        let u = &plan.units[0];
        assert_eq!(u.run, 143);
        assert_eq!(u.date_code, "260113");
        assert_eq!(u.unit_serial, "260113_TPNB500477_0143_AXXXXXXXXX");
        assert_eq!(u.result, "");
        assert_eq!(plan.next_runs.get("TPNB500477"), Some(144));
    }

    #[test]
    fn test_emission_order_and_monotonic_runs() {
        let mut req = request("260130");
        req.days = 2;
        req.sessions_per_day = 2;
        req.demand = UnitDemand::Declared(150);
        let instruments = [instrument("SN001", 10), instrument("SN002", 500)];
        let plan = plan_units(&req, &instruments, RunCounters::default()).unwrap();
        assert_eq!(plan.repeats, 4);
        assert_eq!(plan.chips_per_round, 2);
        assert_eq!(plan.units.len(), 4 * 2 * 2);

        let summary: Vec<(&str, &str, u32)> = plan
            .units
            .iter()
            .map(|u| (u.date_code.as_str(), u.instrument_serial.as_str(), u.run))
            .collect();
        assert_eq!(
            &summary[0..8],
            &[
                ("260130", "SN001", 10),
                ("260130", "SN001", 11),
                ("260130", "SN002", 500),
                ("260130", "SN002", 501),
                ("260130", "SN001", 12),
                ("260130", "SN001", 13),
                ("260130", "SN002", 502),
                ("260130", "SN002", 503),
            ]
        );
        assert_eq!(summary[8], ("260131", "SN001", 14));
        assert_eq!(summary[15], ("260131", "SN002", 507));

        for sn in ["SN001", "SN002"] {
            let runs: Vec<u32> = plan
                .units
                .iter()
                .filter(|u| u.instrument_serial == sn)
                .map(|u| u.run)
                .collect();
            assert!(runs.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }

    #[test]
    fn test_explicit_repeats_override_days() {
        let mut req = request("260113");
        req.days = 5;
        req.sessions_per_day = 3;
        req.repeats = Some(2);
        let plan = plan_units(&req, &[instrument("SN001", 1)], RunCounters::default()).unwrap();
        assert_eq!(plan.units.len(), 2);
        assert!(plan.units.iter().all(|u| u.date_code == "260113"));
    }

    #[test]
    fn test_month_rollover() {
        let mut req = request("261231");
        req.days = 2;
        let plan = plan_units(&req, &[instrument("SN001", 1)], RunCounters::default()).unwrap();
        assert_eq!(plan.units[1].date_code, "270101");
    }

    #[test]
    fn test_blank_serial_is_skipped() {
        let plan = plan_units(
            &request("260113"),
            &[instrument("  ", 5), instrument("SN002", 7)],
            RunCounters::default(),
        )
        .unwrap();
        assert_eq!(plan.units.len(), 1);
        assert_eq!(plan.units[0].instrument_serial, "SN002");
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_model_is_threaded_through() {
        let mut sn = instrument("SN001", 1);
        sn.model = Some("NextSeq 550".to_string());
        let plan = plan_units(&request("260113"), &[sn], RunCounters::default()).unwrap();
        assert_eq!(plan.units[0].model, "NextSeq 550");
    }

    #[test]
    fn test_counters_thread_across_plans() {
        let instruments = [instrument("SN001", 143)];
        let first = plan_units(&request("260113"), &instruments, RunCounters::default()).unwrap();
        let second = plan_units(&request("260114"), &instruments, first.next_runs).unwrap();
        assert_eq!(second.units[0].run, 144);
    }

    #[test]
    fn test_demand_from_samples() {
        let mut req = request("260113");
        req.demand = UnitDemand::Samples {
            sample_count: 200,
            layout: ChipLayout::new(96, true, true).unwrap(),
        };
        let plan = plan_units(&req, &[instrument("SN001", 1)], RunCounters::default()).unwrap();
        assert_eq!(plan.chips_per_round, 3);
    }

    #[test]
    fn test_failures() {
        let mut req = request("260113");
        req.capacity = 0;
        let err = plan_units(&req, &[instrument("SN001", 1)], RunCounters::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);

        let err = plan_units(&request("2601"), &[instrument("SN001", 1)], RunCounters::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Format);
        assert_eq!(err.value.as_deref(), Some("2601"));

        let err = plan_units(&request("261345"), &[instrument("SN001", 1)], RunCounters::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Format);
    }

    #[test]
    fn test_oversized_plans_are_rejected() {
        let mut req = request("260113");
        req.demand = UnitDemand::Declared(1_000_000_000_000_000_000);
        let err = plan_units(&req, &[instrument("SN001", 1)], RunCounters::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);

        let mut req = request("260113");
        req.days = 100_000;
        req.sessions_per_day = 100_000;
        let err = plan_units(&req, &[instrument("SN001", 1)], RunCounters::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);

        let mut req = request("260113");
        req.repeats = Some(u32::MAX);
        let err = plan_units(&req, &[instrument("SN001", 1)], RunCounters::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::Config);
    }

    #[test]
    fn test_run_number_overflow_names_the_sequencer() {
        let mut req = request("260113");
        req.days = 2;
        let err = plan_units(&req, &[instrument("SN001", u32::MAX)], RunCounters::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Format);
        assert_eq!(err.value.as_deref(), Some("SN001"));
    }
}
