//! Identifier conventions: sequencing dates, chip serials, instrument serial
//! suffixes and the 96-slot adapter cycle.

use crate::error::PlanError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Placeholder for the flow-cell id printed on the chip, unknown at planning time.
pub const UNIT_SERIAL_TRAILER: &str = "AXXXXXXXXX";

pub const SLOTS_PER_GROUP: u8 = 48;
pub const SLOT_CYCLE_LEN: usize = 2 * SLOTS_PER_GROUP as usize;

fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// A `YYMMDD` sequencing date, always in the 2000s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateCode {
    yymmdd: String,
}

impl DateCode {
    pub fn parse(raw: &str) -> Result<Self, PlanError> {
        let yymmdd = digits_only(raw.trim());
        if yymmdd.len() != 6 {
            return Err(PlanError::format(
                "Invalid sequencing date, expected 6 digits YYMMDD",
                raw,
            ));
        }
        Ok(Self { yymmdd })
    }

    pub fn from_calendar(date: NaiveDate) -> Self {
        Self {
            yymmdd: date.format("%y%m%d").to_string(),
        }
    }

    pub fn yymmdd(&self) -> &str {
        &self.yymmdd
    }

    /// `20YYMMDD`
    pub fn canonical(&self) -> String {
        format!("20{}", self.yymmdd)
    }

    /// `YYYY.MM.DD`
    pub fn dotted(&self) -> String {
        let c = self.canonical();
        format!("{}.{}.{}", &c[0..4], &c[4..6], &c[6..8])
    }

    pub fn to_calendar(&self) -> Result<NaiveDate, PlanError> {
        let yy: i32 = self.yymmdd[0..2].parse().unwrap_or_default();
        let mm: u32 = self.yymmdd[2..4].parse().unwrap_or_default();
        let dd: u32 = self.yymmdd[4..6].parse().unwrap_or_default();
        NaiveDate::from_ymd_opt(2000 + yy, mm, dd)
            .ok_or_else(|| PlanError::format("Not a calendar date", self.yymmdd.as_str()))
    }
}

impl fmt::Display for DateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.yymmdd)
    }
}

/// Trailing `n` digits of an instrument serial, ignoring letters.
pub fn last_digits(serial: &str, n: usize) -> Result<String, PlanError> {
    let digits = digits_only(serial);
    if digits.len() < n {
        return Err(PlanError::format(
            format!("Cannot take last {n} digits of instrument serial"),
            serial,
        ));
    }
    Ok(digits[digits.len() - n..].to_string())
}

pub fn unit_serial(date: &DateCode, instrument_serial: &str, run: u32) -> String {
    format!(
        "{}_{}_{run:04}_{UNIT_SERIAL_TRAILER}",
        date.yymmdd(),
        instrument_serial.trim()
    )
}

/// Re-derives a chip serial from operator-edited text fields. Run text is
/// reduced to its digits; no digits means run 0.
pub fn unit_serial_from_raw(
    date_raw: &str,
    instrument_serial: &str,
    run_raw: &str,
) -> Result<String, PlanError> {
    let date = DateCode::parse(date_raw)?;
    let run = digits_only(run_raw).parse::<u32>().unwrap_or(0);
    Ok(unit_serial(&date, instrument_serial, run))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotGroup {
    A,
    B,
}

/// One adapter index, `A01..A48` then `B01..B48`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot {
    group: SlotGroup,
    number: u8,
}

impl Slot {
    pub const FIRST: Slot = Slot {
        group: SlotGroup::A,
        number: 1,
    };

    pub fn group(&self) -> SlotGroup {
        self.group
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    /// Position in the cycle, `A01` = 0 .. `B48` = 95.
    pub fn ordinal(&self) -> usize {
        let base = match self.group {
            SlotGroup::A => 0,
            SlotGroup::B => SLOTS_PER_GROUP as usize,
        };
        base + self.number as usize - 1
    }

    pub fn next(self) -> Slot {
        if self.number < SLOTS_PER_GROUP {
            return Slot {
                number: self.number + 1,
                ..self
            };
        }
        match self.group {
            SlotGroup::A => Slot {
                group: SlotGroup::B,
                number: 1,
            },
            SlotGroup::B => Slot::FIRST,
        }
    }
}

impl FromStr for Slot {
    type Err = PlanError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim().to_ascii_uppercase();
        let bad = || PlanError::format("Invalid adapter index, expected A01..A48 or B01..B48", raw);
        let mut chars = s.chars();
        let group = match chars.next() {
            Some('A') => SlotGroup::A,
            Some('B') => SlotGroup::B,
            _ => return Err(bad()),
        };
        let num = chars.as_str();
        if num.len() != 2 || !num.chars().all(|c| c.is_ascii_digit()) {
            return Err(bad());
        }
        let number: u8 = num.parse().map_err(|_| bad())?;
        if !(1..=SLOTS_PER_GROUP).contains(&number) {
            return Err(bad());
        }
        Ok(Slot { group, number })
    }
}

/// Steps one adapter index forward on the global cycle.
pub fn advance(slot: &str) -> Result<String, PlanError> {
    Ok(slot.parse::<Slot>()?.next().to_string())
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:02}", self.group, self.number)
    }
}

impl TryFrom<String> for Slot {
    type Error = PlanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.to_string()
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::FIRST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_slots() -> Vec<Slot> {
        let mut ret = Vec::with_capacity(SLOT_CYCLE_LEN);
        let mut s = Slot::FIRST;
        for _ in 0..SLOT_CYCLE_LEN {
            ret.push(s);
            s = s.next();
        }
        ret
    }

    #[test]
    fn test_date_code_forms() {
        let d = DateCode::parse("260113").unwrap();
        assert_eq!(d.canonical(), "20260113");
        assert_eq!(d.dotted(), "2026.01.13");
        assert_eq!(DateCode::parse(" 26-01-13 ").unwrap().yymmdd(), "260113");
    }

    #[test]
    fn test_date_code_dotted_preserves_digit_order() {
        for raw in ["000101", "991231", "260229", "123456"] {
            let d = DateCode::parse(raw).unwrap();
            let dotted_digits: String = d.dotted().chars().filter(|c| *c != '.').collect();
            assert_eq!(dotted_digits, format!("20{raw}"));
        }
    }

    #[test]
    fn test_date_code_rejects_wrong_length() {
        let err = DateCode::parse("2026-01-13").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Format);
        assert_eq!(err.value.as_deref(), Some("2026-01-13"));
        assert!(DateCode::parse("").is_err());
        assert!(DateCode::parse("26113").is_err());
    }

    #[test]
    fn test_date_code_calendar_round_trip() {
        let d = DateCode::parse("260131").unwrap();
        let next = d.to_calendar().unwrap().succ_opt().unwrap();
        assert_eq!(DateCode::from_calendar(next).yymmdd(), "260201");
        assert!(DateCode::parse("261345").unwrap().to_calendar().is_err());
        assert!(DateCode::parse("250229").unwrap().to_calendar().is_err());
    }

    #[test]
    fn test_last_digits() {
        assert_eq!(last_digits("TPNB500477", 3).unwrap(), "477");
        assert_eq!(last_digits("A-1-2-3", 3).unwrap(), "123");
        let err = last_digits("TPNB12", 3).unwrap_err();
        assert_eq!(err.value.as_deref(), Some("TPNB12"));
        assert!(last_digits("", 3).is_err());
    }

    #[test]
    fn test_unit_serial_is_deterministic() {
        let d = DateCode::parse("260113").unwrap();
        let a = unit_serial(&d, "TPNB500477", 143);
        assert_eq!(a, "260113_TPNB500477_0143_AXXXXXXXXX");
        assert_eq!(a, unit_serial(&d, " TPNB500477 ", 143));
        assert_eq!(
            unit_serial_from_raw("260113", "TPNB500477", "0143").unwrap(),
            a
        );
        assert_eq!(
            unit_serial_from_raw("260113", "X1", "").unwrap(),
            "260113_X1_0000_AXXXXXXXXX"
        );
        assert!(unit_serial_from_raw("2601", "X1", "1").is_err());
    }

    #[test]
    fn test_slot_group_transitions() {
        assert_eq!(advance("A01").unwrap(), "A02");
        assert_eq!(advance("A48").unwrap(), "B01");
        assert_eq!(advance("B48").unwrap(), "A01");
        assert_eq!(advance(" b07 ").unwrap(), "B08");
    }

    #[test]
    fn test_slot_cycle_closes_after_96_steps() {
        let slots = all_slots();
        let ordinals: Vec<usize> = slots.iter().map(Slot::ordinal).collect();
        assert_eq!(ordinals, (0..SLOT_CYCLE_LEN).collect::<Vec<_>>());
        for start in slots {
            let mut s = start;
            for _ in 0..SLOT_CYCLE_LEN {
                s = s.next();
            }
            assert_eq!(s, start);
        }
    }

    #[test]
    fn test_malformed_slots() {
        for raw in ["C01", "A00", "A49", "A1", "A001", "", "AB1", "A-1"] {
            let err = raw.parse::<Slot>().unwrap_err();
            assert_eq!(err.code, crate::error::ErrorCode::Format, "{raw}");
        }
    }

    #[test]
    fn test_slot_serde_as_text() {
        let s: Slot = serde_json::from_str("\"B12\"").unwrap();
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"B12\"");
        assert!(serde_json::from_str::<Slot>("\"Z12\"").is_err());
    }
}
