//! Optional numeric range annotations such as `1~10` or `7000-10000`.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub low: f64,
    pub high: f64,
}

impl NumericRange {
    /// Returns `None` for empty or unparseable text. Ranges are optional
    /// annotations, so this is never an error.
    pub fn parse(text: &str) -> Option<Self> {
        let normalized = text
            .trim()
            .replace('～', "~")
            .replace(['-', ','], "~");
        let parts: Vec<&str> = normalized
            .split('~')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        match parts.as_slice() {
            [] => None,
            [single] => {
                let v = Self::parse_number(single)?;
                Some(Self { low: v, high: v })
            }
            [a, b, ..] => {
                let a = Self::parse_number(a)?;
                let b = Self::parse_number(b)?;
                Some(Self {
                    low: a.min(b),
                    high: a.max(b),
                })
            }
        }
    }

    fn parse_number(text: &str) -> Option<f64> {
        text.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    pub fn is_exact(&self) -> bool {
        self.low == self.high
    }

    /// Exact ranges return their value without drawing; otherwise a uniform
    /// draw in `[low, high]` rounded to one decimal.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.is_exact() {
            return self.low;
        }
        let v = rng.gen_range(self.low..=self.high);
        let rounded = (v * 10.0).round() / 10.0;
        rounded.clamp(self.low, self.high)
    }
}

/// Parses and samples in one step; absent text yields an absent value.
pub fn sample_text<R: Rng + ?Sized>(text: &str, rng: &mut R) -> Option<f64> {
    NumericRange::parse(text).map(|r| r.sample(rng))
}
