//! Certainty-based marking.
//!
//! The student rates their certainty alongside each answer and the raw
//! fraction is rescaled so that confident wrong answers cost marks:
//! `adjusted = offset[c] + fraction * factor[c]`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::step::AttemptStep;

use super::{ASSUMED_CERTAINTY, CERTAINTY};

/// A certainty level as submitted in `-certainty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Certainty {
    Low = 1,
    Med = 2,
    High = 3,
}

/// `(offset, factor numerator, factor denominator)` per certainty, indexed
/// by `value - 1`. The factor is kept as a ratio so LOW yields exactly
/// `fraction / 3`.
const ADJUSTMENTS: [(f64, f64, f64); 3] = [
    (0.0, 1.0, 3.0),
    (-2.0 / 3.0, 4.0, 3.0),
    (-2.0, 3.0, 1.0),
];

impl Certainty {
    /// Certainty assumed when the student never gave one.
    pub const DEFAULT: Certainty = Certainty::Low;

    pub const ALL: [Certainty; 3] = [Certainty::Low, Certainty::Med, Certainty::High];

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: &str) -> Option<Self> {
        match value.trim() {
            "1" => Some(Certainty::Low),
            "2" => Some(Certainty::Med),
            "3" => Some(Certainty::High),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Certainty::Low => "C=1 (Unsure: <67%)",
            Certainty::Med => "C=2 (Mid: >67%)",
            Certainty::High => "C=3 (Quite sure: >80%)",
        }
    }

    /// Certainty submitted with a step, ignoring unreadable values.
    pub fn of_step(step: &AttemptStep) -> Option<Self> {
        step.behaviour_var(CERTAINTY).and_then(Self::from_value)
    }
}

impl fmt::Display for Certainty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Rescale a raw fraction for `certainty`.
pub fn adjust_fraction(fraction: f64, certainty: Certainty) -> f64 {
    let (offset, numerator, denominator) = ADJUSTMENTS[usize::from(certainty.value() - 1)];
    offset + fraction * numerator / denominator
}

/// Apply CBM to a pending graded step: store the raw fraction, use the
/// given certainty or record that LOW was assumed, and set the adjusted
/// fraction.
pub(crate) fn apply(pending: &mut AttemptStep, raw: f64, certainty: Option<Certainty>) {
    let certainty = match certainty {
        Some(c) => c,
        None => {
            pending.set_behaviour_var(ASSUMED_CERTAINTY, Certainty::DEFAULT.to_string());
            Certainty::DEFAULT
        }
    };
    super::record_raw_fraction(pending, raw);
    pending.set_fraction(Some(adjust_fraction(raw, certainty)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepData;

    #[test]
    fn boundary_values() {
        assert_eq!(adjust_fraction(1.0, Certainty::High), 1.0);
        assert_eq!(adjust_fraction(0.0, Certainty::High), -2.0);
        for raw in [0.0, 0.1, 0.25, 0.5, 0.7, 1.0] {
            assert_eq!(adjust_fraction(raw, Certainty::Low), raw / 3.0);
        }
    }

    #[test]
    fn medium_certainty() {
        assert!((adjust_fraction(1.0, Certainty::Med) - 2.0 / 3.0).abs() < 1e-12);
        assert!((adjust_fraction(0.0, Certainty::Med) + 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn parse_certainty() {
        assert_eq!(Certainty::from_value("3"), Some(Certainty::High));
        assert_eq!(Certainty::from_value(" 1 "), Some(Certainty::Low));
        assert_eq!(Certainty::from_value("4"), None);
        assert_eq!(Certainty::from_value(""), None);
    }

    #[test]
    fn apply_records_assumption() {
        let mut step = AttemptStep::new(StepData::new(), None);
        apply(&mut step, 1.0, None);
        assert_eq!(step.behaviour_var(ASSUMED_CERTAINTY), Some("1"));
        assert_eq!(step.behaviour_var(super::super::RAW_FRACTION), Some("1"));
        assert_eq!(step.fraction(), Some(1.0 / 3.0));

        let mut step = AttemptStep::new(StepData::new(), None);
        apply(&mut step, 0.0, Some(Certainty::High));
        assert_eq!(step.behaviour_var(ASSUMED_CERTAINTY), None);
        assert_eq!(step.fraction(), Some(-2.0));
    }
}
