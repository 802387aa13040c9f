//! Question attempt state tags.
//!
//! Every committed step carries one of these tags. The tag of the last step
//! is the state of the attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fractions below this count as wrong.
const WRONG_BELOW: f64 = 0.000_001;
/// Fractions above this count as right.
const RIGHT_ABOVE: f64 = 0.999_999;

/// The state tag of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionState {
    NotStarted,
    Todo,
    Invalid,
    Complete,
    NeedsGrading,
    GaveUp,
    GradedWrong,
    GradedPartial,
    GradedRight,
    ManuallyGaveUp,
    ManuallyGradedWrong,
    ManuallyGradedPartial,
    ManuallyGradedRight,
}

/// How final a state is. States only ever move to an equal or higher level,
/// except through regrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Finality {
    NotStarted,
    Active,
    Finished,
    Manual,
}

impl QuestionState {
    /// Automatic graded state for a fraction.
    pub fn graded_for_fraction(fraction: f64) -> Self {
        if fraction < WRONG_BELOW {
            QuestionState::GradedWrong
        } else if fraction > RIGHT_ABOVE {
            QuestionState::GradedRight
        } else {
            QuestionState::GradedPartial
        }
    }

    /// Manually graded state for a fraction; `None` means gave up.
    pub fn manually_graded_for_fraction(fraction: Option<f64>) -> Self {
        match fraction {
            None => QuestionState::ManuallyGaveUp,
            Some(f) if f < WRONG_BELOW => QuestionState::ManuallyGradedWrong,
            Some(f) if f > RIGHT_ABOVE => QuestionState::ManuallyGradedRight,
            Some(_) => QuestionState::ManuallyGradedPartial,
        }
    }

    pub fn finality(self) -> Finality {
        match self {
            QuestionState::NotStarted => Finality::NotStarted,
            QuestionState::Todo | QuestionState::Invalid | QuestionState::Complete => {
                Finality::Active
            }
            QuestionState::NeedsGrading
            | QuestionState::GaveUp
            | QuestionState::GradedWrong
            | QuestionState::GradedPartial
            | QuestionState::GradedRight => Finality::Finished,
            QuestionState::ManuallyGaveUp
            | QuestionState::ManuallyGradedWrong
            | QuestionState::ManuallyGradedPartial
            | QuestionState::ManuallyGradedRight => Finality::Manual,
        }
    }

    pub fn is_active(self) -> bool {
        self.finality() == Finality::Active
    }

    pub fn is_finished(self) -> bool {
        self.finality() >= Finality::Finished
    }

    /// Graded automatically or manually, so a fraction is meaningful.
    pub fn is_graded(self) -> bool {
        matches!(
            self,
            QuestionState::GradedWrong
                | QuestionState::GradedPartial
                | QuestionState::GradedRight
                | QuestionState::ManuallyGradedWrong
                | QuestionState::ManuallyGradedPartial
                | QuestionState::ManuallyGradedRight
        )
    }

    pub fn is_commented(self) -> bool {
        self.finality() == Finality::Manual
    }

    pub fn is_gave_up(self) -> bool {
        matches!(self, QuestionState::GaveUp | QuestionState::ManuallyGaveUp)
    }

    /// The state a comment that keeps the current `fraction` moves to.
    ///
    /// Active states are left alone, as is an ungraded `NeedsGrading`.
    /// Finished states become the manually graded bucket of the fraction.
    pub fn commented(self, fraction: Option<f64>) -> Self {
        match self.finality() {
            Finality::NotStarted | Finality::Active => self,
            _ if self == QuestionState::NeedsGrading && fraction.is_none() => self,
            _ => Self::manually_graded_for_fraction(fraction),
        }
    }

    /// CSS-style feedback class used by renderers.
    pub fn feedback_class(self) -> &'static str {
        match self {
            QuestionState::GradedRight | QuestionState::ManuallyGradedRight => "correct",
            QuestionState::GradedPartial | QuestionState::ManuallyGradedPartial => {
                "partiallycorrect"
            }
            QuestionState::GradedWrong | QuestionState::ManuallyGradedWrong => "incorrect",
            _ => "",
        }
    }

    /// Short label shown to students.
    pub fn summary(self) -> &'static str {
        match self {
            QuestionState::NotStarted => "Not yet started",
            QuestionState::Todo => "Not complete",
            QuestionState::Invalid => "Invalid answer",
            QuestionState::Complete => "Answer saved",
            QuestionState::NeedsGrading => "Requires grading",
            QuestionState::GaveUp | QuestionState::ManuallyGaveUp => "Not answered",
            QuestionState::GradedWrong | QuestionState::ManuallyGradedWrong => "Incorrect",
            QuestionState::GradedPartial | QuestionState::ManuallyGradedPartial => {
                "Partially correct"
            }
            QuestionState::GradedRight | QuestionState::ManuallyGradedRight => "Correct",
        }
    }
}

impl fmt::Display for QuestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionState::NotStarted => "notstarted",
            QuestionState::Todo => "todo",
            QuestionState::Invalid => "invalid",
            QuestionState::Complete => "complete",
            QuestionState::NeedsGrading => "needsgrading",
            QuestionState::GaveUp => "gaveup",
            QuestionState::GradedWrong => "gradedwrong",
            QuestionState::GradedPartial => "gradedpartial",
            QuestionState::GradedRight => "gradedright",
            QuestionState::ManuallyGaveUp => "mangaveup",
            QuestionState::ManuallyGradedWrong => "mangrwrong",
            QuestionState::ManuallyGradedPartial => "mangrpartial",
            QuestionState::ManuallyGradedRight => "mangrright",
        };
        f.write_str(s)
    }
}

impl FromStr for QuestionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s.to_lowercase().as_str() {
            "notstarted" => QuestionState::NotStarted,
            "todo" => QuestionState::Todo,
            "invalid" => QuestionState::Invalid,
            "complete" => QuestionState::Complete,
            "needsgrading" => QuestionState::NeedsGrading,
            "gaveup" => QuestionState::GaveUp,
            "gradedwrong" => QuestionState::GradedWrong,
            "gradedpartial" => QuestionState::GradedPartial,
            "gradedright" => QuestionState::GradedRight,
            "mangaveup" => QuestionState::ManuallyGaveUp,
            "mangrwrong" => QuestionState::ManuallyGradedWrong,
            "mangrpartial" => QuestionState::ManuallyGradedPartial,
            "mangrright" => QuestionState::ManuallyGradedRight,
            other => return Err(format!("unknown question state: {other}")),
        };
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graded_buckets() {
        assert_eq!(
            QuestionState::graded_for_fraction(1.0),
            QuestionState::GradedRight
        );
        assert_eq!(
            QuestionState::graded_for_fraction(0.0),
            QuestionState::GradedWrong
        );
        assert_eq!(
            QuestionState::graded_for_fraction(-2.0),
            QuestionState::GradedWrong
        );
        assert_eq!(
            QuestionState::graded_for_fraction(0.5),
            QuestionState::GradedPartial
        );
    }

    #[test]
    fn finality_is_ordered() {
        assert!(Finality::NotStarted < Finality::Active);
        assert!(Finality::Active < Finality::Finished);
        assert!(Finality::Finished < Finality::Manual);
        assert!(QuestionState::Invalid.is_active());
        assert!(!QuestionState::Complete.is_finished());
        assert!(QuestionState::GaveUp.is_finished());
        assert!(QuestionState::ManuallyGradedWrong.is_finished());
        assert!(!QuestionState::NotStarted.is_finished());
    }

    #[test]
    fn comment_retags() {
        assert_eq!(
            QuestionState::GradedWrong.commented(Some(0.0)),
            QuestionState::ManuallyGradedWrong
        );
        assert_eq!(
            QuestionState::GradedRight.commented(Some(1.0)),
            QuestionState::ManuallyGradedRight
        );
        assert_eq!(
            QuestionState::GaveUp.commented(None),
            QuestionState::ManuallyGaveUp
        );
        assert_eq!(
            QuestionState::NeedsGrading.commented(None),
            QuestionState::NeedsGrading
        );
        assert_eq!(QuestionState::Todo.commented(Some(0.5)), QuestionState::Todo);
    }

    #[test]
    fn display_and_parse() {
        for state in [
            QuestionState::Todo,
            QuestionState::GradedPartial,
            QuestionState::ManuallyGaveUp,
            QuestionState::ManuallyGradedRight,
        ] {
            assert_eq!(state.to_string().parse::<QuestionState>().unwrap(), state);
        }
        assert!("finished".parse::<QuestionState>().is_err());
    }
}
