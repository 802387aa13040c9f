//! What a renderer is allowed to show for an attempt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::behaviour::BehaviourKind;
use crate::question::Hint;
use crate::state::QuestionState;
use crate::step::Response;

/// How much of the mark to reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarksVisibility {
    Hidden,
    MaxOnly,
    MarkAndMax,
}

/// Visibility flags, narrowed by the behaviour before rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub readonly: bool,
    pub correctness: bool,
    pub marks: MarksVisibility,
    pub feedback: bool,
    pub general_feedback: bool,
    pub right_answer: bool,
    pub manual_comment: bool,
    pub history: bool,
    pub num_parts_correct: bool,
}

impl Default for DisplayOptions {
    /// Everything visible, input enabled.
    fn default() -> Self {
        Self {
            readonly: false,
            correctness: true,
            marks: MarksVisibility::MarkAndMax,
            feedback: true,
            general_feedback: true,
            right_answer: true,
            manual_comment: true,
            history: true,
            num_parts_correct: true,
        }
    }
}

impl DisplayOptions {
    /// Hide anything that gives away how the response was graded.
    pub fn hide_all_feedback(&mut self) {
        self.correctness = false;
        self.marks = self.marks.min(MarksVisibility::MaxOnly);
        self.feedback = false;
        self.general_feedback = false;
        self.right_answer = false;
        self.manual_comment = false;
        self.num_parts_correct = false;
    }
}

/// A read-only snapshot of one attempt, filtered by [`DisplayOptions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptView {
    pub slot: usize,
    pub question_id: String,
    pub question_name: String,
    pub behaviour: BehaviourKind,
    pub state: QuestionState,
    pub finished: bool,
    /// Number of committed steps; echoed back as the sequence check.
    pub sequence_check: usize,
    pub max_mark: f64,
    /// `None` unless marks are visible and the attempt has a fraction.
    pub mark: Option<f64>,
    pub fraction: Option<f64>,
    pub response: Response,
    pub response_summary: Option<String>,
    /// Set while the attempt sits in the invalid state.
    pub validation_error: Option<String>,
    pub hint: Option<Hint>,
    /// Present when feedback is visible and the question has several parts.
    pub num_parts_right: Option<(usize, usize)>,
    pub right_answer: Option<String>,
    pub manual_comment: Option<String>,
    /// Latest value of every behaviour variable, keyed without the prefix.
    pub behaviour_vars: BTreeMap<String, String>,
    pub options: DisplayOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hiding_feedback_caps_marks() {
        let mut options = DisplayOptions::default();
        options.hide_all_feedback();
        assert_eq!(options.marks, MarksVisibility::MaxOnly);
        assert!(!options.feedback && !options.correctness && !options.right_answer);
        assert!(options.history);

        let mut hidden = DisplayOptions {
            marks: MarksVisibility::Hidden,
            ..DisplayOptions::default()
        };
        hidden.hide_all_feedback();
        assert_eq!(hidden.marks, MarksVisibility::Hidden);
    }
}
