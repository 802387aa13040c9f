//! Question definitions: the grading contract behaviours rely on.
//!
//! A definition is immutable and shared (`Arc`) by every attempt at that
//! question. Anything an attempt needs to remember about how the question
//! was presented (a shuffled order, say) is written into step 0 by
//! [`QuestionDefinition::init_first_step`] and read back from there.

pub mod essay;
pub mod matching;
pub mod multichoice;
pub mod truefalse;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::behaviour::BehaviourKind;
use crate::error::EngineError;
use crate::state::QuestionState;
use crate::step::{AttemptStep, Response};

pub use essay::EssayQuestion;
pub use matching::{MatchingQuestion, Stem};
pub use multichoice::{Choice, MultiChoiceQuestion};
pub use truefalse::TrueFalseQuestion;

/// Penalty per extra try used by adaptive mode when a question sets none.
pub const DEFAULT_PENALTY: f64 = 0.333_333_3;

/// The grading contract a question type offers to behaviours.
pub trait QuestionDefinition: Send + Sync + fmt::Debug {
    /// Question identifier in the bank.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Question type name (e.g. "truefalse").
    fn qtype(&self) -> &'static str;

    /// Mark this question is worth when no slot-specific mark is given.
    fn default_mark(&self) -> f64;

    /// Lowest fraction `grade_response` can return.
    fn min_fraction(&self) -> f64 {
        0.0
    }

    fn max_fraction(&self) -> f64 {
        1.0
    }

    /// Penalty per extra try for adaptive mode.
    fn penalty(&self) -> f64 {
        DEFAULT_PENALTY
    }

    /// Hints shown between tries in interactive mode.
    fn hints(&self) -> &[Hint] {
        &[]
    }

    /// Response field names this question accepts.
    fn expected_data(&self) -> Vec<String>;

    /// Seed question-type private variables into step 0.
    ///
    /// If `step` already carries them (a regrade replaying a stored first
    /// step), they must be reused as-is and only validated.
    fn init_first_step(&self, _step: &mut AttemptStep) -> Result<(), EngineError> {
        Ok(())
    }

    /// Is this a full answer that can be scored?
    fn is_complete_response(&self, response: &Response) -> bool;

    /// Can a grade be computed at all? Weaker than complete.
    fn is_gradable_response(&self, response: &Response) -> bool {
        self.is_complete_response(response)
    }

    /// Would saving `b` over `a` change nothing?
    fn is_same_response(&self, a: &Response, b: &Response) -> bool {
        self.expected_data()
            .iter()
            .all(|name| field(a, name) == field(b, name))
    }

    /// Score a gradable response.
    fn grade_response(&self, response: &Response) -> Result<(f64, QuestionState), EngineError>;

    /// Message shown when an incomplete response is submitted.
    fn validation_error(&self, response: &Response) -> String {
        if self.is_complete_response(response) {
            String::new()
        } else {
            "Please answer the question.".to_string()
        }
    }

    /// One-line text form of a response, for history tables.
    fn summarise_response(&self, response: &Response) -> Option<String>;

    /// A response that would be graded right.
    fn correct_response(&self) -> Response;

    /// The response with wrong parts blanked, for "try again" with a
    /// clear-wrong hint.
    fn clear_wrong_from_response(&self, response: &Response) -> Response {
        response.clone()
    }

    /// `(right, total)` parts, for questions with several parts.
    fn num_parts_right(&self, _response: &Response) -> Option<(usize, usize)> {
        None
    }

    /// Whether `grade_response` can score responses without a human.
    fn is_automatically_gradable(&self) -> bool {
        true
    }

    /// Which behaviour attempts at this question use, given the usage's
    /// preference.
    fn make_behaviour_kind(&self, preferred: BehaviourKind) -> BehaviourKind {
        preferred
    }
}

/// A hint shown after a wrong try in interactive mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hint {
    pub text: String,
    /// Blank the wrong parts of the response on "try again".
    #[serde(default)]
    pub clear_wrong: bool,
    /// Tell the student how many parts are right.
    #[serde(default)]
    pub show_num_correct: bool,
}

/// A question as written in a bank file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QuestionConfig {
    TrueFalse(TrueFalseQuestion),
    MultiChoice(MultiChoiceQuestion),
    Matching(MatchingQuestion),
    Essay(EssayQuestion),
}

impl QuestionConfig {
    pub fn definition(&self) -> &dyn QuestionDefinition {
        match self {
            QuestionConfig::TrueFalse(q) => q,
            QuestionConfig::MultiChoice(q) => q,
            QuestionConfig::Matching(q) => q,
            QuestionConfig::Essay(q) => q,
        }
    }

    pub fn id(&self) -> &str {
        self.definition().id()
    }

    /// Turn the config into a shareable definition.
    pub fn build(self) -> Arc<dyn QuestionDefinition> {
        match self {
            QuestionConfig::TrueFalse(q) => Arc::new(q),
            QuestionConfig::MultiChoice(q) => Arc::new(q),
            QuestionConfig::Matching(q) => Arc::new(q),
            QuestionConfig::Essay(q) => Arc::new(q),
        }
    }
}

/// A trimmed, non-empty response field.
pub(crate) fn field<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

pub(crate) fn default_mark() -> f64 {
    1.0
}

pub(crate) fn default_penalty() -> f64 {
    DEFAULT_PENALTY
}

pub(crate) fn default_true() -> bool {
    true
}

/// Comma-separated permutation of `0..len`, as stored in step 0.
pub(crate) fn encode_order(order: &[usize]) -> String {
    order
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Read back an order written by [`encode_order`], checking it is still a
/// permutation of `0..len` for the current definition.
pub(crate) fn decode_order(name: &str, value: &str, len: usize) -> Result<Vec<usize>, EngineError> {
    let corrupt = || EngineError::MissingVariable {
        name: format!("_{name}"),
    };
    let order = if value.is_empty() {
        Vec::new()
    } else {
        value
            .split(',')
            .map(|s| s.trim().parse::<usize>().map_err(|_| corrupt()))
            .collect::<Result<Vec<_>, _>>()?
    };
    let mut seen = vec![false; len];
    if order.len() != len {
        return Err(corrupt());
    }
    for &i in &order {
        if i >= len || seen[i] {
            return Err(corrupt());
        }
        seen[i] = true;
    }
    Ok(order)
}

/// Shuffle `0..len` when asked, otherwise keep the natural order.
pub(crate) fn new_order(len: usize, shuffle: bool) -> Vec<usize> {
    use rand::seq::SliceRandom;

    let mut order: Vec<usize> = (0..len).collect();
    if shuffle {
        order.shuffle(&mut rand::rng());
    }
    order
}

/// Reuse the order stored under `_name`, or create and store a new one.
pub(crate) fn init_order(
    step: &mut AttemptStep,
    name: &str,
    len: usize,
    shuffle: bool,
) -> Result<Vec<usize>, EngineError> {
    if let Some(stored) = step.qt_var(name) {
        return decode_order(name, stored, len);
    }
    let order = new_order(len, shuffle);
    step.set_qt_var(name, encode_order(&order));
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepData;

    #[test]
    fn order_roundtrip_and_validation() {
        assert_eq!(decode_order("order", "2,0,1", 3).unwrap(), vec![2, 0, 1]);
        assert!(decode_order("order", "0,0,1", 3).is_err());
        assert!(decode_order("order", "0,1", 3).is_err());
        assert!(decode_order("order", "0,1,x", 3).is_err());
        assert_eq!(decode_order("order", "", 0).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn init_order_reuses_stored_value() {
        let mut step = AttemptStep::new(StepData::new(), None);
        let first = init_order(&mut step, "order", 5, true).unwrap();
        let again = init_order(&mut step, "order", 5, true).unwrap();
        assert_eq!(first, again);

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn config_parses_tagged_questions() {
        let toml_str = r#"
type = "truefalse"
id = "tf-1"
name = "Sky"
correct_answer = true
"#;
        let config: QuestionConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.id(), "tf-1");
        assert_eq!(config.definition().qtype(), "truefalse");
        assert_eq!(config.definition().default_mark(), 1.0);
    }
}
