//! Single-answer multiple choice questions.

use serde::{Deserialize, Serialize};

use super::{default_mark, default_penalty, default_true, field, init_order, Hint, QuestionDefinition};
use crate::error::EngineError;
use crate::state::QuestionState;
use crate::step::{AttemptStep, Response};

/// One option of a multiple choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    /// Fraction awarded for picking this choice. May be negative.
    #[serde(default)]
    pub fraction: f64,
    #[serde(default)]
    pub feedback: String,
}

/// A multiple choice question with exactly one answer.
///
/// The response field `answer` holds the index of the chosen option in
/// `choices`, so grading does not depend on the display order. The order
/// shown to the student is stored in step 0 as `_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiChoiceQuestion {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub text: String,
    pub choices: Vec<Choice>,
    #[serde(default = "default_true")]
    pub shuffle: bool,
    #[serde(default = "default_mark")]
    pub default_mark: f64,
    #[serde(default = "default_penalty")]
    pub penalty: f64,
    #[serde(default)]
    pub hints: Vec<Hint>,
}

impl MultiChoiceQuestion {
    fn chosen(&self, response: &Response) -> Option<usize> {
        field(response, "answer")?
            .parse::<usize>()
            .ok()
            .filter(|&i| i < self.choices.len())
    }

    /// Index of the best-scoring choice.
    pub fn right_choice(&self) -> Option<usize> {
        self.choices
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.fraction.total_cmp(&b.1.fraction))
            .map(|(i, _)| i)
    }
}

impl QuestionDefinition for MultiChoiceQuestion {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn qtype(&self) -> &'static str {
        "multichoice"
    }

    fn default_mark(&self) -> f64 {
        self.default_mark
    }

    fn min_fraction(&self) -> f64 {
        self.choices
            .iter()
            .map(|c| c.fraction)
            .fold(0.0, f64::min)
    }

    fn penalty(&self) -> f64 {
        self.penalty
    }

    fn hints(&self) -> &[Hint] {
        &self.hints
    }

    fn expected_data(&self) -> Vec<String> {
        vec!["answer".to_string()]
    }

    fn init_first_step(&self, step: &mut AttemptStep) -> Result<(), EngineError> {
        init_order(step, "order", self.choices.len(), self.shuffle)?;
        Ok(())
    }

    fn is_complete_response(&self, response: &Response) -> bool {
        self.chosen(response).is_some()
    }

    fn grade_response(&self, response: &Response) -> Result<(f64, QuestionState), EngineError> {
        let index = self.chosen(response).ok_or_else(|| EngineError::GradingFault {
            question: self.id.clone(),
            reason: "no valid choice selected".into(),
        })?;
        let fraction = self.choices[index].fraction;
        Ok((fraction, QuestionState::graded_for_fraction(fraction)))
    }

    fn validation_error(&self, response: &Response) -> String {
        if self.is_complete_response(response) {
            String::new()
        } else {
            "Please select an answer.".to_string()
        }
    }

    fn summarise_response(&self, response: &Response) -> Option<String> {
        self.chosen(response).map(|i| self.choices[i].text.clone())
    }

    fn correct_response(&self) -> Response {
        self.right_choice()
            .map(|i| Response::from([("answer".to_string(), i.to_string())]))
            .unwrap_or_default()
    }

    fn clear_wrong_from_response(&self, response: &Response) -> Response {
        let mut cleared = response.clone();
        if let Some(i) = self.chosen(response) {
            if self.choices[i].fraction < 1.0 {
                cleared.insert("answer".into(), String::new());
            }
        }
        cleared
    }
}
