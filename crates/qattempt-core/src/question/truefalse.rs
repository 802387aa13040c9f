//! True/false questions.

use serde::{Deserialize, Serialize};

use super::{default_mark, default_penalty, field, Hint, QuestionDefinition};
use crate::error::EngineError;
use crate::state::QuestionState;
use crate::step::Response;

/// A true/false question. The response field `answer` is `"1"` for true
/// and `"0"` for false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrueFalseQuestion {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub text: String,
    pub correct_answer: bool,
    #[serde(default = "default_mark")]
    pub default_mark: f64,
    #[serde(default = "default_penalty")]
    pub penalty: f64,
    #[serde(default)]
    pub true_feedback: String,
    #[serde(default)]
    pub false_feedback: String,
    #[serde(default)]
    pub hints: Vec<Hint>,
}

impl TrueFalseQuestion {
    pub fn new(id: &str, correct_answer: bool) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            text: String::new(),
            correct_answer,
            default_mark: default_mark(),
            penalty: default_penalty(),
            true_feedback: String::new(),
            false_feedback: String::new(),
            hints: Vec::new(),
        }
    }

    fn answer(response: &Response) -> Option<bool> {
        match field(response, "answer") {
            Some("1") => Some(true),
            Some("0") => Some(false),
            _ => None,
        }
    }

    /// Feedback for the chosen answer.
    pub fn feedback(&self, response: &Response) -> Option<&str> {
        match Self::answer(response)? {
            true => Some(self.true_feedback.as_str()),
            false => Some(self.false_feedback.as_str()),
        }
    }
}

impl QuestionDefinition for TrueFalseQuestion {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn qtype(&self) -> &'static str {
        "truefalse"
    }

    fn default_mark(&self) -> f64 {
        self.default_mark
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

    fn is_complete_response(&self, response: &Response) -> bool {
        Self::answer(response).is_some()
    }

    fn grade_response(&self, response: &Response) -> Result<(f64, QuestionState), EngineError> {
        let answer = Self::answer(response).ok_or_else(|| EngineError::GradingFault {
            question: self.id.clone(),
            reason: "no answer selected".into(),
        })?;
        let fraction = if answer == self.correct_answer { 1.0 } else { 0.0 };
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
        Self::answer(response).map(|a| if a { "True" } else { "False" }.to_string())
    }

    fn correct_response(&self) -> Response {
        let value = if self.correct_answer { "1" } else { "0" };
        Response::from([("answer".to_string(), value.to_string())])
    }

    fn clear_wrong_from_response(&self, response: &Response) -> Response {
        let mut cleared = response.clone();
        if Self::answer(response).is_some_and(|a| a != self.correct_answer) {
            cleared.insert("answer".into(), String::new());
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(value: &str) -> Response {
        Response::from([("answer".to_string(), value.to_string())])
    }

    #[test]
    fn grades_true_and_false() {
        let q = TrueFalseQuestion::new("tf", true);
        assert_eq!(
            q.grade_response(&answer("1")).unwrap(),
            (1.0, QuestionState::GradedRight)
        );
        assert_eq!(
            q.grade_response(&answer("0")).unwrap(),
            (0.0, QuestionState::GradedWrong)
        );
        assert!(q.grade_response(&answer("")).is_err());
    }

    #[test]
    fn completeness_and_sameness() {
        let q = TrueFalseQuestion::new("tf", false);
        assert!(q.is_complete_response(&answer("0")));
        assert!(!q.is_complete_response(&answer("maybe")));
        assert!(!q.is_complete_response(&Response::new()));
        assert!(q.is_same_response(&answer("1"), &answer(" 1 ")));
        assert!(q.is_same_response(&Response::new(), &answer("")));
        assert!(!q.is_same_response(&answer("1"), &answer("0")));
        assert_eq!(q.validation_error(&Response::new()), "Please select an answer.");
    }

    #[test]
    fn clears_only_wrong_answer() {
        let q = TrueFalseQuestion::new("tf", true);
        assert_eq!(q.clear_wrong_from_response(&answer("0")), answer(""));
        assert_eq!(q.clear_wrong_from_response(&answer("1")), answer("1"));
        assert_eq!(q.correct_response(), answer("1"));
        assert_eq!(q.summarise_response(&answer("0")).as_deref(), Some("False"));
    }
}
