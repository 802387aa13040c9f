//! Matching questions: pair each stem with one of a shared list of answers.

use serde::{Deserialize, Serialize};

use super::{default_mark, default_penalty, default_true, field, init_order, Hint, QuestionDefinition};
use crate::error::EngineError;
use crate::state::QuestionState;
use crate::step::{AttemptStep, Response};

/// One stem and the answer it should be matched with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stem {
    pub text: String,
    pub answer: String,
}

/// A matching question.
///
/// Response fields are `sub0`, `sub1`, ... one per stem, each holding the
/// 1-based number of the chosen answer in [`MatchingQuestion::choices`].
/// `0` or an empty value means the stem is unanswered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingQuestion {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub text: String,
    pub stems: Vec<Stem>,
    /// Extra wrong answers offered alongside the real ones.
    #[serde(default)]
    pub distractors: Vec<String>,
    #[serde(default = "default_true")]
    pub shuffle: bool,
    #[serde(default = "default_mark")]
    pub default_mark: f64,
    #[serde(default = "default_penalty")]
    pub penalty: f64,
    #[serde(default)]
    pub hints: Vec<Hint>,
}

impl MatchingQuestion {
    /// Distinct answers in definition order, followed by distractors.
    pub fn choices(&self) -> Vec<&str> {
        let mut choices: Vec<&str> = Vec::new();
        for text in self
            .stems
            .iter()
            .map(|s| s.answer.as_str())
            .chain(self.distractors.iter().map(String::as_str))
        {
            if !choices.contains(&text) {
                choices.push(text);
            }
        }
        choices
    }

    fn sub(i: usize) -> String {
        format!("sub{i}")
    }

    /// The 1-based choice picked for stem `i`, if any.
    fn picked(&self, response: &Response, i: usize, choice_count: usize) -> Option<usize> {
        field(response, &Self::sub(i))?
            .parse::<usize>()
            .ok()
            .filter(|&c| c >= 1 && c <= choice_count)
    }

    fn right_choice(&self, choices: &[&str], i: usize) -> Option<usize> {
        choices
            .iter()
            .position(|c| *c == self.stems[i].answer)
            .map(|p| p + 1)
    }

    fn answered(&self, response: &Response) -> usize {
        let count = self.choices().len();
        (0..self.stems.len())
            .filter(|&i| self.picked(response, i, count).is_some())
            .count()
    }

    fn right_count(&self, response: &Response) -> usize {
        let choices = self.choices();
        (0..self.stems.len())
            .filter(|&i| {
                let picked = self.picked(response, i, choices.len());
                picked.is_some() && picked == self.right_choice(&choices, i)
            })
            .count()
    }
}

impl QuestionDefinition for MatchingQuestion {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn qtype(&self) -> &'static str {
        "matching"
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
        (0..self.stems.len()).map(Self::sub).collect()
    }

    fn init_first_step(&self, step: &mut AttemptStep) -> Result<(), EngineError> {
        init_order(step, "stemorder", self.stems.len(), self.shuffle)?;
        init_order(step, "choiceorder", self.choices().len(), self.shuffle)?;
        Ok(())
    }

    fn is_complete_response(&self, response: &Response) -> bool {
        !self.stems.is_empty() && self.answered(response) == self.stems.len()
    }

    fn is_gradable_response(&self, response: &Response) -> bool {
        self.answered(response) > 0
    }

    fn is_same_response(&self, a: &Response, b: &Response) -> bool {
        let count = self.choices().len();
        (0..self.stems.len()).all(|i| self.picked(a, i, count) == self.picked(b, i, count))
    }

    fn grade_response(&self, response: &Response) -> Result<(f64, QuestionState), EngineError> {
        if self.stems.is_empty() {
            return Err(EngineError::GradingFault {
                question: self.id.clone(),
                reason: "question has no stems".into(),
            });
        }
        let fraction = self.right_count(response) as f64 / self.stems.len() as f64;
        Ok((fraction, QuestionState::graded_for_fraction(fraction)))
    }

    fn validation_error(&self, response: &Response) -> String {
        if self.is_complete_response(response) {
            String::new()
        } else {
            "Please put an answer in each box.".to_string()
        }
    }

    fn summarise_response(&self, response: &Response) -> Option<String> {
        let choices = self.choices();
        let parts: Vec<String> = (0..self.stems.len())
            .filter_map(|i| {
                self.picked(response, i, choices.len())
                    .map(|c| format!("{} -> {}", self.stems[i].text, choices[c - 1]))
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }

    fn correct_response(&self) -> Response {
        let choices = self.choices();
        (0..self.stems.len())
            .filter_map(|i| {
                self.right_choice(&choices, i)
                    .map(|c| (Self::sub(i), c.to_string()))
            })
            .collect()
    }

    fn clear_wrong_from_response(&self, response: &Response) -> Response {
        let choices = self.choices();
        let mut cleared = response.clone();
        for i in 0..self.stems.len() {
            let picked = self.picked(response, i, choices.len());
            if picked.is_some() && picked != self.right_choice(&choices, i) {
                cleared.insert(Self::sub(i), "0".into());
            }
        }
        cleared
    }

    fn num_parts_right(&self, response: &Response) -> Option<(usize, usize)> {
        Some((self.right_count(response), self.stems.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> MatchingQuestion {
        MatchingQuestion {
            id: "match".into(),
            name: "Animals".into(),
            text: String::new(),
            stems: vec![
                Stem {
                    text: "Dog".into(),
                    answer: "Mammal".into(),
                },
                Stem {
                    text: "Frog".into(),
                    answer: "Amphibian".into(),
                },
                Stem {
                    text: "Cat".into(),
                    answer: "Mammal".into(),
                },
            ],
            distractors: vec!["Insect".into()],
            shuffle: false,
            default_mark: 1.0,
            penalty: 1.0 / 3.0,
            hints: vec![],
        }
    }

    fn response(pairs: &[(&str, &str)]) -> Response {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn choices_are_deduplicated() {
        assert_eq!(question().choices(), vec!["Mammal", "Amphibian", "Insect"]);
    }

    #[test]
    fn partial_answers_are_gradable_but_incomplete() {
        let q = question();
        let partial = response(&[("sub0", "1"), ("sub1", "0"), ("sub2", "")]);
        assert!(q.is_gradable_response(&partial));
        assert!(!q.is_complete_response(&partial));

        let (fraction, state) = q.grade_response(&partial).unwrap();
        assert!((fraction - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(state, QuestionState::GradedPartial);
    }

    #[test]
    fn full_right_answer() {
        let q = question();
        let right = q.correct_response();
        assert_eq!(right, response(&[("sub0", "1"), ("sub1", "2"), ("sub2", "1")]));
        assert_eq!(
            q.grade_response(&right).unwrap(),
            (1.0, QuestionState::GradedRight)
        );
        assert_eq!(q.num_parts_right(&right), Some((3, 3)));
    }

    #[test]
    fn clear_wrong_blanks_wrong_parts() {
        let q = question();
        let answer = response(&[("sub0", "1"), ("sub1", "3"), ("sub2", "2")]);
        assert_eq!(
            q.clear_wrong_from_response(&answer),
            response(&[("sub0", "1"), ("sub1", "0"), ("sub2", "0")])
        );
        assert!(q.is_same_response(
            &response(&[("sub0", "0")]),
            &response(&[("sub0", "")])
        ));
    }
}
