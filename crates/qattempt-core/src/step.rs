//! Attempt steps and the ordered step log.
//!
//! A step's data is one string-keyed map. Keys are namespaced by prefix:
//!
//! - `name`  : a response field owned by the question type
//! - `_name` : a question-type private variable (e.g. a shuffled order)
//! - `-name` : a behaviour variable submitted as input (`-finish`, `-certainty`)
//! - `-_name`: a behaviour-private variable derived by the behaviour (`-_triesleft`)
//!
//! Keys starting with `_` or `-_` are derived results and are never replayed.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::state::QuestionState;

/// Raw step data.
pub type StepData = BTreeMap<String, String>;

/// Response fields only (no prefixed keys).
pub type Response = BTreeMap<String, String>;

pub const BEHAVIOUR_PREFIX: &str = "-";
pub const PRIVATE_PREFIX: &str = "_";
pub const BEHAVIOUR_PRIVATE_PREFIX: &str = "-_";

/// Is this a plain response field name?
pub fn is_response_key(key: &str) -> bool {
    !key.starts_with(BEHAVIOUR_PREFIX) && !key.starts_with(PRIVATE_PREFIX)
}

/// Is this key something a student (or grader) submitted, as opposed to a
/// value derived by the engine?
pub fn is_submitted_key(key: &str) -> bool {
    !key.starts_with(PRIVATE_PREFIX) && !key.starts_with(BEHAVIOUR_PRIVATE_PREFIX)
}

/// Parse a stored variable, reporting a corrupt log if it does not parse.
pub fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, EngineError> {
    value.trim().parse().map_err(|_| EngineError::MissingVariable {
        name: name.to_string(),
    })
}

/// One transition of a question attempt.
///
/// A step is built as a pending step, filled in by the behaviour, and then
/// either committed to a [`StepLog`] or dropped. Committed steps are only
/// reachable through shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptStep {
    sequence: usize,
    state: QuestionState,
    #[serde(default)]
    fraction: Option<f64>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    data: StepData,
}

impl AttemptStep {
    /// A new pending step carrying `data`.
    pub fn new(data: StepData, user_id: Option<String>) -> Self {
        Self {
            sequence: 0,
            state: QuestionState::NotStarted,
            fraction: None,
            timestamp: Utc::now(),
            user_id,
            data,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn state(&self) -> QuestionState {
        self.state
    }

    pub fn fraction(&self) -> Option<f64> {
        self.fraction
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn data(&self) -> &StepData {
        &self.data
    }

    pub fn set_state(&mut self, state: QuestionState) {
        self.state = state;
    }

    pub fn set_fraction(&mut self, fraction: Option<f64>) {
        self.fraction = fraction;
    }

    /// Response fields of this step.
    pub fn response(&self) -> Response {
        self.data
            .iter()
            .filter(|(k, _)| is_response_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn has_response(&self) -> bool {
        self.data.keys().any(|k| is_response_key(k))
    }

    /// Replace all response fields, keeping prefixed variables.
    pub fn set_response(&mut self, response: Response) {
        self.data.retain(|k, _| !is_response_key(k));
        self.data.extend(response);
    }

    /// The data that would be fed back in when replaying this step.
    pub fn submitted_data(&self) -> StepData {
        self.data
            .iter()
            .filter(|(k, _)| is_submitted_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Question-type private variable `_name`.
    pub fn qt_var(&self, name: &str) -> Option<&str> {
        self.data
            .get(&format!("{PRIVATE_PREFIX}{name}"))
            .map(String::as_str)
    }

    pub fn set_qt_var(&mut self, name: &str, value: impl Into<String>) {
        self.data
            .insert(format!("{PRIVATE_PREFIX}{name}"), value.into());
    }

    /// Behaviour variable `-name`. Pass `_name` for a behaviour-private one.
    pub fn behaviour_var(&self, name: &str) -> Option<&str> {
        self.data
            .get(&format!("{BEHAVIOUR_PREFIX}{name}"))
            .map(String::as_str)
    }

    pub fn has_behaviour_var(&self, name: &str) -> bool {
        self.behaviour_var(name).is_some()
    }

    pub fn set_behaviour_var(&mut self, name: &str, value: impl Into<String>) {
        self.data
            .insert(format!("{BEHAVIOUR_PREFIX}{name}"), value.into());
    }

    pub fn remove_behaviour_var(&mut self, name: &str) {
        self.data.remove(&format!("{BEHAVIOUR_PREFIX}{name}"));
    }
}

/// The ordered, append-only history of one question attempt.
///
/// This is the action log that regrade folds through a fresh behaviour.
/// The current state and fraction are always read off the last step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepLog {
    steps: Vec<AttemptStep>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted steps. Sequence numbers are reassigned
    /// from the storage order.
    pub fn from_steps(steps: Vec<AttemptStep>) -> Self {
        let mut log = Self::new();
        for step in steps {
            log.push(step);
        }
        log
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[AttemptStep] {
        &self.steps
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &AttemptStep> {
        self.steps.iter()
    }

    pub fn first(&self) -> Option<&AttemptStep> {
        self.steps.first()
    }

    pub fn last(&self) -> Option<&AttemptStep> {
        self.steps.last()
    }

    pub fn get(&self, sequence: usize) -> Option<&AttemptStep> {
        self.steps.get(sequence)
    }

    pub fn state(&self) -> QuestionState {
        self.last()
            .map(AttemptStep::state)
            .unwrap_or(QuestionState::NotStarted)
    }

    pub fn fraction(&self) -> Option<f64> {
        self.last().and_then(AttemptStep::fraction)
    }

    /// Response of the latest step that carried one, or an empty response.
    pub fn last_response(&self) -> Response {
        self.steps
            .iter()
            .rev()
            .find(|s| s.has_response())
            .map(AttemptStep::response)
            .unwrap_or_default()
    }

    /// Latest value of behaviour variable `-name`.
    pub fn last_behaviour_var(&self, name: &str) -> Option<&str> {
        self.steps.iter().rev().find_map(|s| s.behaviour_var(name))
    }

    /// Latest value of question-type variable `_name`.
    pub fn last_qt_var(&self, name: &str) -> Option<&str> {
        self.steps.iter().rev().find_map(|s| s.qt_var(name))
    }

    /// Latest step carrying behaviour variable `-name`.
    pub fn last_step_with_behaviour_var(&self, name: &str) -> Option<&AttemptStep> {
        self.steps.iter().rev().find(|s| s.has_behaviour_var(name))
    }

    pub(crate) fn push(&mut self, mut step: AttemptStep) {
        step.sequence = self.steps.len();
        self.steps.push(step);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.steps.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> StepData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn namespaces_are_disjoint() {
        let step = AttemptStep::new(
            data(&[
                ("answer", "1"),
                ("_order", "2,0,1"),
                ("-certainty", "3"),
                ("-_triesleft", "2"),
            ]),
            None,
        );
        assert_eq!(step.response(), data(&[("answer", "1")]));
        assert_eq!(step.qt_var("order"), Some("2,0,1"));
        assert_eq!(step.behaviour_var("certainty"), Some("3"));
        assert_eq!(step.behaviour_var("_triesleft"), Some("2"));
        assert_eq!(
            step.submitted_data(),
            data(&[("answer", "1"), ("-certainty", "3")])
        );
    }

    #[test]
    fn set_response_keeps_variables() {
        let mut step = AttemptStep::new(data(&[("answer", "1"), ("-submit", "1")]), None);
        step.set_response(data(&[("answer", "")]));
        assert_eq!(step.data(), &data(&[("answer", ""), ("-submit", "1")]));
    }

    #[test]
    fn log_derives_state_from_last_step() {
        let mut log = StepLog::new();
        assert_eq!(log.state(), QuestionState::NotStarted);

        let mut first = AttemptStep::new(data(&[("-_triesleft", "3")]), None);
        first.set_state(QuestionState::Todo);
        log.push(first);

        let mut save = AttemptStep::new(data(&[("answer", "1")]), None);
        save.set_state(QuestionState::Complete);
        log.push(save);

        let mut finish = AttemptStep::new(data(&[("-finish", "1")]), None);
        finish.set_state(QuestionState::GradedRight);
        finish.set_fraction(Some(1.0));
        log.push(finish);

        assert_eq!(log.len(), 3);
        assert_eq!(log.state(), QuestionState::GradedRight);
        assert_eq!(log.fraction(), Some(1.0));
        assert_eq!(log.last_response(), data(&[("answer", "1")]));
        assert_eq!(log.last_behaviour_var("_triesleft"), Some("3"));
        assert_eq!(log.get(2).map(AttemptStep::sequence), Some(2));
    }

    #[test]
    fn parse_var_flags_corruption() {
        assert_eq!(parse_var::<u32>("_triesleft", "2").unwrap(), 2);
        let err = parse_var::<u32>("_triesleft", "two").unwrap_err();
        assert!(err.is_corruption());
    }
}
