//! Interactive with multiple tries.
//!
//! Each wrong submit costs a try and shows the next hint. The attempt ends
//! on a right answer, when tries run out, or on finish. The final fraction
//! is penalised by `tries used / total tries`.

use std::sync::Arc;

use super::deferred::grade_on_finish;
use super::{
    base_display_options, grade, is_comment, process_comment, process_save, record_raw_fraction,
    reveal_try_feedback, ActionOutcome, Behaviour, BehaviourKind, FINISH, SUBMIT, TRIES_LEFT,
    TRY_AGAIN,
};
use crate::display::DisplayOptions;
use crate::error::EngineError;
use crate::question::{Hint, QuestionDefinition};
use crate::state::QuestionState;
use crate::step::{parse_var, AttemptStep, StepLog};

#[derive(Debug)]
pub struct InteractiveBehaviour {
    question: Arc<dyn QuestionDefinition>,
}

impl InteractiveBehaviour {
    pub fn new(question: Arc<dyn QuestionDefinition>) -> Self {
        Self { question }
    }

    pub fn total_tries(&self) -> usize {
        self.question.hints().len() + 1
    }

    /// Tries remaining, as recorded in the log.
    pub fn tries_left(&self, log: &StepLog) -> Result<usize, EngineError> {
        let value = log
            .last_behaviour_var(TRIES_LEFT)
            .ok_or_else(|| EngineError::MissingVariable {
                name: format!("-{TRIES_LEFT}"),
            })?;
        parse_var(&format!("-{TRIES_LEFT}"), value)
    }

    /// A wrong submit with tries left, waiting for "try again".
    pub fn is_try_again_state(&self, log: &StepLog) -> bool {
        log.state().is_active()
            && log
                .last()
                .is_some_and(|s| s.has_behaviour_var(SUBMIT) && s.has_behaviour_var(TRIES_LEFT))
    }

    /// `max(0, raw - used / total)` where `used = total - tries_left`.
    pub fn penalised_fraction(&self, raw: f64, tries_left: usize) -> f64 {
        let total = self.total_tries();
        let used = total.saturating_sub(tries_left);
        (raw - used as f64 / total as f64).max(0.0)
    }

    /// Record a final grade, penalised for the tries used.
    fn record_penalised(
        &self,
        (raw, state): (f64, QuestionState),
        tries_left: usize,
        pending: &mut AttemptStep,
    ) {
        pending.set_state(state);
        pending.set_fraction(Some(self.penalised_fraction(raw, tries_left)));
        record_raw_fraction(pending, raw);
    }

    fn process_submit(
        &self,
        log: &StepLog,
        pending: &mut AttemptStep,
    ) -> Result<ActionOutcome, EngineError> {
        // Replay can end the attempt earlier than the original run did.
        if self.is_finished(log) {
            return Ok(ActionOutcome::Discard);
        }
        if !self.is_complete_response(pending) {
            pending.set_state(QuestionState::Invalid);
            pending.set_fraction(None);
            return Ok(ActionOutcome::Keep);
        }

        let tries_left = self.tries_left(log)?;
        let response = pending.response();
        let (raw, state) = grade(self.question.as_ref(), &response)?;
        if state == QuestionState::GradedRight || tries_left <= 1 {
            self.record_penalised((raw, state), tries_left, pending);
        } else {
            tracing::debug!(
                question = self.question.id(),
                raw,
                tries_left = tries_left - 1,
                "wrong submit, try again"
            );
            pending.set_behaviour_var(TRIES_LEFT, (tries_left - 1).to_string());
            pending.set_state(QuestionState::Todo);
            pending.set_fraction(None);
        }
        Ok(ActionOutcome::Keep)
    }

    fn process_try_again(
        &self,
        log: &StepLog,
        pending: &mut AttemptStep,
    ) -> Result<ActionOutcome, EngineError> {
        let previous = log.last_response();
        let response = match self.current_hint(log)? {
            Some(hint) if hint.clear_wrong => self.question.clear_wrong_from_response(&previous),
            _ => previous,
        };
        pending.set_response(response);
        pending.set_state(QuestionState::Todo);
        pending.set_fraction(None);
        Ok(ActionOutcome::Keep)
    }

    fn process_finish(
        &self,
        log: &StepLog,
        pending: &mut AttemptStep,
    ) -> Result<ActionOutcome, EngineError> {
        if self.is_finished(log) {
            return Ok(ActionOutcome::Discard);
        }
        let response = log
            .iter()
            .rev()
            .filter(|s| !s.has_behaviour_var(TRY_AGAIN))
            .find(|s| s.has_response())
            .map(AttemptStep::response)
            .unwrap_or_default();
        if !self.question.is_gradable_response(&response) {
            grade_on_finish(self.question.as_ref(), false, None, &response, pending)?;
            return Ok(ActionOutcome::Keep);
        }
        let tries_left = self.tries_left(log)?;
        let graded = grade(self.question.as_ref(), &response)?;
        self.record_penalised(graded, tries_left, pending);
        Ok(ActionOutcome::Keep)
    }
}

impl Behaviour for InteractiveBehaviour {
    fn kind(&self) -> BehaviourKind {
        BehaviourKind::Interactive
    }

    fn question(&self) -> &Arc<dyn QuestionDefinition> {
        &self.question
    }

    fn init_first_step(&self, step: &mut AttemptStep) -> Result<(), EngineError> {
        self.question.init_first_step(step)?;
        step.set_behaviour_var(TRIES_LEFT, self.total_tries().to_string());
        Ok(())
    }

    fn process_action(
        &self,
        log: &StepLog,
        pending: &mut AttemptStep,
    ) -> Result<ActionOutcome, EngineError> {
        if is_comment(pending) {
            return process_comment(self, log, pending);
        }
        if pending.has_behaviour_var(FINISH) {
            return self.process_finish(log, pending);
        }
        if self.is_try_again_state(log) {
            return if pending.has_behaviour_var(TRY_AGAIN) {
                self.process_try_again(log, pending)
            } else {
                Ok(ActionOutcome::Discard)
            };
        }
        if pending.has_behaviour_var(SUBMIT) {
            self.process_submit(log, pending)
        } else if pending.has_behaviour_var(TRY_AGAIN) {
            Ok(ActionOutcome::Discard)
        } else {
            process_save(self, log, pending)
        }
    }

    fn expected_behaviour_data(&self, log: &StepLog) -> Vec<&'static str> {
        if self.is_finished(log) {
            Vec::new()
        } else if self.is_try_again_state(log) {
            vec![TRY_AGAIN]
        } else {
            vec![SUBMIT]
        }
    }

    fn current_hint(&self, log: &StepLog) -> Result<Option<&Hint>, EngineError> {
        if !self.is_try_again_state(log) {
            return Ok(None);
        }
        let tries_left = self.tries_left(log)?;
        // The stored counter may predate hints being removed from the question.
        let index = self.total_tries().saturating_sub(tries_left);
        Ok(index
            .checked_sub(1)
            .and_then(|i| self.question.hints().get(i)))
    }

    fn adjust_display_options(&self, log: &StepLog, options: DisplayOptions) -> DisplayOptions {
        let base = options.clone();
        let mut adjusted = base_display_options(self.is_finished(log), options);
        if self.is_try_again_state(log) {
            adjusted = reveal_try_feedback(adjusted, &base);
            adjusted.readonly = true;
        }
        adjusted
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::super::test_support::*;
    use super::*;
    use crate::question::{Choice, MatchingQuestion, MultiChoiceQuestion, Stem, TrueFalseQuestion};
    use crate::step::Response;

    fn hint(text: &str, clear_wrong: bool) -> Hint {
        Hint {
            text: text.into(),
            clear_wrong,
            show_num_correct: false,
        }
    }

    fn multichoice(hints: Vec<Hint>) -> Arc<dyn QuestionDefinition> {
        Arc::new(MultiChoiceQuestion {
            id: "mc".into(),
            name: "Capital".into(),
            text: "Capital of France?".into(),
            choices: vec![
                Choice {
                    text: "Paris".into(),
                    fraction: 1.0,
                    feedback: String::new(),
                },
                Choice {
                    text: "Lyon".into(),
                    fraction: 0.0,
                    feedback: String::new(),
                },
            ],
            shuffle: false,
            default_mark: 1.0,
            penalty: 1.0 / 3.0,
            hints,
        })
    }

    #[test]
    fn right_after_one_retry_is_penalised() {
        let b = InteractiveBehaviour::new(multichoice(vec![hint("Think north", false)]));
        let mut log = start(&b);
        assert_eq!(log.first().and_then(|s| s.behaviour_var(TRIES_LEFT)), Some("2"));

        act(&b, &mut log, &[("answer", "1"), ("-submit", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::Todo);
        assert_eq!(b.tries_left(&log).unwrap(), 1);
        assert!(b.is_try_again_state(&log));
        assert_eq!(b.current_hint(&log).unwrap().map(|h| h.text.as_str()), Some("Think north"));
        assert_eq!(b.expected_behaviour_data(&log), vec![TRY_AGAIN]);

        act(&b, &mut log, &[("-tryagain", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::Todo);
        assert_eq!(b.tries_left(&log).unwrap(), 1);
        assert_eq!(b.current_hint(&log).unwrap(), None);

        act(&b, &mut log, &[("answer", "0"), ("-submit", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::GradedRight);
        assert_eq!(log.fraction(), Some(0.5));
        assert!(b.is_finished(&log));
    }

    #[test]
    fn right_first_time_is_unpenalised() {
        let b = InteractiveBehaviour::new(multichoice(vec![hint("a", false), hint("b", false)]));
        let mut log = start(&b);
        act(&b, &mut log, &[("answer", "0"), ("-submit", "1")]).unwrap();
        assert_eq!(log.fraction(), Some(1.0));
        assert_eq!(log.state(), QuestionState::GradedRight);
    }

    #[test]
    fn penalty_on_last_try() {
        let b = InteractiveBehaviour::new(multichoice(vec![hint("a", false), hint("b", false)]));
        assert_eq!(b.penalised_fraction(1.0, 3), 1.0);
        assert!((b.penalised_fraction(1.0, 1) - (1.0 - 2.0 / 3.0)).abs() < 1e-12);
        assert_eq!(b.penalised_fraction(0.5, 1), 0.0);
    }

    #[test]
    fn out_of_tries_ends_wrong() {
        let b = InteractiveBehaviour::new(multichoice(vec![]));
        let mut log = start(&b);
        act(&b, &mut log, &[("answer", "1"), ("-submit", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::GradedWrong);
        assert_eq!(log.fraction(), Some(0.0));
        assert_eq!(
            act(&b, &mut log, &[("answer", "0"), ("-submit", "1")]).unwrap(),
            ActionOutcome::Discard
        );
        assert!(matches!(
            act(&b, &mut log, &[("answer", "0")]),
            Err(EngineError::Finished { action: "save" })
        ));
    }

    #[test]
    fn only_try_again_is_accepted_while_waiting() {
        let b = InteractiveBehaviour::new(multichoice(vec![hint("a", false)]));
        let mut log = start(&b);
        act(&b, &mut log, &[("answer", "1"), ("-submit", "1")]).unwrap();
        assert_eq!(
            act(&b, &mut log, &[("answer", "0")]).unwrap(),
            ActionOutcome::Discard
        );
        assert_eq!(
            act(&b, &mut log, &[("answer", "0"), ("-submit", "1")]).unwrap(),
            ActionOutcome::Discard
        );
        act(&b, &mut log, &[("-tryagain", "1")]).unwrap();
        assert_eq!(
            act(&b, &mut log, &[("-tryagain", "1")]).unwrap(),
            ActionOutcome::Discard
        );
    }

    #[test]
    fn hint_lookup_survives_fewer_hints() {
        let before = InteractiveBehaviour::new(multichoice(vec![hint("a", false), hint("b", false)]));
        let mut log = start(&before);
        act(&before, &mut log, &[("answer", "1"), ("-submit", "1")]).unwrap();
        assert_eq!(before.tries_left(&log).unwrap(), 2);

        let after = InteractiveBehaviour::new(multichoice(vec![]));
        assert!(after.is_try_again_state(&log));
        assert_eq!(after.current_hint(&log).unwrap(), None);
    }

    #[test]
    fn finish_mid_retry_grades_last_submission() {
        let b = InteractiveBehaviour::new(multichoice(vec![hint("a", false)]));
        let mut log = start(&b);
        act(&b, &mut log, &[("answer", "1"), ("-submit", "1")]).unwrap();
        act(&b, &mut log, &[("-finish", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::GradedWrong);
        assert_eq!(log.fraction(), Some(0.0));
    }

    #[test]
    fn finish_without_answer_gives_up() {
        let b = InteractiveBehaviour::new(multichoice(vec![]));
        let mut log = start(&b);
        act(&b, &mut log, &[("-finish", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::GaveUp);
        assert_eq!(log.fraction(), None);
    }

    #[test]
    fn incomplete_submit_keeps_tries() {
        let b = InteractiveBehaviour::new(multichoice(vec![hint("a", false)]));
        let mut log = start(&b);
        act(&b, &mut log, &[("-submit", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::Invalid);
        assert_eq!(b.tries_left(&log).unwrap(), 2);
    }

    #[test]
    fn try_again_clears_wrong_parts_when_hint_says_so() {
        let question: Arc<dyn QuestionDefinition> = Arc::new(MatchingQuestion {
            id: "m".into(),
            name: "Pairs".into(),
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
            ],
            distractors: vec![],
            shuffle: false,
            default_mark: 1.0,
            penalty: 0.0,
            hints: vec![hint("Check the frog", true)],
        });
        let b = InteractiveBehaviour::new(question);
        let mut log = start(&b);
        act(&b, &mut log, &[("sub0", "1"), ("sub1", "1"), ("-submit", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::Todo);

        act(&b, &mut log, &[("-tryagain", "1")]).unwrap();
        let response = log.last().map(AttemptStep::response).unwrap_or_default();
        assert_eq!(response.get("sub0").map(String::as_str), Some("1"));
        assert_eq!(response.get("sub1").map(String::as_str), Some("0"));
    }

    /// True/false question that counts calls to its grading function.
    #[derive(Debug)]
    struct CountingGrades {
        inner: TrueFalseQuestion,
        calls: AtomicUsize,
    }

    impl QuestionDefinition for CountingGrades {
        fn id(&self) -> &str {
            self.inner.id()
        }

        fn name(&self) -> &str {
            self.inner.name()
        }

        fn qtype(&self) -> &'static str {
            self.inner.qtype()
        }

        fn default_mark(&self) -> f64 {
            self.inner.default_mark()
        }

        fn expected_data(&self) -> Vec<String> {
            self.inner.expected_data()
        }

        fn is_complete_response(&self, response: &Response) -> bool {
            self.inner.is_complete_response(response)
        }

        fn grade_response(&self, response: &Response) -> Result<(f64, QuestionState), EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.grade_response(response)
        }

        fn summarise_response(&self, response: &Response) -> Option<String> {
            self.inner.summarise_response(response)
        }

        fn correct_response(&self) -> Response {
            self.inner.correct_response()
        }
    }

    #[test]
    fn deciding_submit_grades_once() {
        let question = Arc::new(CountingGrades {
            inner: TrueFalseQuestion::new("tf", true),
            calls: AtomicUsize::new(0),
        });
        let b = InteractiveBehaviour::new(question.clone());
        let mut log = start(&b);
        act(&b, &mut log, &[("answer", "1"), ("-submit", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::GradedRight);
        assert_eq!(question.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_tries_counter_is_corruption() {
        let b = InteractiveBehaviour::new(multichoice(vec![]));
        let mut log = StepLog::from_steps(vec![{
            let mut s = AttemptStep::new(data(&[]), None);
            s.set_state(QuestionState::Todo);
            s
        }]);
        let err = act(&b, &mut log, &[("answer", "0"), ("-submit", "1")]).unwrap_err();
        assert!(err.is_corruption());
    }
}
