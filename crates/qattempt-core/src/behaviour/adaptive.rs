//! Adaptive mode: every changed response is graded as it is saved.
//!
//! Each graded try after the first is penalised by the question's
//! penalty, and the attempt keeps the best fraction seen so far.

use std::sync::Arc;

use super::{
    base_display_options, grade, is_comment, process_comment, record_raw_fraction,
    reveal_try_feedback, ActionOutcome, Behaviour, BehaviourKind, FINISH, RAW_FRACTION, TRY_COUNT,
};
use crate::display::DisplayOptions;
use crate::error::EngineError;
use crate::question::QuestionDefinition;
use crate::state::QuestionState;
use crate::step::{parse_var, AttemptStep, Response, StepLog};

#[derive(Debug)]
pub struct AdaptiveBehaviour {
    question: Arc<dyn QuestionDefinition>,
}

impl AdaptiveBehaviour {
    pub fn new(question: Arc<dyn QuestionDefinition>) -> Self {
        Self { question }
    }

    /// Graded tries so far.
    fn tries(&self, log: &StepLog) -> Result<u32, EngineError> {
        match log.last_behaviour_var(TRY_COUNT) {
            Some(value) => parse_var(&format!("-{TRY_COUNT}"), value),
            None => Ok(0),
        }
    }

    /// `raw - penalty * tries`.
    ///
    /// The first graded try is unpenalised, so the best fraction never falls
    /// below the question's minimum.
    pub fn adjusted_fraction(&self, raw: f64, tries: u32) -> f64 {
        raw - self.question.penalty() * f64::from(tries)
    }

    fn best(previous: Option<f64>, adjusted: f64) -> f64 {
        previous.map_or(adjusted, |p| p.max(adjusted))
    }

    /// Grade `response` as the next try and record it on `pending`.
    /// Returns the raw grade state.
    fn grade_try(
        &self,
        log: &StepLog,
        response: &Response,
        pending: &mut AttemptStep,
    ) -> Result<QuestionState, EngineError> {
        let tries = self.tries(log)?;
        let (raw, state) = grade(self.question.as_ref(), response)?;
        let adjusted = self.adjusted_fraction(raw, tries);
        pending.set_fraction(Some(Self::best(log.fraction(), adjusted)));
        pending.set_behaviour_var(TRY_COUNT, (tries + 1).to_string());
        record_raw_fraction(pending, raw);
        Ok(state)
    }

    fn process_save(
        &self,
        log: &StepLog,
        pending: &mut AttemptStep,
    ) -> Result<ActionOutcome, EngineError> {
        if self.is_finished(log) {
            return Err(EngineError::Finished { action: "save" });
        }
        if self.is_same_response(log, pending) {
            return Ok(ActionOutcome::Discard);
        }
        let response = pending.response();
        if self.question.is_gradable_response(&response) {
            self.grade_try(log, &response, pending)?;
        } else {
            pending.set_fraction(log.fraction());
        }
        pending.set_state(QuestionState::Todo);
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
        let response = log.last_response();
        let last_graded = log.last_step_with_behaviour_var(RAW_FRACTION);

        if let Some(graded) = last_graded {
            if self.question.is_same_response(&graded.response(), &response) {
                let raw: f64 = parse_var(
                    &format!("-{RAW_FRACTION}"),
                    graded.behaviour_var(RAW_FRACTION).unwrap_or_default(),
                )?;
                pending.set_fraction(log.fraction());
                pending.set_state(QuestionState::graded_for_fraction(raw));
                return Ok(ActionOutcome::Keep);
            }
        }

        if self.question.is_gradable_response(&response) {
            let state = self.grade_try(log, &response, pending)?;
            pending.set_state(state);
        } else {
            match log.fraction() {
                Some(best) => {
                    pending.set_fraction(Some(best));
                    pending.set_state(QuestionState::graded_for_fraction(best));
                }
                None => {
                    pending.set_fraction(None);
                    pending.set_state(QuestionState::GaveUp);
                }
            }
        }
        Ok(ActionOutcome::Keep)
    }
}

impl Behaviour for AdaptiveBehaviour {
    fn kind(&self) -> BehaviourKind {
        BehaviourKind::Adaptive
    }

    fn question(&self) -> &Arc<dyn QuestionDefinition> {
        &self.question
    }

    fn process_action(
        &self,
        log: &StepLog,
        pending: &mut AttemptStep,
    ) -> Result<ActionOutcome, EngineError> {
        if is_comment(pending) {
            process_comment(self, log, pending)
        } else if pending.has_behaviour_var(FINISH) {
            self.process_finish(log, pending)
        } else {
            self.process_save(log, pending)
        }
    }

    fn adjust_display_options(&self, log: &StepLog, options: DisplayOptions) -> DisplayOptions {
        let finished = self.is_finished(log);
        let base = options.clone();
        let adjusted = base_display_options(finished, options);
        let graded = log.last().is_some_and(|s| s.has_behaviour_var(RAW_FRACTION));
        if !finished && graded {
            reveal_try_feedback(adjusted, &base)
        } else {
            adjusted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::question::{Choice, MultiChoiceQuestion, TrueFalseQuestion};

    fn behaviour() -> AdaptiveBehaviour {
        let mut question = TrueFalseQuestion::new("tf", true);
        question.penalty = 0.25;
        AdaptiveBehaviour::new(Arc::new(question))
    }

    #[test]
    fn every_save_is_graded() {
        let b = behaviour();
        let mut log = start(&b);

        act(&b, &mut log, &[("answer", "0")]).unwrap();
        assert_eq!(log.state(), QuestionState::Todo);
        assert_eq!(log.fraction(), Some(0.0));

        act(&b, &mut log, &[("answer", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::Todo);
        assert_eq!(log.fraction(), Some(0.75));
        assert_eq!(log.last().and_then(|s| s.behaviour_var(TRY_COUNT)), Some("2"));

        assert_eq!(
            act(&b, &mut log, &[("answer", "1")]).unwrap(),
            ActionOutcome::Discard
        );
    }

    #[test]
    fn best_fraction_is_kept() {
        let b = behaviour();
        let mut log = start(&b);
        act(&b, &mut log, &[("answer", "1")]).unwrap();
        assert_eq!(log.fraction(), Some(1.0));
        act(&b, &mut log, &[("answer", "0")]).unwrap();
        assert_eq!(log.fraction(), Some(1.0));

        act(&b, &mut log, &[("-finish", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::GradedWrong);
        assert_eq!(log.fraction(), Some(1.0));
    }

    #[test]
    fn finish_reuses_the_last_grade() {
        let b = behaviour();
        let mut log = start(&b);
        act(&b, &mut log, &[("answer", "0")]).unwrap();
        act(&b, &mut log, &[("answer", "1")]).unwrap();
        act(&b, &mut log, &[("-finish", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::GradedRight);
        assert_eq!(log.fraction(), Some(0.75));
        assert_eq!(log.last().and_then(|s| s.behaviour_var(TRY_COUNT)), None);
    }

    #[test]
    fn finish_without_answer_gives_up() {
        let b = behaviour();
        let mut log = start(&b);
        act(&b, &mut log, &[("-finish", "1")]).unwrap();
        assert_eq!(log.state(), QuestionState::GaveUp);
        assert!(matches!(
            act(&b, &mut log, &[("answer", "1")]),
            Err(EngineError::Finished { action: "save" })
        ));
    }

    #[test]
    fn penalty_is_linear_in_tries() {
        let b = behaviour();
        assert_eq!(b.adjusted_fraction(0.5, 3), -0.25);
        assert_eq!(b.adjusted_fraction(0.0, 3), -0.75);
        assert_eq!(b.adjusted_fraction(1.0, 0), 1.0);
    }

    #[test]
    fn negative_choices_keep_the_best_penalised_try() {
        let question = MultiChoiceQuestion {
            id: "mc".into(),
            name: "Planets".into(),
            text: String::new(),
            choices: vec![
                Choice {
                    text: "Mars".into(),
                    fraction: 1.0,
                    feedback: String::new(),
                },
                Choice {
                    text: "Moon".into(),
                    fraction: -0.5,
                    feedback: String::new(),
                },
                Choice {
                    text: "Ceres".into(),
                    fraction: 0.2,
                    feedback: String::new(),
                },
            ],
            shuffle: false,
            default_mark: 1.0,
            penalty: 1.0 / 3.0,
            hints: vec![],
        };
        let b = AdaptiveBehaviour::new(Arc::new(question));
        let mut log = start(&b);

        act(&b, &mut log, &[("answer", "1")]).unwrap();
        assert_eq!(log.fraction(), Some(-0.5));

        act(&b, &mut log, &[("answer", "2")]).unwrap();
        let expected = 0.2 - 1.0 / 3.0;
        assert!((log.fraction().unwrap() - expected).abs() < 1e-12);
        assert_eq!(log.state(), QuestionState::Todo);
    }
}
