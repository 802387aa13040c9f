//! Immediate feedback, with or without certainty-based marking.
//!
//! A submit grades the response straight away but leaves the attempt open.
//! Finishing reuses the last submitted grade when the response has not
//! changed since.

use std::sync::Arc;

use super::cbm::Certainty;
use super::deferred::{cbm_complete, cbm_same, grade_on_finish};
use super::{
    base_display_options, is_comment, process_comment, process_save, reveal_try_feedback,
    ActionOutcome, Behaviour, BehaviourKind, ASSUMED_CERTAINTY, CERTAINTY, FINISH, RAW_FRACTION,
    SUBMIT,
};
use crate::display::DisplayOptions;
use crate::error::EngineError;
use crate::question::QuestionDefinition;
use crate::state::QuestionState;
use crate::step::{AttemptStep, StepLog};

#[derive(Debug)]
pub struct ImmediateFeedback {
    question: Arc<dyn QuestionDefinition>,
    cbm: bool,
}

impl ImmediateFeedback {
    pub fn new(question: Arc<dyn QuestionDefinition>, cbm: bool) -> Self {
        Self { question, cbm }
    }

    /// The most recent submit that produced a grade.
    fn last_graded_submit<'a>(&self, log: &'a StepLog) -> Option<&'a AttemptStep> {
        log.iter()
            .rev()
            .find(|s| s.has_behaviour_var(SUBMIT) && s.state().is_graded())
    }

    fn process_submit(
        &self,
        log: &StepLog,
        pending: &mut AttemptStep,
    ) -> Result<ActionOutcome, EngineError> {
        if self.is_finished(log) {
            return Ok(ActionOutcome::Discard);
        }
        let last_was_graded_submit = log
            .last()
            .is_some_and(|s| s.has_behaviour_var(SUBMIT) && s.state().is_graded());
        if last_was_graded_submit && self.is_same_response(log, pending) {
            return Ok(ActionOutcome::Discard);
        }
        if !self.is_complete_response(pending) {
            pending.set_state(QuestionState::Invalid);
            pending.set_fraction(None);
            return Ok(ActionOutcome::Keep);
        }
        let response = pending.response();
        let certainty = Certainty::of_step(pending);
        grade_on_finish(self.question.as_ref(), self.cbm, certainty, &response, pending)?;
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
        let certainty = self
            .cbm
            .then(|| log.last_behaviour_var(CERTAINTY).and_then(Certainty::from_value))
            .flatten();

        let reusable = self.last_graded_submit(log).filter(|submitted| {
            self.question
                .is_same_response(&submitted.response(), &response)
                && (!self.cbm || Certainty::of_step(submitted) == certainty)
        });
        match reusable {
            Some(submitted) => {
                pending.set_state(submitted.state());
                pending.set_fraction(submitted.fraction());
                for name in [RAW_FRACTION, ASSUMED_CERTAINTY] {
                    if let Some(value) = submitted.behaviour_var(name) {
                        pending.set_behaviour_var(name, value);
                    }
                }
            }
            None => {
                grade_on_finish(self.question.as_ref(), self.cbm, certainty, &response, pending)?
            }
        }
        Ok(ActionOutcome::Keep)
    }
}

impl Behaviour for ImmediateFeedback {
    fn kind(&self) -> BehaviourKind {
        if self.cbm {
            BehaviourKind::ImmediateCbm
        } else {
            BehaviourKind::ImmediateFeedback
        }
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
        } else if pending.has_behaviour_var(SUBMIT) {
            self.process_submit(log, pending)
        } else {
            process_save(self, log, pending)
        }
    }

    /// Graded submits leave the attempt open; only a finish or a comment
    /// closes it.
    fn is_finished(&self, log: &StepLog) -> bool {
        let state = log.state();
        state.is_commented()
            || (state.is_finished() && log.last_step_with_behaviour_var(FINISH).is_some())
    }

    fn min_fraction(&self) -> f64 {
        if self.cbm {
            super::cbm::adjust_fraction(self.question.min_fraction(), Certainty::High)
        } else {
            self.question.min_fraction()
        }
    }

    fn max_fraction(&self) -> f64 {
        if self.cbm {
            super::cbm::adjust_fraction(self.question.max_fraction(), Certainty::High)
        } else {
            self.question.max_fraction()
        }
    }

    fn expected_behaviour_data(&self, log: &StepLog) -> Vec<&'static str> {
        if self.is_finished(log) {
            Vec::new()
        } else if self.cbm {
            vec![SUBMIT, CERTAINTY]
        } else {
            vec![SUBMIT]
        }
    }

    fn is_complete_response(&self, pending: &AttemptStep) -> bool {
        cbm_complete(self.question.as_ref(), self.cbm, pending)
    }

    fn is_same_response(&self, log: &StepLog, pending: &AttemptStep) -> bool {
        cbm_same(self.question.as_ref(), self.cbm, log, pending)
    }

    fn adjust_display_options(&self, log: &StepLog, options: DisplayOptions) -> DisplayOptions {
        let finished = self.is_finished(log);
        let base = options.clone();
        let adjusted = base_display_options(finished, options);
        if !finished && log.state().is_graded() {
            reveal_try_feedback(adjusted, &base)
        } else {
            adjusted
        }
    }
}
