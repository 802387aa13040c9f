//! Deferred feedback, with or without certainty-based marking.
//!
//! Students save answers as often as they like; nothing is graded until the
//! attempt is finished.

use std::sync::Arc;

use super::cbm::{self, Certainty};
use super::{
    grade, is_comment, process_comment, process_save, ActionOutcome, Behaviour, BehaviourKind,
    CERTAINTY, FINISH,
};
use crate::error::EngineError;
use crate::question::QuestionDefinition;
use crate::state::QuestionState;
use crate::step::{AttemptStep, Response, StepLog};

#[derive(Debug)]
pub struct DeferredFeedback {
    question: Arc<dyn QuestionDefinition>,
    cbm: bool,
}

impl DeferredFeedback {
    pub fn new(question: Arc<dyn QuestionDefinition>, cbm: bool) -> Self {
        Self { question, cbm }
    }

    fn process_finish(
        &self,
        log: &StepLog,
        pending: &mut AttemptStep,
    ) -> Result<ActionOutcome, EngineError> {
        if self.is_finished(log) {
            return Ok(ActionOutcome::Discard);
        }
        let certainty = self
            .cbm
            .then(|| log.last_behaviour_var(CERTAINTY).and_then(Certainty::from_value))
            .flatten();
        grade_on_finish(
            self.question.as_ref(),
            self.cbm,
            certainty,
            &log.last_response(),
            pending,
        )?;
        Ok(ActionOutcome::Keep)
    }
}

/// Grade `response` into a finishing step. Ungradable responses give up.
///
/// With `cbm` the fraction is rescaled by `certainty`, assuming LOW when
/// none was given.
pub(crate) fn grade_on_finish(
    question: &dyn QuestionDefinition,
    cbm: bool,
    certainty: Option<Certainty>,
    response: &Response,
    pending: &mut AttemptStep,
) -> Result<(), EngineError> {
    if !question.is_gradable_response(response) {
        pending.set_state(QuestionState::GaveUp);
        pending.set_fraction(None);
        return Ok(());
    }
    let (raw, state) = grade(question, response)?;
    if cbm {
        cbm::apply(pending, raw, certainty);
    } else {
        pending.set_fraction(Some(raw));
    }
    pending.set_state(state);
    Ok(())
}

/// Certainty-aware completeness shared by the CBM variants.
pub(crate) fn cbm_complete(question: &dyn QuestionDefinition, cbm: bool, pending: &AttemptStep) -> bool {
    question.is_complete_response(&pending.response())
        && (!cbm || Certainty::of_step(pending).is_some())
}

/// Certainty-aware sameness shared by the CBM variants.
pub(crate) fn cbm_same(
    question: &dyn QuestionDefinition,
    cbm: bool,
    log: &StepLog,
    pending: &AttemptStep,
) -> bool {
    question.is_same_response(&log.last_response(), &pending.response())
        && (!cbm
            || Certainty::of_step(pending)
                == log.last_behaviour_var(CERTAINTY).and_then(Certainty::from_value))
}

impl Behaviour for DeferredFeedback {
    fn kind(&self) -> BehaviourKind {
        if self.cbm {
            BehaviourKind::DeferredCbm
        } else {
            BehaviourKind::DeferredFeedback
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
        } else {
            process_save(self, log, pending)
        }
    }

    fn min_fraction(&self) -> f64 {
        if self.cbm {
            cbm::adjust_fraction(self.question.min_fraction(), Certainty::High)
        } else {
            self.question.min_fraction()
        }
    }

    fn max_fraction(&self) -> f64 {
        if self.cbm {
            cbm::adjust_fraction(self.question.max_fraction(), Certainty::High)
        } else {
            self.question.max_fraction()
        }
    }

    fn expected_behaviour_data(&self, log: &StepLog) -> Vec<&'static str> {
        if self.cbm && !self.is_finished(log) {
            vec![CERTAINTY]
        } else {
            Vec::new()
        }
    }

    fn is_complete_response(&self, pending: &AttemptStep) -> bool {
        cbm_complete(self.question.as_ref(), self.cbm, pending)
    }

    fn is_same_response(&self, log: &StepLog, pending: &AttemptStep) -> bool {
        cbm_same(self.question.as_ref(), self.cbm, log, pending)
    }
}
