//! Manually graded questions. Finishing hands the attempt to a grader.

use std::sync::Arc;

use super::{
    is_comment, process_comment, process_save, ActionOutcome, Behaviour, BehaviourKind, FINISH,
};
use crate::error::EngineError;
use crate::question::QuestionDefinition;
use crate::state::QuestionState;
use crate::step::{AttemptStep, StepLog};

#[derive(Debug)]
pub struct ManualGraded {
    question: Arc<dyn QuestionDefinition>,
}

impl ManualGraded {
    pub fn new(question: Arc<dyn QuestionDefinition>) -> Self {
        Self { question }
    }
}

impl Behaviour for ManualGraded {
    fn kind(&self) -> BehaviourKind {
        BehaviourKind::ManualGraded
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
            if self.is_finished(log) {
                return Ok(ActionOutcome::Discard);
            }
            pending.set_state(QuestionState::NeedsGrading);
            pending.set_fraction(None);
            Ok(ActionOutcome::Keep)
        } else {
            process_save(self, log, pending)
        }
    }
}
