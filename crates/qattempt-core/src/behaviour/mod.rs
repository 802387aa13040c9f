//! Behaviours: the per-attempt state machines.
//!
//! A behaviour sees the committed [`StepLog`] and one pending step, fills
//! in the pending step's state, fraction and private variables, and answers
//! [`ActionOutcome::Keep`] or [`ActionOutcome::Discard`]. It never touches
//! the log itself; committing is the attempt's job.
//!
//! Every behaviour dispatches in the same priority order: a comment beats a
//! finish, which beats behaviour-specific markers, which beat a plain save.

pub mod adaptive;
pub mod cbm;
pub mod deferred;
pub mod immediate;
pub mod interactive;
pub mod manual;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::display::{DisplayOptions, MarksVisibility};
use crate::error::EngineError;
use crate::question::{Hint, QuestionDefinition};
use crate::state::QuestionState;
use crate::step::{AttemptStep, Response, StepLog};

pub use adaptive::AdaptiveBehaviour;
pub use cbm::Certainty;
pub use deferred::DeferredFeedback;
pub use immediate::ImmediateFeedback;
pub use interactive::InteractiveBehaviour;
pub use manual::ManualGraded;

// Behaviour variable names, stored with the `-` prefix.
pub const COMMENT: &str = "comment";
pub const MARK: &str = "mark";
pub const MAX_MARK: &str = "maxmark";
pub const FINISH: &str = "finish";
pub const SUBMIT: &str = "submit";
pub const TRY_AGAIN: &str = "tryagain";
pub const CERTAINTY: &str = "certainty";

// Behaviour-private variables, stored with the `-_` prefix.
pub const TRIES_LEFT: &str = "_triesleft";
pub const RAW_FRACTION: &str = "_rawfraction";
pub const ASSUMED_CERTAINTY: &str = "_assumedcertainty";
pub const TRY_COUNT: &str = "_try";

/// Tolerance for range checks on fractions.
const FRACTION_EPSILON: f64 = 1e-7;

/// What the attempt should do with a pending step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Commit the pending step.
    Keep,
    /// Drop it; nothing changed.
    Discard,
}

/// The closed set of behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviourKind {
    DeferredFeedback,
    DeferredCbm,
    ImmediateFeedback,
    ImmediateCbm,
    Interactive,
    ManualGraded,
    Adaptive,
}

impl BehaviourKind {
    pub const ALL: [BehaviourKind; 7] = [
        BehaviourKind::DeferredFeedback,
        BehaviourKind::DeferredCbm,
        BehaviourKind::ImmediateFeedback,
        BehaviourKind::ImmediateCbm,
        BehaviourKind::Interactive,
        BehaviourKind::ManualGraded,
        BehaviourKind::Adaptive,
    ];

    /// Whether the behaviour calls `grade_response` itself.
    pub fn requires_automatic_grading(self) -> bool {
        self != BehaviourKind::ManualGraded
    }

    pub fn uses_cbm(self) -> bool {
        matches!(self, BehaviourKind::DeferredCbm | BehaviourKind::ImmediateCbm)
    }
}

impl fmt::Display for BehaviourKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BehaviourKind::DeferredFeedback => "deferredfeedback",
            BehaviourKind::DeferredCbm => "deferredcbm",
            BehaviourKind::ImmediateFeedback => "immediatefeedback",
            BehaviourKind::ImmediateCbm => "immediatecbm",
            BehaviourKind::Interactive => "interactive",
            BehaviourKind::ManualGraded => "manualgraded",
            BehaviourKind::Adaptive => "adaptive",
        };
        f.write_str(s)
    }
}

impl FromStr for BehaviourKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BehaviourKind::ALL
            .into_iter()
            .find(|k| k.to_string() == s.trim().to_lowercase())
            .ok_or_else(|| EngineError::UnknownBehaviour(s.to_string()))
    }
}

/// A behaviour bound to one question attempt.
pub trait Behaviour: Send + Sync + fmt::Debug {
    fn kind(&self) -> BehaviourKind;

    fn question(&self) -> &Arc<dyn QuestionDefinition>;

    /// Seed step 0. Question-type variables already present are reused.
    fn init_first_step(&self, step: &mut AttemptStep) -> Result<(), EngineError> {
        self.question().init_first_step(step)
    }

    /// Decide what `pending` means given the committed `log`.
    fn process_action(
        &self,
        log: &StepLog,
        pending: &mut AttemptStep,
    ) -> Result<ActionOutcome, EngineError>;

    /// Whether the attempt accepts no more student input.
    fn is_finished(&self, log: &StepLog) -> bool {
        log.state().is_finished()
    }

    fn min_fraction(&self) -> f64 {
        self.question().min_fraction()
    }

    fn max_fraction(&self) -> f64 {
        self.question().max_fraction()
    }

    /// Behaviour variables a student may submit in the current state
    /// (without the `-` prefix).
    fn expected_behaviour_data(&self, _log: &StepLog) -> Vec<&'static str> {
        Vec::new()
    }

    /// Full answer, as far as this behaviour is concerned.
    fn is_complete_response(&self, pending: &AttemptStep) -> bool {
        self.question().is_complete_response(&pending.response())
    }

    /// Would `pending` change nothing compared with the committed log?
    fn is_same_response(&self, log: &StepLog, pending: &AttemptStep) -> bool {
        self.question()
            .is_same_response(&log.last_response(), &pending.response())
    }

    /// Hint to show in the current state.
    fn current_hint(&self, _log: &StepLog) -> Result<Option<&Hint>, EngineError> {
        Ok(None)
    }

    /// Restrict what a renderer may reveal in the current state.
    fn adjust_display_options(&self, log: &StepLog, options: DisplayOptions) -> DisplayOptions {
        base_display_options(self.is_finished(log), options)
    }
}

/// Build the behaviour for `kind`, checking the question can support it.
pub fn create_behaviour(
    kind: BehaviourKind,
    question: Arc<dyn QuestionDefinition>,
) -> Result<Box<dyn Behaviour>, EngineError> {
    if kind.requires_automatic_grading() && !question.is_automatically_gradable() {
        return Err(EngineError::Unsupported {
            behaviour: kind.to_string(),
            question: question.id().to_string(),
            reason: "question cannot be graded automatically".into(),
        });
    }

    let behaviour: Box<dyn Behaviour> = match kind {
        BehaviourKind::DeferredFeedback => Box::new(DeferredFeedback::new(question, false)),
        BehaviourKind::DeferredCbm => Box::new(DeferredFeedback::new(question, true)),
        BehaviourKind::ImmediateFeedback => Box::new(ImmediateFeedback::new(question, false)),
        BehaviourKind::ImmediateCbm => Box::new(ImmediateFeedback::new(question, true)),
        BehaviourKind::Interactive => Box::new(InteractiveBehaviour::new(question)),
        BehaviourKind::ManualGraded => Box::new(ManualGraded::new(question)),
        BehaviourKind::Adaptive => Box::new(AdaptiveBehaviour::new(question)),
    };
    Ok(behaviour)
}

/// Hide everything that would reveal the grade of an unfinished attempt,
/// and lock finished ones.
pub fn base_display_options(finished: bool, mut options: DisplayOptions) -> DisplayOptions {
    if finished {
        options.readonly = true;
    } else {
        options.hide_all_feedback();
    }
    options
}

/// Show per-try feedback on an attempt that is still open.
pub(crate) fn reveal_try_feedback(mut options: DisplayOptions, base: &DisplayOptions) -> DisplayOptions {
    options.feedback = base.feedback;
    options.correctness = base.correctness;
    options.num_parts_correct = base.num_parts_correct;
    options.marks = base.marks.min(MarksVisibility::MaxOnly);
    options
}

/// Does the pending step carry a comment action?
pub(crate) fn is_comment(pending: &AttemptStep) -> bool {
    pending.has_behaviour_var(COMMENT) || pending.has_behaviour_var(MARK)
}

/// Manual comment, optionally with a mark.
///
/// With a mark the fraction becomes exactly `mark / maxmark` and the state
/// the matching manually graded bucket. Without one the fraction is kept.
pub(crate) fn process_comment<B: Behaviour + ?Sized>(
    behaviour: &B,
    log: &StepLog,
    pending: &mut AttemptStep,
) -> Result<ActionOutcome, EngineError> {
    let mark = pending
        .behaviour_var(MARK)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    match mark {
        Some(mark) => {
            let value: f64 = mark
                .parse()
                .map_err(|_| EngineError::InvalidMark(mark.clone()))?;
            let max_mark_raw = pending.behaviour_var(MAX_MARK).unwrap_or("").trim();
            let max_mark: f64 = max_mark_raw
                .parse()
                .ok()
                .filter(|m: &f64| *m > 0.0)
                .ok_or_else(|| EngineError::InvalidMark(format!("{mark}/{max_mark_raw}")))?;

            let fraction = value / max_mark;
            let (min, max) = (behaviour.min_fraction(), behaviour.max_fraction());
            if !value.is_finite()
                || fraction < min - FRACTION_EPSILON
                || fraction > max + FRACTION_EPSILON
            {
                return Err(EngineError::MarkOutOfRange {
                    mark: value,
                    max_mark,
                    min,
                    max,
                });
            }
            pending.set_fraction(Some(fraction));
            pending.set_state(QuestionState::manually_graded_for_fraction(Some(fraction)));
        }
        None => {
            let state = if behaviour.is_finished(log) {
                log.state().commented(log.fraction())
            } else {
                log.state()
            };
            pending.set_fraction(log.fraction());
            pending.set_state(state);
        }
    }
    Ok(ActionOutcome::Keep)
}

/// The shared save protocol.
///
/// Saving over a finished attempt is a caller fault. Saving an unchanged
/// response is a no-op.
pub(crate) fn process_save<B: Behaviour + ?Sized>(
    behaviour: &B,
    log: &StepLog,
    pending: &mut AttemptStep,
) -> Result<ActionOutcome, EngineError> {
    if behaviour.is_finished(log) {
        return Err(EngineError::Finished { action: "save" });
    }
    if behaviour.is_same_response(log, pending) {
        return Ok(ActionOutcome::Discard);
    }
    let state = if behaviour.is_complete_response(pending) {
        QuestionState::Complete
    } else {
        QuestionState::Todo
    };
    pending.set_state(state);
    pending.set_fraction(None);
    Ok(ActionOutcome::Keep)
}

/// Call the question's grading function and hold it to its contract.
pub(crate) fn grade(
    question: &dyn QuestionDefinition,
    response: &Response,
) -> Result<(f64, QuestionState), EngineError> {
    let (fraction, state) = question.grade_response(response)?;
    let in_range = fraction.is_finite()
        && fraction >= question.min_fraction() - FRACTION_EPSILON
        && fraction <= question.max_fraction() + FRACTION_EPSILON;
    if !in_range || !state.is_graded() {
        return Err(EngineError::GradingFault {
            question: question.id().to_string(),
            reason: format!("grade ({fraction}, {state}) breaks the grading contract"),
        });
    }
    Ok((fraction, state))
}

pub(crate) fn record_raw_fraction(pending: &mut AttemptStep, raw: f64) {
    pending.set_behaviour_var(RAW_FRACTION, raw.to_string());
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers for driving a behaviour without a full attempt.

    use super::*;
    use crate::step::StepData;

    pub fn data(pairs: &[(&str, &str)]) -> StepData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Start a log with step 0 for `behaviour`.
    pub fn start(behaviour: &dyn Behaviour) -> StepLog {
        let mut first = AttemptStep::new(StepData::new(), None);
        behaviour.init_first_step(&mut first).unwrap();
        first.set_state(QuestionState::Todo);
        StepLog::from_steps(vec![first])
    }

    /// Process `pairs` and commit on keep.
    pub fn act(
        behaviour: &dyn Behaviour,
        log: &mut StepLog,
        pairs: &[(&str, &str)],
    ) -> Result<ActionOutcome, EngineError> {
        let mut pending = AttemptStep::new(data(pairs), None);
        let outcome = behaviour.process_action(log, &mut pending)?;
        if outcome == ActionOutcome::Keep {
            log.push(pending);
        }
        Ok(outcome)
    }
}
