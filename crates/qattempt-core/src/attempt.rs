//! One question attempt: a behaviour plus its committed step log.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::behaviour::{
    create_behaviour, is_comment, ActionOutcome, Behaviour, BehaviourKind, COMMENT, FINISH, MARK,
    MAX_MARK,
};
use crate::display::{AttemptView, DisplayOptions, MarksVisibility};
use crate::error::EngineError;
use crate::question::QuestionDefinition;
use crate::state::QuestionState;
use crate::step::{AttemptStep, StepData, StepLog, BEHAVIOUR_PREFIX, PRIVATE_PREFIX};

/// What a regrade did to one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegradeOutcome {
    pub slot: usize,
    pub question_id: String,
    /// Whether the replayed history replaced the stored one.
    pub changed: bool,
    pub old_state: QuestionState,
    pub new_state: QuestionState,
    pub old_fraction: Option<f64>,
    pub new_fraction: Option<f64>,
    pub old_max_mark: f64,
    pub new_max_mark: f64,
}

/// A replayed history that has not been applied yet.
struct Replay {
    behaviour: Box<dyn Behaviour>,
    log: StepLog,
    outcome: RegradeOutcome,
}

/// The attempt at the question in one slot of a usage.
///
/// Current state and mark are always read off the last committed step.
#[derive(Debug)]
pub struct QuestionAttempt {
    slot: usize,
    behaviour: Box<dyn Behaviour>,
    max_mark: f64,
    log: StepLog,
}

fn check_max_mark(max_mark: f64) -> Result<f64, EngineError> {
    if max_mark.is_finite() && max_mark >= 0.0 {
        Ok(max_mark)
    } else {
        Err(EngineError::InvalidMark(max_mark.to_string()))
    }
}

impl QuestionAttempt {
    /// A new, not yet started attempt.
    pub fn new(
        slot: usize,
        question: Arc<dyn QuestionDefinition>,
        kind: BehaviourKind,
        max_mark: f64,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            slot,
            behaviour: create_behaviour(kind, question)?,
            max_mark: check_max_mark(max_mark)?,
            log: StepLog::new(),
        })
    }

    /// Rebuild an attempt from persisted steps.
    pub fn restore(
        slot: usize,
        question: Arc<dyn QuestionDefinition>,
        kind: BehaviourKind,
        max_mark: f64,
        steps: Vec<AttemptStep>,
    ) -> Result<Self, EngineError> {
        let mut attempt = Self::new(slot, question, kind, max_mark)?;
        attempt.log = StepLog::from_steps(steps);
        Ok(attempt)
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn question(&self) -> &Arc<dyn QuestionDefinition> {
        self.behaviour.question()
    }

    pub fn behaviour_kind(&self) -> BehaviourKind {
        self.behaviour.kind()
    }

    pub fn max_mark(&self) -> f64 {
        self.max_mark
    }

    pub fn log(&self) -> &StepLog {
        &self.log
    }

    pub fn steps(&self) -> &[AttemptStep] {
        self.log.steps()
    }

    pub fn is_started(&self) -> bool {
        !self.log.is_empty()
    }

    pub fn state(&self) -> QuestionState {
        self.log.state()
    }

    pub fn fraction(&self) -> Option<f64> {
        self.log.fraction()
    }

    /// `fraction * max_mark`, or `None` while ungraded.
    pub fn mark(&self) -> Option<f64> {
        self.fraction().map(|f| f * self.max_mark)
    }

    pub fn min_fraction(&self) -> f64 {
        self.behaviour.min_fraction()
    }

    pub fn is_finished(&self) -> bool {
        self.behaviour.is_finished(&self.log)
    }

    /// Create step 0.
    pub fn start(&mut self, user_id: Option<String>) -> Result<(), EngineError> {
        if self.is_started() {
            return Err(EngineError::AlreadyStarted);
        }
        let mut first = AttemptStep::new(StepData::new(), user_id);
        self.behaviour.init_first_step(&mut first)?;
        first.set_state(QuestionState::Todo);
        self.log.push(first);
        Ok(())
    }

    /// Process raw student or grader input.
    ///
    /// Only fields the question and behaviour currently expect get through;
    /// derived keys (`_x`, `-_x`) are always dropped.
    pub fn process_action(
        &mut self,
        data: StepData,
        user_id: Option<String>,
    ) -> Result<ActionOutcome, EngineError> {
        if !self.is_started() {
            return Err(EngineError::NotStarted);
        }
        let pending = AttemptStep::new(self.expected_input(data), user_id);
        self.process_pending(pending)
    }

    fn expected_input(&self, data: StepData) -> StepData {
        let question_fields = self.question().expected_data();
        let mut behaviour_fields = self.behaviour.expected_behaviour_data(&self.log);
        behaviour_fields.extend([FINISH, COMMENT, MARK, MAX_MARK]);

        data.into_iter()
            .filter(|(key, _)| match key.strip_prefix(BEHAVIOUR_PREFIX) {
                Some(name) => {
                    !name.starts_with(PRIVATE_PREFIX) && behaviour_fields.iter().any(|f| *f == name)
                }
                None => question_fields.iter().any(|f| f == key),
            })
            .collect()
    }

    fn process_pending(&mut self, mut pending: AttemptStep) -> Result<ActionOutcome, EngineError> {
        let outcome = self.behaviour.process_action(&self.log, &mut pending)?;
        match outcome {
            ActionOutcome::Keep => {
                debug!(
                    slot = self.slot,
                    sequence = self.log.len(),
                    state = %pending.state(),
                    "step kept"
                );
                self.log.push(pending);
            }
            ActionOutcome::Discard => debug!(slot = self.slot, "step discarded"),
        }
        Ok(outcome)
    }

    /// Finish the attempt. A no-op if it already is.
    pub fn finish(&mut self, user_id: Option<String>) -> Result<ActionOutcome, EngineError> {
        let data = StepData::from([(format!("{BEHAVIOUR_PREFIX}{FINISH}"), "1".to_string())]);
        self.process_action(data, user_id)
    }

    /// Leave a grader comment, optionally with a mark out of this
    /// attempt's max mark.
    pub fn manual_grade(
        &mut self,
        comment: &str,
        mark: Option<f64>,
        user_id: Option<String>,
    ) -> Result<ActionOutcome, EngineError> {
        let mut data = StepData::from([(format!("{BEHAVIOUR_PREFIX}{COMMENT}"), comment.to_string())]);
        if let Some(mark) = mark {
            data.insert(format!("{BEHAVIOUR_PREFIX}{MARK}"), mark.to_string());
            data.insert(format!("{BEHAVIOUR_PREFIX}{MAX_MARK}"), self.max_mark.to_string());
        }
        self.process_action(data, user_id)
    }

    /// Snapshot for a renderer, after the behaviour narrows `options`.
    pub fn view(&self, options: DisplayOptions) -> Result<AttemptView, EngineError> {
        let options = self.behaviour.adjust_display_options(&self.log, options);
        let question = self.question();
        let response = self.log.last_response();
        let state = self.state();
        let show_marks = options.marks == MarksVisibility::MarkAndMax;

        let mut behaviour_vars = BTreeMap::new();
        for step in self.log.iter() {
            for (key, value) in step.data() {
                if let Some(name) = key.strip_prefix(BEHAVIOUR_PREFIX) {
                    behaviour_vars.insert(name.to_string(), value.clone());
                }
            }
        }

        Ok(AttemptView {
            slot: self.slot,
            question_id: question.id().to_string(),
            question_name: question.name().to_string(),
            behaviour: self.behaviour_kind(),
            state,
            finished: self.is_finished(),
            sequence_check: self.log.len(),
            max_mark: self.max_mark,
            mark: if show_marks { self.mark() } else { None },
            fraction: if show_marks { self.fraction() } else { None },
            response_summary: question.summarise_response(&response),
            validation_error: (state == QuestionState::Invalid)
                .then(|| question.validation_error(&response)),
            hint: self.behaviour.current_hint(&self.log)?.cloned(),
            num_parts_right: if options.num_parts_correct {
                question.num_parts_right(&response)
            } else {
                None
            },
            right_answer: if options.right_answer {
                question.summarise_response(&question.correct_response())
            } else {
                None
            },
            manual_comment: if options.manual_comment {
                self.log.last_behaviour_var(COMMENT).map(str::to_string)
            } else {
                None
            },
            response,
            behaviour_vars,
            options,
        })
    }

    /// Drop steps committed after `len`. Used to undo a failed save.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.log.truncate(len);
    }

    /// Fold the stored history through a fresh behaviour for `question`.
    fn replay(
        &self,
        question: &Arc<dyn QuestionDefinition>,
        max_mark: Option<f64>,
    ) -> Result<Replay, EngineError> {
        let wrap = |step: usize| {
            let slot = self.slot;
            move |source: EngineError| EngineError::Regrade {
                slot,
                step,
                source: Box::new(source),
            }
        };
        let new_max_mark = check_max_mark(max_mark.unwrap_or(self.max_mark)).map_err(wrap(0))?;
        let behaviour = create_behaviour(self.behaviour_kind(), Arc::clone(question)).map_err(wrap(0))?;
        let mut log = StepLog::new();

        for (sequence, old) in self.log.iter().enumerate() {
            let user_id = old.user_id().map(str::to_string);
            if sequence == 0 {
                // Keep the question's stored randomisation; behaviour
                // counters are seeded afresh.
                let seed: StepData = old
                    .data()
                    .iter()
                    .filter(|(key, _)| !key.starts_with(BEHAVIOUR_PREFIX))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let mut first = AttemptStep::new(seed, user_id).with_timestamp(old.timestamp());
                behaviour.init_first_step(&mut first).map_err(wrap(0))?;
                first.set_state(QuestionState::Todo);
                log.push(first);
                continue;
            }

            let mut pending =
                AttemptStep::new(old.submitted_data(), user_id).with_timestamp(old.timestamp());
            // Student input that arrived after the replayed attempt ended is
            // dropped. Comments still apply.
            if behaviour.is_finished(&log) && !is_comment(&pending) {
                debug!(slot = self.slot, sequence, "late step skipped on replay");
                continue;
            }
            let outcome = behaviour
                .process_action(&log, &mut pending)
                .map_err(wrap(sequence))?;
            if outcome == ActionOutcome::Keep {
                log.push(pending);
            }
        }

        let changed = log.state() != self.state()
            || log.fraction() != self.fraction()
            || new_max_mark != self.max_mark;
        let outcome = RegradeOutcome {
            slot: self.slot,
            question_id: question.id().to_string(),
            changed,
            old_state: self.state(),
            new_state: log.state(),
            old_fraction: self.fraction(),
            new_fraction: log.fraction(),
            old_max_mark: self.max_mark,
            new_max_mark,
        };
        Ok(Replay {
            behaviour,
            log,
            outcome,
        })
    }

    /// What a regrade against `question` would do, without applying it.
    pub fn preview_regrade(
        &self,
        question: &Arc<dyn QuestionDefinition>,
        max_mark: Option<f64>,
    ) -> Result<RegradeOutcome, EngineError> {
        self.replay(question, max_mark).map(|r| r.outcome)
    }

    /// Regrade against `question` (and optionally a new max mark).
    ///
    /// The replayed history replaces the stored one only if the final state,
    /// fraction or max mark differs. On error the attempt is untouched.
    pub fn regrade(
        &mut self,
        question: Arc<dyn QuestionDefinition>,
        max_mark: Option<f64>,
    ) -> Result<RegradeOutcome, EngineError> {
        let Replay {
            behaviour,
            log,
            outcome,
        } = self.replay(&question, max_mark)?;
        self.behaviour = behaviour;
        if outcome.changed {
            self.log = log;
            self.max_mark = outcome.new_max_mark;
        }
        Ok(outcome)
    }
}
