//! A usage: the question attempts of one quiz sitting, keyed by slot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attempt::{QuestionAttempt, RegradeOutcome};
use crate::behaviour::{ActionOutcome, BehaviourKind};
use crate::error::EngineError;
use crate::question::QuestionDefinition;
use crate::state::QuestionState;
use crate::step::StepData;

/// Field suffix carrying the number of steps the form was rendered from.
pub const SEQUENCE_CHECK: &str = ":sequencecheck";

/// Usage-wide scoring policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageOptions {
    /// Report negative marks as zero in totals.
    #[serde(default)]
    pub clamp_negative_marks: bool,
}

/// A slot whose regrade failed. The attempt was left as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegradeFailure {
    pub slot: usize,
    pub question_id: String,
    pub error: String,
}

/// Result of regrading every slot of a usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegradeReport {
    pub outcomes: Vec<RegradeOutcome>,
    pub failures: Vec<RegradeFailure>,
}

impl RegradeReport {
    pub fn changed_slots(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| o.changed)
            .map(|o| o.slot)
            .collect()
    }
}

/// The question attempts of one sitting.
///
/// Slots are 1-based and dense; a slot number never changes once assigned.
#[derive(Debug)]
pub struct Usage {
    id: Uuid,
    context: String,
    preferred_behaviour: BehaviourKind,
    options: UsageOptions,
    created_at: DateTime<Utc>,
    attempts: Vec<QuestionAttempt>,
}

impl Usage {
    pub fn new(context: impl Into<String>, preferred_behaviour: BehaviourKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            context: context.into(),
            preferred_behaviour,
            options: UsageOptions::default(),
            created_at: Utc::now(),
            attempts: Vec::new(),
        }
    }

    /// Rebuild a stored usage. `attempts` may come in any order but their
    /// slots must be exactly `1..=n`.
    pub fn restore(
        id: Uuid,
        context: String,
        preferred_behaviour: BehaviourKind,
        created_at: DateTime<Utc>,
        mut attempts: Vec<QuestionAttempt>,
    ) -> Result<Self, EngineError> {
        attempts.sort_by_key(QuestionAttempt::slot);
        for (index, attempt) in attempts.iter().enumerate() {
            if attempt.slot() != index + 1 {
                return Err(EngineError::UnknownSlot(attempt.slot()));
            }
        }
        Ok(Self {
            id,
            context,
            preferred_behaviour,
            options: UsageOptions::default(),
            created_at,
            attempts,
        })
    }

    pub fn with_options(mut self, options: UsageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn preferred_behaviour(&self) -> BehaviourKind {
        self.preferred_behaviour
    }

    pub fn options(&self) -> UsageOptions {
        self.options
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.attempts.iter().map(QuestionAttempt::slot)
    }

    pub fn attempts(&self) -> &[QuestionAttempt] {
        &self.attempts
    }

    pub fn attempt(&self, slot: usize) -> Result<&QuestionAttempt, EngineError> {
        slot.checked_sub(1)
            .and_then(|i| self.attempts.get(i))
            .ok_or(EngineError::UnknownSlot(slot))
    }

    fn attempt_mut(&mut self, slot: usize) -> Result<&mut QuestionAttempt, EngineError> {
        slot.checked_sub(1)
            .and_then(|i| self.attempts.get_mut(i))
            .ok_or(EngineError::UnknownSlot(slot))
    }

    /// Add a question in the next slot. The behaviour is the usage's
    /// preference unless the question type needs another one.
    pub fn add_question(
        &mut self,
        question: Arc<dyn QuestionDefinition>,
        max_mark: Option<f64>,
    ) -> Result<usize, EngineError> {
        let slot = self.attempts.len() + 1;
        let kind = question.make_behaviour_kind(self.preferred_behaviour);
        let max_mark = max_mark.unwrap_or_else(|| question.default_mark());
        self.attempts
            .push(QuestionAttempt::new(slot, question, kind, max_mark)?);
        Ok(slot)
    }

    pub fn start_question(&mut self, slot: usize, user_id: Option<String>) -> Result<(), EngineError> {
        self.attempt_mut(slot)?.start(user_id)
    }

    /// Start every attempt that has not been started yet. If one fails,
    /// none of them are started.
    pub fn start_all_questions(&mut self, user_id: Option<String>) -> Result<(), EngineError> {
        let slots: Vec<usize> = self
            .attempts
            .iter()
            .filter(|a| !a.is_started())
            .map(QuestionAttempt::slot)
            .collect();
        self.all_or_nothing(&slots, |usage| {
            for &slot in &slots {
                usage.start_question(slot, user_id.clone())?;
            }
            Ok(())
        })
    }

    pub fn process_action(
        &mut self,
        slot: usize,
        data: StepData,
        user_id: Option<String>,
    ) -> Result<ActionOutcome, EngineError> {
        self.attempt_mut(slot)?.process_action(data, user_id)
    }

    /// Form field name for `field` of the attempt in `slot`.
    pub fn field_name(&self, slot: usize, field: &str) -> String {
        format!("q{}:{}_{}", self.id, slot, field)
    }

    /// Split posted form data into per-slot step data.
    ///
    /// Keys look like `q<usage>:<slot>_<field>`. Keys for other usages are
    /// ignored. The returned map holds each slot's data and its sequence
    /// check, if one was posted.
    pub fn extract_responses(
        &self,
        post: &StepData,
    ) -> Result<BTreeMap<usize, (StepData, Option<usize>)>, EngineError> {
        let prefix = format!("q{}:", self.id);
        let mut by_slot: BTreeMap<usize, (StepData, Option<usize>)> = BTreeMap::new();

        for (key, value) in post {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let (slot, field) = rest
                .split_once('_')
                .and_then(|(slot, field)| Some((slot.parse::<usize>().ok()?, field)))
                .filter(|(_, field)| !field.is_empty())
                .ok_or_else(|| EngineError::InvalidFieldName(key.clone()))?;
            let entry = by_slot.entry(slot).or_default();
            if field == SEQUENCE_CHECK {
                let check = value
                    .trim()
                    .parse()
                    .map_err(|_| EngineError::InvalidFieldName(key.clone()))?;
                entry.1 = Some(check);
            } else {
                entry.0.insert(field.to_string(), value.clone());
            }
        }
        Ok(by_slot)
    }

    /// Process a whole posted form.
    ///
    /// Every sequence check is verified before anything is processed. If
    /// any slot fails, steps already committed by this call are removed.
    pub fn process_all_actions(
        &mut self,
        post: &StepData,
        user_id: Option<String>,
    ) -> Result<Vec<(usize, ActionOutcome)>, EngineError> {
        let by_slot = self.extract_responses(post)?;
        for (&slot, (_, check)) in &by_slot {
            let current = self.attempt(slot)?.log().len();
            if let Some(submitted) = *check {
                if submitted != current {
                    return Err(EngineError::StaleSequence {
                        slot,
                        submitted,
                        current,
                    });
                }
            }
        }

        let slots: Vec<usize> = by_slot.keys().copied().collect();
        self.all_or_nothing(&slots, |usage| {
            let mut outcomes = Vec::new();
            for (slot, (data, _)) in by_slot {
                outcomes.push((slot, usage.process_action(slot, data, user_id.clone())?));
            }
            Ok(outcomes)
        })
    }

    pub fn finish_question(
        &mut self,
        slot: usize,
        user_id: Option<String>,
    ) -> Result<ActionOutcome, EngineError> {
        self.attempt_mut(slot)?.finish(user_id)
    }

    /// Finish every started attempt, all or nothing.
    pub fn finish_all_questions(
        &mut self,
        user_id: Option<String>,
    ) -> Result<Vec<(usize, ActionOutcome)>, EngineError> {
        let slots: Vec<usize> = self
            .attempts
            .iter()
            .filter(|a| a.is_started())
            .map(QuestionAttempt::slot)
            .collect();
        let targets = slots.clone();
        self.all_or_nothing(&slots, |usage| {
            targets
                .iter()
                .map(|&slot| Ok((slot, usage.finish_question(slot, user_id.clone())?)))
                .collect()
        })
    }

    pub fn manual_grade(
        &mut self,
        slot: usize,
        comment: &str,
        mark: Option<f64>,
        user_id: Option<String>,
    ) -> Result<ActionOutcome, EngineError> {
        self.attempt_mut(slot)?.manual_grade(comment, mark, user_id)
    }

    /// Run `f`, truncating `slots` back to their current length if it fails.
    fn all_or_nothing<T>(
        &mut self,
        slots: &[usize],
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let lengths: Vec<(usize, usize)> = slots
            .iter()
            .map(|&slot| Ok((slot, self.attempt(slot)?.log().len())))
            .collect::<Result<_, EngineError>>()?;
        let result = f(self);
        if result.is_err() {
            self.rollback(&lengths);
        }
        result
    }

    /// Truncate each `(slot, len)` pair. Unknown slots are skipped.
    pub(crate) fn rollback(&mut self, lengths: &[(usize, usize)]) {
        for &(slot, len) in lengths {
            if let Ok(attempt) = self.attempt_mut(slot) {
                attempt.truncate(len);
            }
        }
    }

    /// Step counts per slot, for [`Usage::rollback`].
    pub(crate) fn step_counts(&self) -> Vec<(usize, usize)> {
        self.attempts
            .iter()
            .map(|a| (a.slot(), a.log().len()))
            .collect()
    }

    pub fn regrade_question(
        &mut self,
        slot: usize,
        question: Arc<dyn QuestionDefinition>,
        max_mark: Option<f64>,
    ) -> Result<RegradeOutcome, EngineError> {
        self.attempt_mut(slot)?.regrade(question, max_mark)
    }

    /// Regrade every slot against `questions` (keyed by question id).
    ///
    /// Slots whose question is not in the map are regraded against the
    /// definition they already hold. A failing slot is reported and left
    /// untouched; the others still regrade.
    pub fn regrade_all_questions(
        &mut self,
        questions: &HashMap<String, Arc<dyn QuestionDefinition>>,
    ) -> RegradeReport {
        let mut report = RegradeReport::default();
        for attempt in &mut self.attempts {
            let question = questions
                .get(attempt.question().id())
                .cloned()
                .unwrap_or_else(|| Arc::clone(attempt.question()));
            let question_id = question.id().to_string();
            match attempt.regrade(question, None) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!(usage = %self.id, slot = attempt.slot(), "regrade failed: {e}");
                    report.failures.push(RegradeFailure {
                        slot: attempt.slot(),
                        question_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// What [`Usage::regrade_all_questions`] would do, without changing
    /// anything.
    pub fn preview_regrade_all(
        &self,
        questions: &HashMap<String, Arc<dyn QuestionDefinition>>,
    ) -> RegradeReport {
        let mut report = RegradeReport::default();
        for attempt in &self.attempts {
            let question = questions
                .get(attempt.question().id())
                .cloned()
                .unwrap_or_else(|| Arc::clone(attempt.question()));
            match attempt.preview_regrade(&question, None) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => report.failures.push(RegradeFailure {
                    slot: attempt.slot(),
                    question_id: question.id().to_string(),
                    error: e.to_string(),
                }),
            }
        }
        report
    }

    /// Mark for one slot, clamped at zero when the usage says so.
    pub fn attempt_mark(&self, slot: usize) -> Result<Option<f64>, EngineError> {
        let mark = self.attempt(slot)?.mark();
        Ok(mark.map(|m| self.clamp(m)))
    }

    fn clamp(&self, mark: f64) -> f64 {
        if self.options.clamp_negative_marks {
            mark.max(0.0)
        } else {
            mark
        }
    }

    /// Sum of marks. `None` while any attempt still needs manual grading;
    /// other ungraded attempts count as zero.
    pub fn total_mark(&self) -> Option<f64> {
        let mut total = 0.0;
        for attempt in &self.attempts {
            if attempt.state() == QuestionState::NeedsGrading && attempt.max_mark() > 0.0 {
                return None;
            }
            total += attempt.mark().map_or(0.0, |m| self.clamp(m));
        }
        Some(total)
    }

    pub fn max_total(&self) -> f64 {
        self.attempts.iter().map(QuestionAttempt::max_mark).sum()
    }
}
