//! Async orchestration of usages against a store and a question bank.
//!
//! Every mutating call changes the usage in memory first and then writes the
//! new steps in one store batch. If the write fails, the in-memory attempts
//! are truncated back so memory and storage never diverge.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::attempt::QuestionAttempt;
use crate::behaviour::{ActionOutcome, BehaviourKind};
use crate::step::StepData;
use crate::traits::{AttemptStore, QuestionBank, SlotSteps, UsageRecord};
use crate::usage::{RegradeReport, Usage, UsageOptions};

/// Configuration for the question engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Report negative marks as zero in usage totals.
    pub clamp_negative_marks: bool,
    /// Maximum usages regraded at once.
    pub regrade_parallelism: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clamp_negative_marks: false,
            regrade_parallelism: 4,
        }
    }
}

/// A question to place in a new usage.
#[derive(Debug, Clone)]
pub struct SlotSpec {
    pub question_id: String,
    /// Defaults to the question's own default mark.
    pub max_mark: Option<f64>,
}

/// Results of regrading several usages.
#[derive(Debug, Default)]
pub struct BatchRegrade {
    pub reports: Vec<(Uuid, RegradeReport)>,
    pub failed: Vec<(Uuid, String)>,
}

/// The question engine.
pub struct QuestionEngine {
    store: Arc<dyn AttemptStore>,
    bank: Arc<dyn QuestionBank>,
    config: EngineConfig,
}

impl QuestionEngine {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        bank: Arc<dyn QuestionBank>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            bank,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn AttemptStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build a usage, start every slot, and store it with its first steps.
    pub async fn create_usage(
        &self,
        context: &str,
        preferred_behaviour: BehaviourKind,
        slots: &[SlotSpec],
        user_id: Option<String>,
    ) -> Result<Usage> {
        let mut usage = Usage::new(context, preferred_behaviour).with_options(UsageOptions {
            clamp_negative_marks: self.config.clamp_negative_marks,
        });
        for spec in slots {
            let question = self
                .bank
                .load_question(&spec.question_id)
                .await
                .with_context(|| format!("failed to load question '{}'", spec.question_id))?;
            usage.add_question(question, spec.max_mark)?;
        }
        usage.start_all_questions(user_id)?;

        let batch: Vec<SlotSteps> = usage
            .attempts()
            .iter()
            .map(|a| SlotSteps {
                slot: a.slot(),
                steps: a.steps().to_vec(),
            })
            .collect();
        self.store
            .replace_steps(&UsageRecord::from_usage(&usage), &batch)
            .await
            .with_context(|| format!("failed to store usage {}", usage.id()))?;

        tracing::info!(usage = %usage.id(), slots = usage.len(), "usage created");
        Ok(usage)
    }

    /// Load a stored usage with the bank's current definitions. Step logs are
    /// restored as stored, without replay.
    pub async fn load_usage(&self, id: Uuid) -> Result<Usage> {
        let record = self
            .store
            .load_usage(id)
            .await
            .with_context(|| format!("failed to load usage {id}"))?;

        let loads = record.slots.iter().map(|slot| async move {
            let question = self
                .bank
                .load_question(&slot.question_id)
                .await
                .with_context(|| format!("failed to load question '{}'", slot.question_id))?;
            let steps = self
                .store
                .load_steps(id, slot.slot)
                .await
                .with_context(|| format!("failed to load steps for slot {}", slot.slot))?;
            let attempt =
                QuestionAttempt::restore(slot.slot, question, slot.behaviour, slot.max_mark, steps)?;
            Ok::<_, anyhow::Error>(attempt)
        });
        let attempts = futures::future::try_join_all(loads).await?;

        let usage = Usage::restore(
            record.id,
            record.context,
            record.preferred_behaviour,
            record.created_at,
            attempts,
        )?;
        Ok(usage.with_options(record.options))
    }

    pub async fn list_usages(&self) -> Result<Vec<UsageRecord>> {
        self.store.list_usages().await
    }

    /// Write the steps committed since `before`, or roll them back.
    async fn persist(&self, usage: &mut Usage, before: &[(usize, usize)]) -> Result<()> {
        let batch: Vec<SlotSteps> = before
            .iter()
            .filter_map(|&(slot, len)| {
                let steps = usage.attempt(slot).ok()?.steps().get(len..)?;
                (!steps.is_empty()).then(|| SlotSteps {
                    slot,
                    steps: steps.to_vec(),
                })
            })
            .collect();
        if batch.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.store.append_steps(usage.id(), &batch).await {
            tracing::error!(usage = %usage.id(), "append failed, rolling back: {e:#}");
            usage.rollback(before);
            return Err(e.context(format!("failed to store steps for usage {}", usage.id())));
        }
        Ok(())
    }

    pub async fn process_action(
        &self,
        usage: &mut Usage,
        slot: usize,
        data: StepData,
        user_id: Option<String>,
    ) -> Result<ActionOutcome> {
        let before = usage.step_counts();
        let outcome = usage.process_action(slot, data, user_id)?;
        self.persist(usage, &before).await?;
        Ok(outcome)
    }

    /// Process a posted form covering any number of slots.
    pub async fn process_all_actions(
        &self,
        usage: &mut Usage,
        post: &StepData,
        user_id: Option<String>,
    ) -> Result<Vec<(usize, ActionOutcome)>> {
        let before = usage.step_counts();
        let outcomes = usage.process_all_actions(post, user_id)?;
        self.persist(usage, &before).await?;
        Ok(outcomes)
    }

    pub async fn finish_question(
        &self,
        usage: &mut Usage,
        slot: usize,
        user_id: Option<String>,
    ) -> Result<ActionOutcome> {
        let before = usage.step_counts();
        let outcome = usage.finish_question(slot, user_id)?;
        self.persist(usage, &before).await?;
        Ok(outcome)
    }

    pub async fn finish_all(
        &self,
        usage: &mut Usage,
        user_id: Option<String>,
    ) -> Result<Vec<(usize, ActionOutcome)>> {
        let before = usage.step_counts();
        let outcomes = usage.finish_all_questions(user_id)?;
        self.persist(usage, &before).await?;
        Ok(outcomes)
    }

    pub async fn manual_grade(
        &self,
        usage: &mut Usage,
        slot: usize,
        comment: &str,
        mark: Option<f64>,
        user_id: Option<String>,
    ) -> Result<ActionOutcome> {
        let before = usage.step_counts();
        let outcome = usage.manual_grade(slot, comment, mark, user_id)?;
        self.persist(usage, &before).await?;
        Ok(outcome)
    }

    /// Regrade a stored usage against the bank's current definitions.
    ///
    /// Changed slots are superseded in one store write unless `dry_run`.
    pub async fn regrade_usage(&self, id: Uuid, dry_run: bool) -> Result<RegradeReport> {
        let mut usage = self.load_usage(id).await?;
        let current = HashMap::new();

        if dry_run {
            return Ok(usage.preview_regrade_all(&current));
        }

        let report = usage.regrade_all_questions(&current);
        let changed = report.changed_slots();
        if changed.is_empty() {
            return Ok(report);
        }

        let batch = changed
            .iter()
            .map(|&slot| {
                Ok(SlotSteps {
                    slot,
                    steps: usage.attempt(slot)?.steps().to_vec(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.store
            .replace_steps(&UsageRecord::from_usage(&usage), &batch)
            .await
            .with_context(|| format!("failed to store regraded usage {id}"))?;

        for outcome in report.outcomes.iter().filter(|o| o.changed) {
            tracing::info!(
                usage = %id,
                slot = outcome.slot,
                old = %outcome.old_state,
                new = %outcome.new_state,
                "regrade changed outcome"
            );
        }
        Ok(report)
    }

    /// Regrade several usages concurrently, at most
    /// `regrade_parallelism` at a time.
    pub async fn regrade_usages(&self, ids: &[Uuid], dry_run: bool) -> BatchRegrade {
        let semaphore = Arc::new(Semaphore::new(self.config.regrade_parallelism.max(1)));
        let mut futures = FuturesUnordered::new();

        for &id in ids {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let result = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                    self.regrade_usage(id, dry_run).await
                }
                .await;
                (id, result)
            });
        }

        let mut batch = BatchRegrade::default();
        while let Some((id, result)) = futures.next().await {
            match result {
                Ok(report) => batch.reports.push((id, report)),
                Err(e) => {
                    tracing::error!("regrade failed for usage {id}: {e:#}");
                    batch.failed.push((id, format!("{e:#}")));
                }
            }
        }
        batch
    }
}
