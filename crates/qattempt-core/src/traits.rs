//! Collaborator traits for persistence and question lookup.
//!
//! These async traits are implemented by the `qattempt-store` crate.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::behaviour::BehaviourKind;
use crate::question::QuestionDefinition;
use crate::step::AttemptStep;
use crate::usage::{Usage, UsageOptions};

// ---------------------------------------------------------------------------
// Stored records
// ---------------------------------------------------------------------------

/// Everything about a usage except its step logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub context: String,
    pub preferred_behaviour: BehaviourKind,
    #[serde(default)]
    pub options: UsageOptions,
    pub created_at: DateTime<Utc>,
    pub slots: Vec<SlotRecord>,
}

/// One slot of a stored usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub slot: usize,
    pub question_id: String,
    pub behaviour: BehaviourKind,
    pub max_mark: f64,
}

impl UsageRecord {
    pub fn from_usage(usage: &Usage) -> Self {
        Self {
            id: usage.id(),
            context: usage.context().to_string(),
            preferred_behaviour: usage.preferred_behaviour(),
            options: usage.options(),
            created_at: usage.created_at(),
            slots: usage
                .attempts()
                .iter()
                .map(|a| SlotRecord {
                    slot: a.slot(),
                    question_id: a.question().id().to_string(),
                    behaviour: a.behaviour_kind(),
                    max_mark: a.max_mark(),
                })
                .collect(),
        }
    }
}

/// Steps to add to one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSteps {
    pub slot: usize,
    pub steps: Vec<AttemptStep>,
}

// ---------------------------------------------------------------------------
// Attempt store trait
// ---------------------------------------------------------------------------

/// Durable storage for usages and their step logs.
///
/// Batch writes are all-or-nothing: after an error, nothing from the batch
/// may be visible to later reads.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Store name for logs (e.g. "json").
    fn name(&self) -> &str;

    /// Create or overwrite the usage record. Step logs are untouched.
    async fn save_usage(&self, record: &UsageRecord) -> Result<()>;

    async fn load_usage(&self, id: Uuid) -> Result<UsageRecord>;

    /// All stored usages, oldest first.
    async fn list_usages(&self) -> Result<Vec<UsageRecord>>;

    /// Append steps to several slots in one atomic write.
    async fn append_steps(&self, id: Uuid, batch: &[SlotSteps]) -> Result<()>;

    /// Append a single step.
    async fn append_step(&self, id: Uuid, slot: usize, step: &AttemptStep) -> Result<()> {
        self.append_steps(
            id,
            &[SlotSteps {
                slot,
                steps: vec![step.clone()],
            }],
        )
        .await
    }

    /// Steps of one slot in commit order.
    async fn load_steps(&self, id: Uuid, slot: usize) -> Result<Vec<AttemptStep>>;

    /// Replace whole step logs and the usage record in one atomic write.
    /// Used when a regrade supersedes history.
    async fn replace_steps(&self, record: &UsageRecord, batch: &[SlotSteps]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Question bank trait
// ---------------------------------------------------------------------------

/// Read-only source of question definitions.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn load_question(&self, id: &str) -> Result<Arc<dyn QuestionDefinition>>;

    /// Ids of every question in the bank.
    async fn question_ids(&self) -> Result<Vec<String>>;
}
