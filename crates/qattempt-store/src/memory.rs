//! In-memory store for tests and one-shot runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use uuid::Uuid;

use qattempt_core::step::AttemptStep;
use qattempt_core::traits::{AttemptStore, SlotSteps, UsageRecord};

use crate::check_batch_slots;
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct StoredUsage {
    record: UsageRecord,
    steps: BTreeMap<usize, Vec<AttemptStep>>,
}

/// A mutex-guarded map of usages.
///
/// Writes can be made to fail with [`MemoryStore::fail_writes`] to exercise
/// the engine's rollback path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    usages: Mutex<HashMap<Uuid, StoredUsage>>,
    fail_writes: AtomicBool,
    write_count: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> u32 {
        self.write_count.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, StoredUsage>>> {
        self.usages
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn check_write(&self, operation: &'static str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Injected(operation).into());
        }
        Ok(())
    }

    fn wrote(&self) {
        self.write_count.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save_usage(&self, record: &UsageRecord) -> Result<()> {
        self.check_write("save_usage")?;
        let mut usages = self.lock()?;
        usages
            .entry(record.id)
            .and_modify(|u| u.record = record.clone())
            .or_insert_with(|| StoredUsage {
                record: record.clone(),
                steps: BTreeMap::new(),
            });
        self.wrote();
        Ok(())
    }

    async fn load_usage(&self, id: Uuid) -> Result<UsageRecord> {
        let usages = self.lock()?;
        usages
            .get(&id)
            .map(|u| u.record.clone())
            .ok_or_else(|| StoreError::UsageNotFound(id).into())
    }

    async fn list_usages(&self) -> Result<Vec<UsageRecord>> {
        let usages = self.lock()?;
        let mut records: Vec<UsageRecord> = usages.values().map(|u| u.record.clone()).collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn append_steps(&self, id: Uuid, batch: &[SlotSteps]) -> Result<()> {
        self.check_write("append_steps")?;
        let mut usages = self.lock()?;
        let usage = usages.get_mut(&id).ok_or(StoreError::UsageNotFound(id))?;
        check_batch_slots(&usage.record, batch)?;

        for slot_steps in batch {
            usage
                .steps
                .entry(slot_steps.slot)
                .or_default()
                .extend(slot_steps.steps.iter().cloned());
        }
        self.wrote();
        Ok(())
    }

    async fn load_steps(&self, id: Uuid, slot: usize) -> Result<Vec<AttemptStep>> {
        let usages = self.lock()?;
        let usage = usages.get(&id).ok_or(StoreError::UsageNotFound(id))?;
        if !usage.record.slots.iter().any(|s| s.slot == slot) {
            return Err(StoreError::SlotNotFound { usage: id, slot }.into());
        }
        Ok(usage.steps.get(&slot).cloned().unwrap_or_default())
    }

    async fn replace_steps(&self, record: &UsageRecord, batch: &[SlotSteps]) -> Result<()> {
        self.check_write("replace_steps")?;
        check_batch_slots(record, batch)?;
        let mut usages = self.lock()?;
        let usage = usages.entry(record.id).or_insert_with(|| StoredUsage {
            record: record.clone(),
            steps: BTreeMap::new(),
        });
        usage.record = record.clone();
        for slot_steps in batch {
            usage.steps.insert(slot_steps.slot, slot_steps.steps.clone());
        }
        self.wrote();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use qattempt_core::behaviour::BehaviourKind;
    use qattempt_core::step::StepData;
    use qattempt_core::traits::SlotRecord;
    use qattempt_core::usage::UsageOptions;

    fn record() -> UsageRecord {
        UsageRecord {
            id: Uuid::new_v4(),
            context: "test".into(),
            preferred_behaviour: BehaviourKind::DeferredFeedback,
            options: UsageOptions::default(),
            created_at: Utc::now(),
            slots: vec![SlotRecord {
                slot: 1,
                question_id: "tf".into(),
                behaviour: BehaviourKind::DeferredFeedback,
                max_mark: 1.0,
            }],
        }
    }

    fn step() -> AttemptStep {
        AttemptStep::new(StepData::new(), None)
    }

    #[tokio::test]
    async fn append_and_load() {
        let store = MemoryStore::new();
        let record = record();
        store.save_usage(&record).await.unwrap();
        store.append_step(record.id, 1, &step()).await.unwrap();
        store.append_step(record.id, 1, &step()).await.unwrap();

        assert_eq!(store.load_steps(record.id, 1).await.unwrap().len(), 2);
        assert_eq!(store.load_usage(record.id).await.unwrap(), record);
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn unknown_slot_rejects_whole_batch() {
        let store = MemoryStore::new();
        let record = record();
        store.save_usage(&record).await.unwrap();

        let batch = [
            SlotSteps {
                slot: 1,
                steps: vec![step()],
            },
            SlotSteps {
                slot: 2,
                steps: vec![step()],
            },
        ];
        let err = store.append_steps(record.id, &batch).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::SlotNotFound { slot: 2, .. })
        ));
        assert!(store.load_steps(record.id, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failure() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        let err = store.save_usage(&record()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Injected("save_usage"))
        ));
        assert!(store.list_usages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_usage() {
        let store = MemoryStore::new();
        let err = store.load_usage(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::UsageNotFound(_))
        ));
    }
}
