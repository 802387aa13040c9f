//! JSON-file store: one pretty-printed document per usage.
//!
//! Every write rewrites the whole document through a temp file in the same
//! directory that is then renamed over the old one, so a reader sees either
//! the old document or the new one.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use uuid::Uuid;

use qattempt_core::step::AttemptStep;
use qattempt_core::traits::{AttemptStore, SlotSteps, UsageRecord};

use crate::check_batch_slots;
use crate::error::StoreError;

#[derive(Debug, Serialize, Deserialize)]
struct UsageDocument {
    record: UsageRecord,
    #[serde(default)]
    steps: BTreeMap<usize, Vec<AttemptStep>>,
}

/// Stores usages as `<dir>/<uuid>.json`.
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read_document(&self, id: Uuid) -> Result<Option<UsageDocument>> {
        let path = self.path_for(id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        read_document_at(&path).await.map(Some)
    }

    async fn require_document(&self, id: Uuid) -> Result<UsageDocument> {
        self.read_document(id)
            .await?
            .ok_or_else(|| StoreError::UsageNotFound(id).into())
    }

    async fn write_document(&self, document: &UsageDocument) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create store directory: {}", self.dir.display()))?;

        let json = serde_json::to_string_pretty(document)?;
        let dir = self.dir.clone();
        let path = self.path_for(document.record.id);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = NamedTempFile::new_in(&dir)
                .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
            tmp.write_all(json.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path)
                .map_err(|e| e.error)
                .with_context(|| format!("failed to write {}", path.display()))?;
            Ok(())
        })
        .await
        .context("store write task failed")?
    }
}

async fn read_document_at(path: &Path) -> Result<UsageDocument> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| {
        StoreError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl AttemptStore for JsonFileStore {
    fn name(&self) -> &str {
        "json"
    }

    async fn save_usage(&self, record: &UsageRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let document = match self.read_document(record.id).await? {
            Some(mut document) => {
                document.record = record.clone();
                document
            }
            None => UsageDocument {
                record: record.clone(),
                steps: BTreeMap::new(),
            },
        };
        self.write_document(&document).await
    }

    async fn load_usage(&self, id: Uuid) -> Result<UsageRecord> {
        Ok(self.require_document(id).await?.record)
    }

    async fn list_usages(&self) -> Result<Vec<UsageRecord>> {
        let mut records = Vec::new();
        if !self.dir.is_dir() {
            return Ok(records);
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to read directory: {}", self.dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_document_at(&path).await {
                Ok(document) => records.push(document.record),
                Err(e) => tracing::warn!("skipping {}: {:#}", path.display(), e),
            }
        }

        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn append_steps(&self, id: Uuid, batch: &[SlotSteps]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.require_document(id).await?;
        check_batch_slots(&document.record, batch)?;

        for slot_steps in batch {
            document
                .steps
                .entry(slot_steps.slot)
                .or_default()
                .extend(slot_steps.steps.iter().cloned());
        }
        self.write_document(&document).await
    }

    async fn load_steps(&self, id: Uuid, slot: usize) -> Result<Vec<AttemptStep>> {
        let mut document = self.require_document(id).await?;
        if !document.record.slots.iter().any(|s| s.slot == slot) {
            return Err(StoreError::SlotNotFound { usage: id, slot }.into());
        }
        Ok(document.steps.remove(&slot).unwrap_or_default())
    }

    async fn replace_steps(&self, record: &UsageRecord, batch: &[SlotSteps]) -> Result<()> {
        check_batch_slots(record, batch)?;
        let _guard = self.write_lock.lock().await;
        let mut document = self
            .read_document(record.id)
            .await?
            .unwrap_or_else(|| UsageDocument {
                record: record.clone(),
                steps: BTreeMap::new(),
            });
        document.record = record.clone();
        for slot_steps in batch {
            document.steps.insert(slot_steps.slot, slot_steps.steps.clone());
        }
        self.write_document(&document).await
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

    fn record(slots: usize) -> UsageRecord {
        UsageRecord {
            id: Uuid::new_v4(),
            context: "json".into(),
            preferred_behaviour: BehaviourKind::Interactive,
            options: UsageOptions::default(),
            created_at: Utc::now(),
            slots: (1..=slots)
                .map(|slot| SlotRecord {
                    slot,
                    question_id: format!("q{slot}"),
                    behaviour: BehaviourKind::Interactive,
                    max_mark: 1.0,
                })
                .collect(),
        }
    }

    fn step(answer: &str) -> AttemptStep {
        let mut data = StepData::new();
        data.insert("answer".into(), answer.into());
        AttemptStep::new(data, Some("student".into()))
    }

    #[tokio::test]
    async fn roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("usages"));
        let record = record(2);
        let first = step("1");

        store
            .replace_steps(
                &record,
                &[SlotSteps {
                    slot: 1,
                    steps: vec![first.clone()],
                }],
            )
            .await
            .unwrap();
        store.append_step(record.id, 2, &step("0")).await.unwrap();

        let reopened = JsonFileStore::new(dir.path().join("usages"));
        assert_eq!(reopened.load_usage(record.id).await.unwrap(), record);
        assert_eq!(reopened.load_steps(record.id, 1).await.unwrap(), vec![first]);
        assert_eq!(reopened.load_steps(record.id, 2).await.unwrap().len(), 1);
        assert_eq!(reopened.list_usages().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_supersedes_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let record = record(1);
        store.save_usage(&record).await.unwrap();
        store.append_step(record.id, 1, &step("1")).await.unwrap();
        store.append_step(record.id, 1, &step("0")).await.unwrap();

        let replacement = vec![step("1")];
        store
            .replace_steps(
                &record,
                &[SlotSteps {
                    slot: 1,
                    steps: replacement.clone(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(store.load_steps(record.id, 1).await.unwrap(), replacement);
    }

    #[tokio::test]
    async fn corrupt_files_are_skipped_when_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.save_usage(&record(1)).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list_usages().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_usage_and_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.list_usages().await.unwrap().is_empty());

        let err = store.load_usage(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::UsageNotFound(_))
        ));

        let record = record(1);
        store.save_usage(&record).await.unwrap();
        let err = store.append_step(record.id, 3, &step("1")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::SlotNotFound { slot: 3, .. })
        ));
    }
}
