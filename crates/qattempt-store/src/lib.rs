//! qattempt-store — Persistence and question bank adapters.
//!
//! Implements the `AttemptStore` and `QuestionBank` traits from
//! `qattempt-core` with in-memory and JSON-file backends, and loads the
//! `qattempt.toml` configuration that picks between them.

pub mod bank;
pub mod config;
pub mod error;
pub mod json_file;
pub mod memory;

pub use bank::{MemoryBank, TomlQuestionBank};
pub use config::{create_store, load_config, load_config_from, QattemptConfig, StoreConfig};
pub use error::StoreError;
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use qattempt_core::traits::{SlotSteps, UsageRecord};

/// Every slot in `batch` must exist in `record`.
pub(crate) fn check_batch_slots(record: &UsageRecord, batch: &[SlotSteps]) -> Result<(), StoreError> {
    match batch
        .iter()
        .find(|s| !record.slots.iter().any(|r| r.slot == s.slot))
    {
        Some(missing) => Err(StoreError::SlotNotFound {
            usage: record.id,
            slot: missing.slot,
        }),
        None => Ok(()),
    }
}
