//! Store error types.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by store and bank adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No usage with this id has been saved.
    #[error("usage not found: {0}")]
    UsageNotFound(Uuid),

    /// The usage exists but has no such slot.
    #[error("usage {usage} has no slot {slot}")]
    SlotNotFound { usage: Uuid, slot: usize },

    /// The bank has no question with this id.
    #[error("question not found: {0}")]
    QuestionNotFound(String),

    /// A stored document could not be decoded.
    #[error("corrupt usage file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// A write failed on purpose (memory store failure injection).
    #[error("injected write failure in {0}")]
    Injected(&'static str),
}
