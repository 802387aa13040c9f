//! Engine error types.
//!
//! These represent contract faults: a caller or a question type broke the
//! rules the state machine relies on. User mistakes (an incomplete answer,
//! submitting before answering) are never errors; they are modelled as
//! states such as `QuestionState::Invalid`, and a no-op action is an
//! `ActionOutcome::Discard`.

use thiserror::Error;

/// Faults raised by behaviours, attempts and usages.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An action arrived before the attempt was started.
    #[error("question attempt has not been started")]
    NotStarted,

    /// `start` was called on an attempt that already has a first step.
    #[error("question attempt has already been started")]
    AlreadyStarted,

    /// An action that needs an active attempt arrived after it was finished.
    #[error("cannot {action} a finished question attempt")]
    Finished { action: &'static str },

    /// A variable the history must contain is absent, or its value is
    /// unreadable. This indicates a corrupted step log.
    #[error("missing or malformed variable '{name}' in step log")]
    MissingVariable { name: String },

    /// A manual mark could not be parsed.
    #[error("invalid manual mark '{0}'")]
    InvalidMark(String),

    /// A manual mark is outside the fraction range of the behaviour.
    #[error("mark {mark} out of {max_mark} is outside the allowed range [{min}, {max}]")]
    MarkOutOfRange {
        mark: f64,
        max_mark: f64,
        min: f64,
        max: f64,
    },

    /// A question type failed to grade a response it reported as gradable.
    #[error("question '{question}' cannot grade response: {reason}")]
    GradingFault { question: String, reason: String },

    /// A behaviour was paired with a question that lacks a required capability.
    #[error("behaviour '{behaviour}' cannot be used with question '{question}': {reason}")]
    Unsupported {
        behaviour: String,
        question: String,
        reason: String,
    },

    /// An unknown behaviour name was requested.
    #[error("unknown behaviour: {0}")]
    UnknownBehaviour(String),

    /// No question attempt occupies the slot.
    #[error("no question attempt in slot {0}")]
    UnknownSlot(usize),

    /// Submitted data was built from an out-of-date view of the attempt.
    #[error("slot {slot}: submitted sequence {submitted} but the attempt has {current} steps")]
    StaleSequence {
        slot: usize,
        submitted: usize,
        current: usize,
    },

    /// A posted field name does not follow the `q<usage>:<slot>_<name>` layout.
    #[error("malformed field name: {0}")]
    InvalidFieldName(String),

    /// Replaying a step during regrade failed; the prior history is untouched.
    #[error("regrade of slot {slot} failed at step {step}: {source}")]
    Regrade {
        slot: usize,
        step: usize,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Returns `true` for faults that point at a damaged step log rather
    /// than at a caller mistake.
    pub fn is_corruption(&self) -> bool {
        match self {
            EngineError::MissingVariable { .. } => true,
            EngineError::Regrade { source, .. } => source.is_corruption(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regrade_error_reports_step_and_cause() {
        let err = EngineError::Regrade {
            slot: 3,
            step: 2,
            source: Box::new(EngineError::MissingVariable {
                name: "_order".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("slot 3"));
        assert!(msg.contains("step 2"));
        assert!(msg.contains("_order"));
        assert!(err.is_corruption());
    }

    #[test]
    fn finished_error_names_action() {
        let err = EngineError::Finished { action: "save" };
        assert_eq!(err.to_string(), "cannot save a finished question attempt");
        assert!(!err.is_corruption());
    }
}
