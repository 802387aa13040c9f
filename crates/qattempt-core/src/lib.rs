//! qattempt-core — Question attempts, behaviours and regrading.
//!
//! This crate defines the step log, the question-type contract, the
//! behaviours that drive an attempt through its states, usages that group
//! attempts, and the async engine that persists them.

pub mod attempt;
pub mod behaviour;
pub mod display;
pub mod engine;
pub mod error;
pub mod parser;
pub mod question;
pub mod state;
pub mod step;
pub mod traits;
pub mod usage;
