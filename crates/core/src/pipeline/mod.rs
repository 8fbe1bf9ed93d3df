//! Pure per-record stages: classify, decide on recovery, plan the patch.

pub mod classify;
pub mod planner;
pub mod recovery;

pub use classify::{classify, SchemaGeneration, CLASSIFICATION_RULES};
pub use planner::{plan, CURRENT_SCHEMA_VERSION, INVALID_CREATED_AT, QUARANTINE_REASON};
pub use recovery::{assess, evaluate, RecoveryDecision, RecoveryReason};
