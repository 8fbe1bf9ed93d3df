//! Heuristic recovery for records with broken foreign keys.

use std::fmt;

use serde::Serialize;

use crate::document::model::has_text;
use crate::document::{has_valid_foreign_keys, ReviewRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryReason {
    /// Both `username` and `restaurantName` are present.
    HumanReadableFallback,
    /// The record carries photos or a caption.
    ValidContent,
}

impl RecoveryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryReason::HumanReadableFallback => "human-readable fallback present",
            RecoveryReason::ValidContent => "valid content present",
        }
    }
}

impl fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "decision", content = "reason")]
pub enum RecoveryDecision {
    /// Foreign keys are valid; the evaluator did not run.
    NotNeeded,
    Recover(RecoveryReason),
    Quarantine,
}

impl RecoveryDecision {
    pub fn is_quarantine(&self) -> bool {
        matches!(self, RecoveryDecision::Quarantine)
    }

    pub fn reason(&self) -> Option<RecoveryReason> {
        match self {
            RecoveryDecision::Recover(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Decide the fate of a record whose foreign keys failed validation.
pub fn evaluate(record: &ReviewRecord) -> RecoveryDecision {
    if has_text(record.username()) && has_text(record.restaurant_name()) {
        return RecoveryDecision::Recover(RecoveryReason::HumanReadableFallback);
    }
    if record.has_photos() || has_text(record.caption()) {
        return RecoveryDecision::Recover(RecoveryReason::ValidContent);
    }
    RecoveryDecision::Quarantine
}

/// Validate foreign keys and only fall through to [`evaluate`] when they
/// fail.
pub fn assess(record: &ReviewRecord) -> RecoveryDecision {
    if has_valid_foreign_keys(record) {
        RecoveryDecision::NotNeeded
    } else {
        evaluate(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assess_json(content: serde_json::Value) -> RecoveryDecision {
        assess(&ReviewRecord::from_json("r1", content))
    }

    #[test]
    fn valid_keys_skip_evaluation() {
        // Would quarantine if evaluated.
        assert_eq!(
            assess_json(json!({"userId": "u1", "restaurantId": "r1"})),
            RecoveryDecision::NotNeeded
        );
        assert_eq!(
            assess_json(json!({"userId": "u1", "restaurantId": "ChIJN1t_tDeuEmsRUsoyG83frY4"})),
            RecoveryDecision::NotNeeded
        );
    }

    #[test]
    fn identity_fallback_takes_precedence() {
        let decision = assess_json(json!({
            "username": "ana",
            "restaurantName": "Pho 24",
            "caption": "great",
        }));
        assert_eq!(
            decision,
            RecoveryDecision::Recover(RecoveryReason::HumanReadableFallback)
        );
        assert_eq!(
            decision.reason().map(|r| r.as_str()),
            Some("human-readable fallback present")
        );
    }

    #[test]
    fn content_recovers_without_identity() {
        for content in [
            json!({"caption": "amazing"}),
            json!({"images": ["x.jpg"]}),
            json!({"media": {"photos": ["y.jpg"]}}),
            json!({"username": "ana", "caption": "ok"}),
        ] {
            assert_eq!(
                assess_json(content),
                RecoveryDecision::Recover(RecoveryReason::ValidContent)
            );
        }
    }

    #[test]
    fn blank_signals_quarantine() {
        for content in [
            json!({"userId": "u1"}),
            json!({"caption": "   ", "images": []}),
            json!({"username": "ana", "restaurantName": ""}),
            json!({"userId": "u1", "restaurantId": "   "}),
        ] {
            assert!(assess_json(content).is_quarantine());
        }
    }
}
