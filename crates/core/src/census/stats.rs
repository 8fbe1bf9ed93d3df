//! Aggregate statistics over a sample of review documents.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::document::model::has_text;
use crate::document::validate::{has_valid_restaurant_id, has_valid_user_id};
use crate::document::{ReviewRecord, RestaurantRef, Temporal};
use crate::pipeline::{assess, classify, RecoveryDecision, RecoveryReason, SchemaGeneration};

pub const DEFAULT_EXAMPLES_PER_LABEL: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelStats {
    pub count: u64,
    pub string_created_at: u64,
    pub missing_is_deleted: u64,
    pub examples: Vec<String>,
}

/// Type of `createdAt` across the sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAtHistogram {
    pub timestamp: u64,
    pub string: u64,
    pub missing: u64,
    pub other: u64,
}

/// Records lacking a valid foreign key. `both` records are also counted in
/// each single-key total.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingKeys {
    pub user_id: u64,
    pub restaurant_id: u64,
    pub both: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPresence {
    pub user_id: u64,
    pub restaurant_id: u64,
    /// `restaurantId` holding an external place identifier.
    pub place_restaurant_id: u64,
    pub username: u64,
    pub restaurant_name: u64,
    /// Both `username` and `restaurantName`.
    pub secondary_identifiers: u64,
}

/// What a migration run would decide for the sampled records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryCensus {
    pub valid_keys: u64,
    pub recoverable_by_identity: u64,
    pub recoverable_by_content: u64,
    pub quarantine: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CensusStats {
    pub sampled: u64,
    pub labels: BTreeMap<SchemaGeneration, LabelStats>,
    pub created_at: CreatedAtHistogram,
    pub missing_keys: MissingKeys,
    pub presence: FieldPresence,
    pub recovery: RecoveryCensus,
    #[serde(skip)]
    examples_per_label: usize,
}

impl CensusStats {
    pub fn new(examples_per_label: usize) -> Self {
        Self {
            sampled: 0,
            labels: SchemaGeneration::ALL
                .iter()
                .map(|&generation| (generation, LabelStats::default()))
                .collect(),
            created_at: CreatedAtHistogram::default(),
            missing_keys: MissingKeys::default(),
            presence: FieldPresence::default(),
            recovery: RecoveryCensus::default(),
            examples_per_label,
        }
    }

    /// Fold one record into the totals and return its label. Returns
    /// `true` in the second slot when the record was kept as an example.
    pub fn observe(&mut self, record: &ReviewRecord) -> (SchemaGeneration, bool) {
        let generation = classify(record);
        self.sampled += 1;

        let created_at = record.created_at();
        let label = self.labels.entry(generation).or_default();
        label.count += 1;
        if created_at.is_some_and(|t| t.is_text()) {
            label.string_created_at += 1;
        }
        if record.is_deleted().is_none() {
            label.missing_is_deleted += 1;
        }
        let example = label.examples.len() < self.examples_per_label;
        if example {
            label.examples.push(record.id.clone());
        }

        match created_at {
            Some(Temporal::Timestamp(_)) => self.created_at.timestamp += 1,
            Some(Temporal::Text(_)) => self.created_at.string += 1,
            Some(Temporal::Other(_)) => self.created_at.other += 1,
            None => self.created_at.missing += 1,
        }

        let (user_ok, restaurant_ok) = (has_valid_user_id(record), has_valid_restaurant_id(record));
        if !user_ok {
            self.missing_keys.user_id += 1;
        }
        if !restaurant_ok {
            self.missing_keys.restaurant_id += 1;
        }
        if !user_ok && !restaurant_ok {
            self.missing_keys.both += 1;
        }

        let presence = &mut self.presence;
        presence.user_id += u64::from(has_text(record.user_id()));
        presence.restaurant_id += u64::from(has_text(record.restaurant_id()));
        presence.place_restaurant_id += u64::from(
            record
                .restaurant_id()
                .is_some_and(|raw| RestaurantRef::parse(raw).is_place()),
        );
        let username = has_text(record.username());
        let restaurant_name = has_text(record.restaurant_name());
        presence.username += u64::from(username);
        presence.restaurant_name += u64::from(restaurant_name);
        presence.secondary_identifiers += u64::from(username && restaurant_name);

        match assess(record) {
            RecoveryDecision::NotNeeded => self.recovery.valid_keys += 1,
            RecoveryDecision::Recover(RecoveryReason::HumanReadableFallback) => {
                self.recovery.recoverable_by_identity += 1
            }
            RecoveryDecision::Recover(RecoveryReason::ValidContent) => {
                self.recovery.recoverable_by_content += 1
            }
            RecoveryDecision::Quarantine => self.recovery.quarantine += 1,
        }

        (generation, example)
    }

    pub fn label(&self, generation: SchemaGeneration) -> Option<&LabelStats> {
        self.labels.get(&generation)
    }

    pub fn count(&self, generation: SchemaGeneration) -> u64 {
        self.label(generation).map_or(0, |l| l.count)
    }

    /// Share of Legacy records in the sample, 0 when nothing was sampled.
    pub fn legacy_percent(&self) -> f64 {
        if self.sampled == 0 {
            return 0.0;
        }
        self.count(SchemaGeneration::Legacy) as f64 * 100.0 / self.sampled as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observe_all(records: &[serde_json::Value], examples: usize) -> CensusStats {
        let mut stats = CensusStats::new(examples);
        for (i, content) in records.iter().enumerate() {
            stats.observe(&ReviewRecord::from_json(format!("r{i}"), content.clone()));
        }
        stats
    }

    #[test]
    fn counts_labels_and_breakdowns() {
        let stats = observe_all(
            &[
                json!({"createdAt": "2024-01-01", "userId": "u1"}),
                json!({"timestamp": "2024-01-01"}),
                json!({"createdAt": "2024-01-01", "dishName": "Pho", "isDeleted": false}),
                json!({"createdAt": {"_seconds": 1, "_nanoseconds": 0}, "isDeleted": false, "media": {"photos": []}}),
                json!({"createdAt": 17}),
            ],
            1,
        );
        assert_eq!(stats.sampled, 5);
        let legacy = stats.label(SchemaGeneration::Legacy).unwrap();
        assert_eq!(legacy.count, 2);
        assert_eq!(legacy.string_created_at, 1);
        assert_eq!(legacy.missing_is_deleted, 2);
        assert_eq!(legacy.examples, vec!["r0"]);
        assert_eq!(stats.count(SchemaGeneration::Transitional), 1);
        assert_eq!(stats.count(SchemaGeneration::Structured), 1);
        assert_eq!(stats.count(SchemaGeneration::Unknown), 1);
        assert_eq!(
            stats.created_at,
            CreatedAtHistogram { timestamp: 1, string: 2, missing: 1, other: 1 }
        );
        assert!((stats.legacy_percent() - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn counts_keys_presence_and_recovery() {
        let stats = observe_all(
            &[
                json!({"userId": "u1", "restaurantId": "ChIJN1t_tDeuEmsRUsoyG83frY4"}),
                json!({"userId": "u1"}),
                json!({"username": "ana", "restaurantName": "Pho 24"}),
                json!({"caption": "tasty"}),
            ],
            5,
        );
        assert_eq!(stats.missing_keys, MissingKeys { user_id: 2, restaurant_id: 3, both: 2 });
        assert_eq!(stats.presence.user_id, 2);
        assert_eq!(stats.presence.place_restaurant_id, 1);
        assert_eq!(stats.presence.secondary_identifiers, 1);
        assert_eq!(
            stats.recovery,
            RecoveryCensus {
                valid_keys: 1,
                recoverable_by_identity: 1,
                recoverable_by_content: 1,
                quarantine: 1,
            }
        );
    }

    #[test]
    fn empty_sample_has_zero_legacy_share() {
        assert_eq!(CensusStats::new(5).legacy_percent(), 0.0);
    }
}
