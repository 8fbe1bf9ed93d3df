//! Schema-generation classification.
//!
//! The rules overlap (a record can have a string `createdAt` and a boolean
//! `isDeleted` at the same time), so they are kept as an ordered table and
//! the first match wins. Earlier rows are the less-migrated generations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::model::has_text;
use crate::document::ReviewRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaGeneration {
    Legacy,
    Transitional,
    Structured,
    Unknown,
}

impl SchemaGeneration {
    pub const ALL: [SchemaGeneration; 4] = [
        SchemaGeneration::Legacy,
        SchemaGeneration::Transitional,
        SchemaGeneration::Structured,
        SchemaGeneration::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaGeneration::Legacy => "legacy",
            SchemaGeneration::Transitional => "transitional",
            SchemaGeneration::Structured => "structured",
            SchemaGeneration::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SchemaGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Rule = (fn(&ReviewRecord) -> bool, SchemaGeneration);

pub const CLASSIFICATION_RULES: &[Rule] = &[
    (is_legacy, SchemaGeneration::Legacy),
    (is_transitional, SchemaGeneration::Transitional),
    (is_structured, SchemaGeneration::Structured),
];

pub fn classify(record: &ReviewRecord) -> SchemaGeneration {
    CLASSIFICATION_RULES
        .iter()
        .find(|(matches, _)| matches(record))
        .map(|&(_, generation)| generation)
        .unwrap_or(SchemaGeneration::Unknown)
}

fn is_legacy(record: &ReviewRecord) -> bool {
    let legacy_temporal = record
        .legacy_created_at()
        .is_some_and(|t| t.is_timestamp() || t.is_text());
    let string_created_at = record.created_at().is_some_and(|t| t.is_text());
    (legacy_temporal || string_created_at) && record.is_deleted().is_none()
}

fn is_transitional(record: &ReviewRecord) -> bool {
    has_text(record.dish_name()) && record.created_at().is_some_and(|t| t.is_text())
}

fn is_structured(record: &ReviewRecord) -> bool {
    record.created_at().is_some_and(|t| t.is_timestamp())
        && record.is_deleted().is_some()
        && (record.media_photos().is_some() || record.has_structured_object())
}
