//! Minimal field-level patches bringing a record to the canonical shape.

use serde_json::Value;
use tracing::trace;

use crate::document::model::has_text;
use crate::document::timestamp::{self, parse_date_string};
use crate::document::{fields, ReviewRecord, Temporal};
use crate::mutation::{FieldPath, RecordPatch};

use super::classify::SchemaGeneration;
use super::recovery::RecoveryDecision;

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// `normalizeError` written on quarantine.
pub const QUARANTINE_REASON: &str = "missing foreign key";

/// `normalizeError` written when `createdAt` is a string no known layout
/// accepts.
pub const INVALID_CREATED_AT: &str = "invalid createdAt string";

/// Plan the writes for one record.
///
/// Every rule proposes a value; proposals equal to the stored state are
/// dropped before `updatedAt` is added, so a canonical record yields an
/// empty patch.
pub fn plan(
    record: &ReviewRecord,
    generation: SchemaGeneration,
    decision: RecoveryDecision,
) -> RecordPatch {
    let mut patch = RecordPatch::new(record.id.clone());

    if decision.is_quarantine() {
        patch
            .set(FieldPath::field(fields::IS_DELETED), true)
            .set(FieldPath::field(fields::NORMALIZE_ERROR), QUARANTINE_REASON)
            .set(FieldPath::field(fields::SCHEMA_VERSION), CURRENT_SCHEMA_VERSION);
        return finish(patch, record, generation);
    }

    // A quarantine whose keys were fixed since is lifted. Deletions made by
    // users carry no marker and stay as they are.
    let stale_quarantine = matches!(decision, RecoveryDecision::NotNeeded)
        && record.normalize_error() == Some(QUARANTINE_REASON);
    if decision.reason().is_some() || stale_quarantine {
        patch
            .unset(FieldPath::field(fields::NORMALIZE_ERROR))
            .set(FieldPath::field(fields::IS_DELETED), false);
    }

    plan_created_at(record, &mut patch);

    if record.is_deleted().is_none() {
        patch.set(FieldPath::field(fields::IS_DELETED), false);
    }

    if !has_text(record.dish_name()) {
        if let Some(dish) = record.dish().filter(|d| has_text(Some(d))) {
            patch.set(FieldPath::field(fields::DISH_NAME), dish);
        }
    }

    if record.media_photos().is_none() {
        patch.set(FieldPath::media_photos(), legacy_photos(record));
    }

    if record.schema_version() != Some(CURRENT_SCHEMA_VERSION) {
        patch.set(FieldPath::field(fields::SCHEMA_VERSION), CURRENT_SCHEMA_VERSION);
    }

    finish(patch, record, generation)
}

fn finish(mut patch: RecordPatch, record: &ReviewRecord, generation: SchemaGeneration) -> RecordPatch {
    patch.retain_changes(record);
    if !patch.is_empty() {
        patch.touch();
    }
    trace!(id = %record.id, %generation, writes = patch.len(), "planned record");
    patch
}

fn plan_created_at(record: &ReviewRecord, patch: &mut RecordPatch) {
    let resolved = match record.created_at() {
        Some(Temporal::Text(raw)) => match parse_date_string(raw) {
            Some(at) => {
                patch.set(FieldPath::field(fields::CREATED_AT), timestamp::encode(at));
                true
            }
            None => {
                patch.set(FieldPath::field(fields::NORMALIZE_ERROR), INVALID_CREATED_AT);
                false
            }
        },
        Some(Temporal::Timestamp(_)) => true,
        // Present but neither string nor timestamp: leave it alone.
        Some(Temporal::Other(_)) => false,
        None => match record.legacy_created_at().and_then(|t| t.resolve()) {
            Some(at) => {
                patch.set(FieldPath::field(fields::CREATED_AT), timestamp::encode(at));
                true
            }
            None => false,
        },
    };

    if resolved && record.normalize_error() == Some(INVALID_CREATED_AT) {
        patch.unset(FieldPath::field(fields::NORMALIZE_ERROR));
    }
}

/// Values that may hold photo URLs: the items of a list, or a lone
/// scalar. Objects and null hold none.
fn photo_values(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items.as_slice(),
        Some(Value::Object(_)) | Some(Value::Null) | None => &[],
        Some(scalar) => std::slice::from_ref(scalar),
    }
}

/// Photo list for a record without `media.photos`, drawn from legacy
/// `images` and from whatever non-list value sits where the list belongs:
/// a bare `media` value or a scalar `media.photos`. The list replaces
/// those values, so everything usable in them is carried over.
fn legacy_photos(record: &ReviewRecord) -> Value {
    let media = record.content.get(fields::MEDIA);
    let displaced = match media {
        Some(Value::Object(media)) => photo_values(media.get(fields::PHOTOS)),
        other => photo_values(other),
    };
    let photos = photo_values(record.content.get(fields::IMAGES))
        .iter()
        .chain(displaced)
        .filter_map(|image| match image {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .filter(|s| !s.trim().is_empty())
        .map(Value::String)
        .collect();
    Value::Array(photos)
}
