// Before/after rendering of a planned patch for dry-run output.

use chrono::{DateTime, Utc};
use serde_json::Value;
use similar::TextDiff;

use super::types::RecordPatch;
use crate::document::ReviewRecord;

/// Unified diff of the record's pretty-printed JSON before and after the
/// patch is applied at `now`.
pub fn render_patch_diff(record: &ReviewRecord, patch: &RecordPatch, now: DateTime<Utc>) -> String {
    let before = Value::Object(record.content.clone());
    let mut after_content = record.content.clone();
    patch.apply_to(&mut after_content, now);
    let after = Value::Object(after_content);

    let before = serde_json::to_string_pretty(&before).unwrap_or_default();
    let after = serde_json::to_string_pretty(&after).unwrap_or_default();
    TextDiff::from_lines(&before, &after)
        .unified_diff()
        .context_radius(1)
        .header(&format!("{} (stored)", record.id), &format!("{} (planned)", record.id))
        .to_string()
}
