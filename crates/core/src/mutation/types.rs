/// Field-level patches and the write groups that carry them to the store.
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::document::{fields, timestamp, ReviewRecord};

/// Dotted path to a (possibly nested) document field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn field(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    pub fn nested(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }

    pub fn media_photos() -> Self {
        Self::nested(&[fields::MEDIA, fields::PHOTOS])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Set(Value),
    Unset,
    /// Resolved to the store's clock at commit time.
    ServerTimestamp,
}

/// Minimal set of field writes for one record. An empty patch means the
/// record is already canonical and no write is issued.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPatch {
    pub id: String,
    fields: BTreeMap<FieldPath, PatchValue>,
}

impl RecordPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, path: FieldPath, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(path, PatchValue::Set(value.into()));
        self
    }

    pub fn unset(&mut self, path: FieldPath) -> &mut Self {
        self.fields.insert(path, PatchValue::Unset);
        self
    }

    /// Stamp `updatedAt` with server time.
    pub fn touch(&mut self) -> &mut Self {
        self.fields
            .insert(FieldPath::field(fields::UPDATED_AT), PatchValue::ServerTimestamp);
        self
    }

    pub fn get(&self, path: &FieldPath) -> Option<&PatchValue> {
        self.fields.get(path)
    }

    /// Convenience lookup for top-level fields.
    pub fn get_field(&self, name: &str) -> Option<&PatchValue> {
        self.fields.get(&FieldPath::field(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &PatchValue)> {
        self.fields.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.fields.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Fold a later patch for the same record into this one.
    pub fn merge(&mut self, other: RecordPatch) {
        self.fields.extend(other.fields);
    }

    /// Drop every write that would leave the stored value unchanged.
    pub fn retain_changes(&mut self, record: &ReviewRecord) {
        self.fields.retain(|path, op| {
            let current = record.value_at(path.segments());
            match op {
                PatchValue::Set(value) => !current.is_some_and(|c| json_eq(c, value)),
                PatchValue::Unset => current.is_some(),
                PatchValue::ServerTimestamp => true,
            }
        });
    }

    /// Apply to a document body, creating (or replacing non-object)
    /// intermediate objects on nested paths.
    pub fn apply_to(&self, content: &mut Map<String, Value>, now: DateTime<Utc>) {
        for (path, op) in &self.fields {
            let Some((leaf, parents)) = path.segments().split_last() else {
                continue;
            };
            let create = !matches!(op, PatchValue::Unset);
            let Some(target) = parent_mut(content, parents, create) else {
                continue;
            };
            match op {
                PatchValue::Set(value) => {
                    target.insert(leaf.clone(), value.clone());
                }
                PatchValue::Unset => {
                    target.remove(leaf);
                }
                PatchValue::ServerTimestamp => {
                    target.insert(leaf.clone(), timestamp::encode(now));
                }
            }
        }
    }

    /// Wire shape used in logs and dry-run output.
    pub fn to_operations(&self) -> PatchOperations {
        let mut set = Map::new();
        let mut unset = Vec::new();
        let mut server_time = Vec::new();
        for (path, op) in &self.fields {
            match op {
                PatchValue::Set(value) => {
                    set.insert(path.to_string(), value.clone());
                }
                PatchValue::Unset => unset.push(path.to_string()),
                PatchValue::ServerTimestamp => server_time.push(path.to_string()),
            }
        }
        PatchOperations {
            set: (!set.is_empty()).then_some(set),
            unset: (!unset.is_empty()).then_some(unset),
            set_server_time: (!server_time.is_empty()).then_some(server_time),
        }
    }
}

fn parent_mut<'m>(
    content: &'m mut Map<String, Value>,
    parents: &[String],
    create: bool,
) -> Option<&'m mut Map<String, Value>> {
    let mut target = content;
    for segment in parents {
        if create && !target.get(segment).is_some_and(Value::is_object) {
            target.insert(segment.clone(), Value::Object(Map::new()));
        }
        target = target.get_mut(segment)?.as_object_mut()?;
    }
    Some(target)
}

/// JSON equality with numbers compared by value, so `2` matches `2.0`.
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| json_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_eq(v, other)))
        }
        _ => a == b,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOperations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unset: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_server_time: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMutation {
    pub id: String,
    #[serde(flatten)]
    pub operations: PatchOperations,
}

impl From<&RecordPatch> for PatchMutation {
    fn from(patch: &RecordPatch) -> Self {
        Self {
            id: patch.id.clone(),
            operations: patch.to_operations(),
        }
    }
}

/// Patches committed together, all or nothing.
#[derive(Debug, Clone)]
pub struct WriteGroup {
    pub transaction_id: Uuid,
    pub patches: Vec<RecordPatch>,
}

impl WriteGroup {
    pub fn new(patches: Vec<RecordPatch>) -> Self {
        Self {
            transaction_id: Uuid::new_v4(),
            patches,
        }
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn last_id(&self) -> Option<&str> {
        self.patches.last().map(|p| p.id.as_str())
    }
}

/// Result of a committed write group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    pub transaction_id: String,
    pub committed_at: DateTime<Utc>,
    pub document_ids: Vec<String>,
}
