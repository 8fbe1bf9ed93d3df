use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use review_lake_groq::Document;

use super::timestamp;

/// Field names of a review document, canonical and legacy.
pub mod fields {
    pub const USER_ID: &str = "userId";
    pub const RESTAURANT_ID: &str = "restaurantId";
    pub const USERNAME: &str = "username";
    pub const RESTAURANT_NAME: &str = "restaurantName";
    pub const CREATED_AT: &str = "createdAt";
    /// Creation time as written by the first-generation clients.
    pub const LEGACY_CREATED_AT: &str = "timestamp";
    pub const DISH: &str = "dish";
    pub const DISH_NAME: &str = "dishName";
    pub const IMAGES: &str = "images";
    pub const MEDIA: &str = "media";
    pub const PHOTOS: &str = "photos";
    pub const IS_DELETED: &str = "isDeleted";
    pub const CAPTION: &str = "caption";
    pub const SCHEMA_VERSION: &str = "schemaVersion";
    pub const NORMALIZE_ERROR: &str = "normalizeError";
    pub const UPDATED_AT: &str = "updatedAt";

    /// Nested objects that only the structured generation writes.
    pub const STRUCTURED_OBJECT_FIELDS: [&str; 4] = [MEDIA, "ratings", "location", "author"];
}

/// A temporal field as found on a record. Absent or null fields are `None`
/// at the accessor, so this only describes values that are present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Temporal<'a> {
    Timestamp(DateTime<Utc>),
    Text(&'a str),
    Other(&'a Value),
}

impl<'a> Temporal<'a> {
    fn from_value(value: &'a Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Temporal::Text(s)),
            other => Some(match timestamp::decode(other) {
                Some(at) => Temporal::Timestamp(at),
                None => Temporal::Other(other),
            }),
        }
    }

    /// The instant this value denotes, parsing strings when needed.
    pub fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            Temporal::Timestamp(at) => Some(*at),
            Temporal::Text(s) => timestamp::parse_date_string(s),
            Temporal::Other(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Temporal::Text(_))
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(self, Temporal::Timestamp(_))
    }
}

/// One document of the reviews collection.
///
/// Content is kept as the raw JSON object so unknown fields survive
/// untouched; every field the pipeline reasons about has a typed accessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl ReviewRecord {
    pub fn new(id: impl Into<String>, content: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }

    /// Build a record from a JSON object literal. Non-objects yield an
    /// empty record.
    pub fn from_json(id: impl Into<String>, content: Value) -> Self {
        let content = match content {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, content)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.str_field(fields::USER_ID)
    }

    pub fn restaurant_id(&self) -> Option<&str> {
        self.str_field(fields::RESTAURANT_ID)
    }

    pub fn username(&self) -> Option<&str> {
        self.str_field(fields::USERNAME)
    }

    pub fn restaurant_name(&self) -> Option<&str> {
        self.str_field(fields::RESTAURANT_NAME)
    }

    pub fn caption(&self) -> Option<&str> {
        self.str_field(fields::CAPTION)
    }

    pub fn dish(&self) -> Option<&str> {
        self.str_field(fields::DISH)
    }

    pub fn dish_name(&self) -> Option<&str> {
        self.str_field(fields::DISH_NAME)
    }

    pub fn normalize_error(&self) -> Option<&str> {
        self.str_field(fields::NORMALIZE_ERROR)
    }

    pub fn created_at(&self) -> Option<Temporal<'_>> {
        self.content
            .get(fields::CREATED_AT)
            .and_then(Temporal::from_value)
    }

    pub fn legacy_created_at(&self) -> Option<Temporal<'_>> {
        self.content
            .get(fields::LEGACY_CREATED_AT)
            .and_then(Temporal::from_value)
    }

    /// `Some` only when `isDeleted` is an actual boolean.
    pub fn is_deleted(&self) -> Option<bool> {
        self.content.get(fields::IS_DELETED).and_then(Value::as_bool)
    }

    pub fn images(&self) -> Option<&Vec<Value>> {
        self.content.get(fields::IMAGES).and_then(Value::as_array)
    }

    /// `media.photos`, when `media` is an object and `photos` a list.
    pub fn media_photos(&self) -> Option<&Vec<Value>> {
        self.content
            .get(fields::MEDIA)
            .and_then(Value::as_object)
            .and_then(|media| media.get(fields::PHOTOS))
            .and_then(Value::as_array)
    }

    pub fn schema_version(&self) -> Option<i64> {
        match self.content.get(fields::SCHEMA_VERSION)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            _ => None,
        }
    }

    pub fn has_structured_object(&self) -> bool {
        fields::STRUCTURED_OBJECT_FIELDS
            .iter()
            .any(|name| self.content.get(*name).is_some_and(Value::is_object))
    }

    pub fn has_photos(&self) -> bool {
        self.images().is_some_and(|images| !images.is_empty())
            || self.media_photos().is_some_and(|photos| !photos.is_empty())
    }

    /// Value at a nested path, used when comparing a patch with the stored
    /// state.
    pub fn value_at<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.content.get(first.as_ref())?, |value, key| {
                value.get(key.as_ref())
            })
    }
}

impl Document for ReviewRecord {
    fn document_id(&self) -> &str {
        &self.id
    }

    fn field(&self, path: &[String]) -> Option<&Value> {
        self.value_at(path)
    }
}

/// Trimmed, non-empty string content.
pub fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}
