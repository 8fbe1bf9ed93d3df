//! Replays the application's feed queries to explain why a record is or is
//! not visible.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use review_lake_groq::{eval_filter, parse_query, Params, ParseError, Query};

use super::CensusError;
use crate::document::model::has_text;
use crate::document::{fields, ReviewRecord};
use crate::store::DocumentStore;

pub const DEFAULT_FEED_WINDOW: usize = 50;

/// The three read queries the application issues against reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedShape {
    Global,
    Restaurant,
    User,
}

impl FeedShape {
    pub const ALL: [FeedShape; 3] = [FeedShape::Global, FeedShape::Restaurant, FeedShape::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedShape::Global => "global",
            FeedShape::Restaurant => "restaurant",
            FeedShape::User => "user",
        }
    }

    pub fn query_text(&self) -> &'static str {
        match self {
            FeedShape::Global => "*[isDeleted == false] | order(createdAt desc)",
            FeedShape::Restaurant => {
                "*[restaurantId == $restaurantId && isDeleted == false] | order(createdAt desc)"
            }
            FeedShape::User => "*[userId == $userId && isDeleted == false] | order(createdAt desc)",
        }
    }

    /// Name of the parameter the feed is keyed on, if any.
    fn param_name(&self) -> Option<&'static str> {
        match self {
            FeedShape::Global => None,
            FeedShape::Restaurant => Some(fields::RESTAURANT_ID),
            FeedShape::User => Some(fields::USER_ID),
        }
    }
}

impl fmt::Display for FeedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum Visibility {
    /// Inside the window, at 0-based `rank`.
    Visible { rank: usize },
    /// `createdAt` absent or null, so the ordered query drops the record.
    MissingSortField,
    /// The feed filter rejects the record.
    FilteredOut,
    /// Matches the feed but ranks past the window.
    OutsideWindow,
    /// The record lacks the key this feed is scoped by.
    NotApplicable,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Visible { rank } => write!(f, "visible (#{})", rank + 1),
            Visibility::MissingSortField => f.write_str("missing createdAt"),
            Visibility::FilteredOut => f.write_str("filtered out"),
            Visibility::OutsideWindow => f.write_str("outside window"),
            Visibility::NotApplicable => f.write_str("n/a"),
        }
    }
}

/// Runs each feed at most once per parameter value and reuses the window.
pub struct FeedReplay<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    window: usize,
    queries: BTreeMap<FeedShape, Query>,
    windows: HashMap<(FeedShape, Option<String>), Vec<String>>,
}

impl<'s, S: DocumentStore + ?Sized> FeedReplay<'s, S> {
    pub fn new(store: &'s S, window: usize) -> Result<Self, ParseError> {
        let window = window.max(1);
        let queries = FeedShape::ALL
            .iter()
            .map(|&shape| -> Result<(FeedShape, Query), ParseError> {
                Ok((shape, parse_query(shape.query_text())?.with_window(0, window)))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Self {
            store,
            window,
            queries,
            windows: HashMap::new(),
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub async fn check(
        &mut self,
        record: &ReviewRecord,
    ) -> Result<BTreeMap<FeedShape, Visibility>, CensusError> {
        let mut results = BTreeMap::new();
        for shape in FeedShape::ALL {
            let visibility = self.check_shape(shape, record).await?;
            results.insert(shape, visibility);
        }
        Ok(results)
    }

    async fn check_shape(
        &mut self,
        shape: FeedShape,
        record: &ReviewRecord,
    ) -> Result<Visibility, CensusError> {
        let mut params = Params::new();
        let key = match shape.param_name() {
            Some(name) => {
                let Some(value) = record
                    .value_at(&[name])
                    .and_then(Value::as_str)
                    .filter(|v| has_text(Some(v)))
                else {
                    return Ok(Visibility::NotApplicable);
                };
                params.insert(name.to_string(), Value::String(value.to_string()));
                Some(value.to_string())
            }
            None => None,
        };

        let Some(query) = self.queries.get(&shape) else {
            return Ok(Visibility::NotApplicable);
        };
        if let Some(filter) = &query.filter {
            if !eval_filter(filter, record, &params)? {
                return Ok(Visibility::FilteredOut);
            }
        }
        if record
            .value_at(&[fields::CREATED_AT])
            .map_or(true, Value::is_null)
        {
            return Ok(Visibility::MissingSortField);
        }

        let cache_key = (shape, key);
        if !self.windows.contains_key(&cache_key) {
            let ids = self.store.feed(query, &params).await?;
            debug!(%shape, key = ?cache_key.1, results = ids.len(), "replayed feed");
            self.windows.insert(cache_key.clone(), ids);
        }
        let rank = self
            .windows
            .get(&cache_key)
            .and_then(|ids| ids.iter().position(|id| *id == record.id));
        Ok(match rank {
            Some(rank) => Visibility::Visible { rank },
            None => Visibility::OutsideWindow,
        })
    }
}
