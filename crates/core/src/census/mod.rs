//! Read-only census of the reviews collection: generation counts, field
//! health, targeted lookups and feed visibility, ending in a
//! migrate-or-purge recommendation.

pub mod replay;
pub mod report;
pub mod stats;

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use review_lake_groq::{parse_filter, EvalError, Expr, ParseError};

use crate::document::ReviewRecord;
use crate::pipeline::{assess, classify};
use crate::scan::{Scanner, DEFAULT_PAGE_SIZE};
use crate::store::{DocumentStore, StoreError};

pub use replay::{FeedReplay, FeedShape, Visibility, DEFAULT_FEED_WINDOW};
pub use report::{CensusReport, LookupMatch, LookupResult, ReplayEntry, ReplaySource};
pub use stats::{CensusStats, LabelStats, DEFAULT_EXAMPLES_PER_LABEL};

pub const DEFAULT_SAMPLE_LIMIT: usize = 2000;
pub const MAX_SAMPLE_LIMIT: usize = 20_000;

/// Legacy share above which purging beats migrating.
pub const PURGE_THRESHOLD_PERCENT: f64 = 20.0;

pub fn clamp_sample_limit(requested: usize) -> usize {
    requested.clamp(1, MAX_SAMPLE_LIMIT)
}

#[derive(Debug, thiserror::Error)]
pub enum CensusError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid lookup filter {filter:?}: {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: ParseError,
    },

    #[error("invalid feed query: {0}")]
    FeedQuery(#[from] ParseError),

    #[error("query error: {0}")]
    Query(#[from] EvalError),
}

/// A targeted lookup filter, parsed up front so bad input fails before any
/// I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub filter: String,
    pub expr: Expr,
}

impl Lookup {
    pub fn parse(filter: &str) -> Result<Self, CensusError> {
        let expr = parse_filter(filter).map_err(|source| CensusError::InvalidFilter {
            filter: filter.to_string(),
            source,
        })?;
        Ok(Self {
            filter: filter.to_string(),
            expr,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Recommendation {
    Migrate,
    Purge,
}

pub fn recommend(legacy_percent: f64) -> Recommendation {
    if legacy_percent <= PURGE_THRESHOLD_PERCENT {
        Recommendation::Migrate
    } else {
        Recommendation::Purge
    }
}

/// Whether the report covers a scanned sample or only the records that
/// targeted lookups matched. Lookups skip the scan entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CensusMode {
    Sample,
    Targeted,
}

#[derive(Debug, Clone)]
pub struct CensusConfig {
    pub limit: usize,
    pub examples_per_label: usize,
    pub page_size: usize,
    pub lookups: Vec<Lookup>,
    pub feed_window: usize,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SAMPLE_LIMIT,
            examples_per_label: DEFAULT_EXAMPLES_PER_LABEL,
            page_size: DEFAULT_PAGE_SIZE,
            lookups: Vec::new(),
            feed_window: DEFAULT_FEED_WINDOW,
        }
    }
}

pub async fn run_census<S: DocumentStore + ?Sized>(
    store: &S,
    config: &CensusConfig,
) -> Result<CensusReport, CensusError> {
    let limit = clamp_sample_limit(config.limit);
    info!(limit, lookups = config.lookups.len(), "starting census");

    let mode = if config.lookups.is_empty() {
        CensusMode::Sample
    } else {
        CensusMode::Targeted
    };
    let mut stats = CensusStats::new(config.examples_per_label);
    let mut targets: Vec<(ReviewRecord, ReplaySource)> = Vec::new();

    if mode == CensusMode::Sample {
        let mut scanner = Scanner::new(store, config.page_size.min(limit), None);
        'scan: while let Some(page) = scanner.next_page().await? {
            for record in page {
                if stats.sampled >= limit as u64 {
                    break 'scan;
                }
                let (_, example) = stats.observe(&record);
                if example {
                    targets.push((record, ReplaySource::Example));
                }
            }
            if stats.sampled >= limit as u64 {
                break;
            }
        }
        debug!(sampled = stats.sampled, pages = scanner.pages(), "sample complete");
    }

    let mut lookups = Vec::with_capacity(config.lookups.len());
    let mut matched = BTreeSet::new();
    for lookup in &config.lookups {
        let found = store.find(&lookup.expr, limit).await?;
        info!(filter = %lookup.filter, matches = found.len(), "lookup");
        let matches = found
            .iter()
            .map(|record| LookupMatch {
                id: record.id.clone(),
                generation: classify(record),
                recovery: assess(record),
            })
            .collect();
        lookups.push(LookupResult {
            filter: lookup.filter.clone(),
            matches,
        });
        for record in &found {
            if matched.insert(record.id.clone()) {
                stats.observe(record);
            }
        }
        targets.extend(found.into_iter().map(|record| (record, ReplaySource::Lookup)));
    }

    let mut replay = FeedReplay::new(store, config.feed_window)?;
    let mut seen = BTreeSet::new();
    let mut entries = Vec::new();
    for (record, source) in &targets {
        if !seen.insert(record.id.clone()) {
            continue;
        }
        entries.push(ReplayEntry {
            id: record.id.clone(),
            generation: classify(record),
            source: *source,
            feeds: replay.check(record).await?,
        });
    }

    let legacy_percent = stats.legacy_percent();
    let recommendation = recommend(legacy_percent);
    info!(
        sampled = stats.sampled,
        legacy_percent,
        recommendation = ?recommendation,
        "census complete"
    );
    Ok(CensusReport {
        mode,
        limit,
        feed_window: replay.window(),
        stats,
        lookups,
        replay: entries,
        legacy_percent,
        recommendation,
    })
}
