use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::replay::{FeedShape, Visibility};
use super::stats::CensusStats;
use super::{CensusMode, Recommendation, PURGE_THRESHOLD_PERCENT};
use crate::pipeline::{RecoveryDecision, SchemaGeneration};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupMatch {
    pub id: String,
    pub generation: SchemaGeneration,
    pub recovery: RecoveryDecision,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub filter: String,
    pub matches: Vec<LookupMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplaySource {
    Example,
    Lookup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEntry {
    pub id: String,
    pub generation: SchemaGeneration,
    pub source: ReplaySource,
    pub feeds: BTreeMap<FeedShape, Visibility>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CensusReport {
    pub mode: CensusMode,
    pub limit: usize,
    pub feed_window: usize,
    pub stats: CensusStats,
    pub lookups: Vec<LookupResult>,
    pub replay: Vec<ReplayEntry>,
    pub legacy_percent: f64,
    pub recommendation: Recommendation,
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn describe_recovery(decision: &RecoveryDecision) -> String {
    match decision {
        RecoveryDecision::NotNeeded => "valid keys".to_string(),
        RecoveryDecision::Recover(reason) => format!("recoverable ({reason})"),
        RecoveryDecision::Quarantine => "would quarantine".to_string(),
    }
}

impl fmt::Display for CensusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats;
        match self.mode {
            CensusMode::Sample => writeln!(
                f,
                "Review census: {} records sampled (limit {})",
                stats.sampled, self.limit
            )?,
            CensusMode::Targeted => writeln!(
                f,
                "Review census: {} records matched by targeted lookup (no scan)",
                stats.sampled
            )?,
        }

        writeln!(f, "\nSchema generations")?;
        for (generation, label) in &stats.labels {
            writeln!(
                f,
                "  {:<13} {:>7} {:>6.1}%   string createdAt {:>6}   missing isDeleted {:>6}",
                generation.as_str(),
                label.count,
                percent(label.count, stats.sampled),
                label.string_created_at,
                label.missing_is_deleted,
            )?;
        }
        for (generation, label) in &stats.labels {
            if !label.examples.is_empty() {
                writeln!(f, "  examples {}: {}", generation, label.examples.join(", "))?;
            }
        }

        let created = &stats.created_at;
        writeln!(f, "\ncreatedAt types")?;
        writeln!(
            f,
            "  timestamp {}   string {}   missing {}   other {}",
            created.timestamp, created.string, created.missing, created.other
        )?;

        let missing = &stats.missing_keys;
        writeln!(f, "\nMissing foreign keys")?;
        writeln!(
            f,
            "  userId {}   restaurantId {}   both {}",
            missing.user_id, missing.restaurant_id, missing.both
        )?;

        let presence = &stats.presence;
        writeln!(f, "\nField presence")?;
        writeln!(
            f,
            "  userId {}   restaurantId {} (place IDs {})   username {}   restaurantName {}   both names {}",
            presence.user_id,
            presence.restaurant_id,
            presence.place_restaurant_id,
            presence.username,
            presence.restaurant_name,
            presence.secondary_identifiers,
        )?;

        let recovery = &stats.recovery;
        writeln!(f, "\nRecovery outlook")?;
        writeln!(
            f,
            "  valid keys {}   recoverable by identity {}   recoverable by content {}   quarantine {}",
            recovery.valid_keys,
            recovery.recoverable_by_identity,
            recovery.recoverable_by_content,
            recovery.quarantine,
        )?;

        if !self.lookups.is_empty() {
            writeln!(f, "\nTargeted lookups")?;
            for lookup in &self.lookups {
                writeln!(f, "  {}: {} match(es)", lookup.filter, lookup.matches.len())?;
                for found in &lookup.matches {
                    writeln!(
                        f,
                        "    {}  {}  {}",
                        found.id,
                        found.generation,
                        describe_recovery(&found.recovery)
                    )?;
                }
            }
        }

        if !self.replay.is_empty() {
            writeln!(f, "\nFeed replay (window {})", self.feed_window)?;
            for entry in &self.replay {
                write!(f, "  {}  [{}]", entry.id, entry.generation)?;
                for (shape, visibility) in &entry.feeds {
                    write!(f, "  {shape}: {visibility}")?;
                }
                writeln!(f)?;
            }
        }

        let verdict = match self.recommendation {
            Recommendation::Migrate => "MIGRATE",
            Recommendation::Purge => "PURGE",
        };
        let comparison = match self.recommendation {
            Recommendation::Migrate => "<=",
            Recommendation::Purge => ">",
        };
        writeln!(
            f,
            "\nRecommendation: {verdict} (legacy {:.1}% {comparison} {:.0}%)",
            self.legacy_percent, PURGE_THRESHOLD_PERCENT
        )
    }
}
