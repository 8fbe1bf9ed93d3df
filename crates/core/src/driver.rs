//! The migration run: scan, classify, recover, plan, buffer, flush.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::{validate_foreign_keys, ReviewRecord};
use crate::mutation::RecordPatch;
use crate::pipeline::{classify, evaluate, plan, RecoveryDecision, SchemaGeneration};
use crate::scan::{clamp_page_size, Scanner, DEFAULT_PAGE_SIZE};
use crate::store::{DocumentStore, StoreError};
use crate::writer::{clamp_batch_size, BatchWriter, FlushSummary, DEFAULT_BATCH_SIZE};

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    DryRun,
    Commit,
}

impl RunMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, RunMode::DryRun)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::DryRun => "dry-run",
            RunMode::Commit => "commit",
        })
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub mode: RunMode,
    pub page_size: usize,
    pub batch_size: usize,
    /// Resume after this document ID.
    pub start_after: Option<String>,
    /// Records between progress log lines.
    pub progress_interval: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::DryRun,
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            start_after: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Scanning,
    Classifying,
    Recovering,
    Planning,
    Buffering,
    Flushing,
    Draining,
    Done,
}

/// How a processed record was accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordOutcome {
    Changed,
    Skipped,
    Quarantined,
}

/// Counters and cursors of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub processed: u64,
    pub changed: u64,
    pub skipped: u64,
    pub quarantined: u64,
    pub recovered: u64,
    pub by_generation: BTreeMap<SchemaGeneration, u64>,
    /// Last record observed.
    pub cursor: Option<String>,
    /// Last record with nothing left in the write buffer at or before it.
    pub committed_cursor: Option<String>,
    pub groups: usize,
    #[serde(skip)]
    pub phase: Phase,
}

impl RunState {
    fn starting_at(start_after: Option<String>) -> Self {
        Self {
            cursor: start_after.clone(),
            committed_cursor: start_after,
            ..Self::default()
        }
    }

    fn count(&mut self, generation: SchemaGeneration, outcome: RecordOutcome) {
        self.processed += 1;
        *self.by_generation.entry(generation).or_default() += 1;
        match outcome {
            RecordOutcome::Changed => self.changed += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Quarantined => self.quarantined += 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("migration aborted after {} records (resume cursor: {}): {source}",
    .state.processed,
    .resume_cursor.as_deref().unwrap_or("<start>"))]
pub struct RunError {
    /// Pass back as `--startAfter` to continue.
    pub resume_cursor: Option<String>,
    pub state: RunState,
    #[source]
    pub source: StoreError,
}

/// Everything decided about one record before it reaches the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecord {
    pub generation: SchemaGeneration,
    pub decision: RecoveryDecision,
    pub outcome: RecordOutcome,
    pub patch: RecordPatch,
}

/// Classify, evaluate and plan one record. Pure.
pub fn process_record(record: &ReviewRecord) -> ProcessedRecord {
    let generation = classify(record);
    let decision = match validate_foreign_keys(record) {
        Ok(()) => RecoveryDecision::NotNeeded,
        Err(_) => evaluate(record),
    };
    let patch = plan(record, generation, decision);
    ProcessedRecord {
        generation,
        decision,
        outcome: outcome_of(decision, &patch),
        patch,
    }
}

fn outcome_of(decision: RecoveryDecision, patch: &RecordPatch) -> RecordOutcome {
    if decision.is_quarantine() {
        RecordOutcome::Quarantined
    } else if patch.is_empty() {
        RecordOutcome::Skipped
    } else {
        RecordOutcome::Changed
    }
}

pub struct Driver<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    config: DriverConfig,
    state: RunState,
}

impl<'s, S: DocumentStore + ?Sized> Driver<'s, S> {
    pub fn new(store: &'s S, config: DriverConfig) -> Self {
        let state = RunState::starting_at(config.start_after.clone());
        Self {
            store,
            config,
            state,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    fn transition(&mut self, phase: Phase) {
        if self.state.phase != phase {
            debug!(from = ?self.state.phase, to = ?phase, cursor = ?self.state.cursor, "phase");
            self.state.phase = phase;
        }
    }

    fn abort(self, source: StoreError) -> RunError {
        let resume_cursor = if self.config.mode.is_dry_run() {
            self.state.cursor.clone()
        } else {
            self.state.committed_cursor.clone()
        };
        warn!(error = %source, resume_cursor = ?resume_cursor, processed = self.state.processed, "run aborted");
        RunError {
            resume_cursor,
            state: self.state,
            source,
        }
    }

    fn flushed(&mut self, summary: FlushSummary) {
        self.state.groups += 1;
        debug!(transaction_id = %summary.transaction_id, records = summary.records, committed = summary.committed, "flushed");
    }

    fn plan_record(&mut self, record: &ReviewRecord) -> ProcessedRecord {
        self.transition(Phase::Classifying);
        let processed = process_record(record);

        match processed.decision {
            RecoveryDecision::NotNeeded => {}
            RecoveryDecision::Recover(reason) => {
                self.transition(Phase::Recovering);
                self.state.recovered += 1;
                info!(id = %record.id, generation = %processed.generation, %reason, "recovered record");
            }
            RecoveryDecision::Quarantine => {
                self.transition(Phase::Recovering);
                warn!(id = %record.id, generation = %processed.generation, "quarantining record");
            }
        }

        self.transition(Phase::Planning);
        processed
    }

    /// Run to completion. On a store failure the error carries the cursor
    /// to resume from and the counters reached so far.
    pub async fn run(mut self) -> Result<RunState, RunError> {
        let store = self.store;
        let mut scanner = Scanner::new(
            store,
            clamp_page_size(self.config.page_size),
            self.config.start_after.clone(),
        );
        let mut writer = BatchWriter::new(
            store,
            clamp_batch_size(self.config.batch_size),
            self.config.mode.is_dry_run(),
        );
        info!(
            mode = %self.config.mode,
            page_size = scanner.page_size(),
            batch_size = writer.ceiling(),
            start_after = ?self.config.start_after,
            "starting migration run"
        );

        loop {
            self.transition(Phase::Scanning);
            let page = match scanner.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(err) => return Err(self.abort(err)),
            };

            for record in page {
                let processed = self.plan_record(&record);
                self.state.count(processed.generation, processed.outcome);

                self.transition(Phase::Buffering);
                if writer.buffer(&record, processed.patch) {
                    self.transition(Phase::Flushing);
                    match writer.flush().await {
                        Ok(Some(summary)) => self.flushed(summary),
                        Ok(None) => {}
                        Err(err) => return Err(self.abort(err)),
                    }
                }

                if writer.is_empty() {
                    self.state.committed_cursor = Some(record.id.clone());
                }
                self.state.cursor = Some(record.id);

                if self.config.progress_interval > 0
                    && self.state.processed % self.config.progress_interval == 0
                {
                    info!(
                        processed = self.state.processed,
                        changed = self.state.changed,
                        skipped = self.state.skipped,
                        quarantined = self.state.quarantined,
                        cursor = ?self.state.cursor,
                        "progress"
                    );
                }
            }
        }

        self.transition(Phase::Draining);
        match writer.flush().await {
            Ok(Some(summary)) => self.flushed(summary),
            Ok(None) => {}
            Err(err) => return Err(self.abort(err)),
        }
        self.state.committed_cursor = self.state.cursor.clone();
        self.transition(Phase::Done);

        info!(
            mode = %self.config.mode,
            processed = self.state.processed,
            changed = self.state.changed,
            skipped = self.state.skipped,
            quarantined = self.state.quarantined,
            recovered = self.state.recovered,
            groups = self.state.groups,
            cursor = ?self.state.cursor,
            "migration complete"
        );
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use serde_json::json;

    #[test]
    fn process_record_accounts_each_outcome() {
        let quarantined = process_record(&ReviewRecord::from_json("q", json!({"userId": "u1"})));
        assert_eq!(quarantined.outcome, RecordOutcome::Quarantined);

        let changed = process_record(&ReviewRecord::from_json(
            "c",
            json!({"userId": "u1", "restaurantId": "r1", "createdAt": "2024-01-01"}),
        ));
        assert_eq!(changed.outcome, RecordOutcome::Changed);
        assert_eq!(changed.generation, SchemaGeneration::Legacy);

        let skipped = process_record(&ReviewRecord::from_json(
            "s",
            json!({
                "userId": "u1",
                "restaurantId": "r1",
                "schemaVersion": 2,
                "isDeleted": false,
                "createdAt": {"_seconds": 1, "_nanoseconds": 0},
                "media": {"photos": []},
            }),
        ));
        assert_eq!(skipped.outcome, RecordOutcome::Skipped);
        assert_eq!(skipped.generation, SchemaGeneration::Structured);
    }

    #[test]
    fn already_quarantined_record_still_counts_as_quarantined() {
        let processed = process_record(&ReviewRecord::from_json(
            "q",
            json!({
                "userId": "u1",
                "isDeleted": true,
                "normalizeError": "missing foreign key",
                "schemaVersion": 2,
            }),
        ));
        assert!(processed.patch.is_empty());
        assert_eq!(processed.outcome, RecordOutcome::Quarantined);
    }

    #[tokio::test]
    async fn run_lifts_quarantine_once_keys_are_fixed() {
        let store = MemoryDocumentStore::from_records([ReviewRecord::from_json(
            "r1",
            json!({
                "userId": "u1",
                "restaurantId": "r1",
                "isDeleted": true,
                "normalizeError": "missing foreign key",
                "schemaVersion": 2,
                "createdAt": {"_seconds": 1704067200, "_nanoseconds": 0},
                "media": {"photos": []},
            }),
        )]);
        let config = DriverConfig {
            mode: RunMode::Commit,
            ..DriverConfig::default()
        };
        let state = Driver::new(&store, config).run().await.unwrap();
        assert_eq!((state.changed, state.skipped, state.quarantined), (1, 0, 0));

        let record = store.get("r1").unwrap();
        assert_eq!(record.is_deleted(), Some(false));
        assert_eq!(record.normalize_error(), None);
    }

    #[tokio::test]
    async fn run_counts_recoveries_in_the_state() {
        let store = MemoryDocumentStore::from_records([
            ReviewRecord::from_json("a", json!({"username": "ana", "restaurantName": "Nori"})),
            ReviewRecord::from_json("b", json!({"caption": "great"})),
            ReviewRecord::from_json("c", json!({"dish": "Pho"})),
        ]);
        let state = Driver::new(&store, DriverConfig::default()).run().await.unwrap();
        assert_eq!(state.recovered, 2);
        assert_eq!(state.quarantined, 1);
        assert_eq!(state.phase, Phase::Done);
        assert!(store.receipts().is_empty());
    }

    #[test]
    fn run_error_message_names_the_cursor() {
        let err = RunError {
            resume_cursor: Some("r042".into()),
            state: RunState {
                processed: 42,
                ..RunState::default()
            },
            source: StoreError::Unavailable("connection reset".into()),
        };
        let message = err.to_string();
        assert!(message.contains("42 records"));
        assert!(message.contains("r042"));
        assert!(message.contains("connection reset"));
    }
}
