//! Bounded, atomic write groups.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::ReviewRecord;
use crate::mutation::{render_patch_diff, PatchMutation, RecordPatch, WriteGroup};
use crate::store::{DocumentStore, StoreResult};

/// Largest write group the document database accepts atomically.
pub const MAX_BATCH_SIZE: usize = 400;
pub const DEFAULT_BATCH_SIZE: usize = MAX_BATCH_SIZE;

pub fn clamp_batch_size(requested: usize) -> usize {
    requested.clamp(1, MAX_BATCH_SIZE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushSummary {
    pub transaction_id: Uuid,
    pub records: usize,
    /// Highest record ID in the group.
    pub last_id: Option<String>,
    /// `false` for dry-run flushes.
    pub committed: bool,
}

/// Buffers patches and writes them in groups of at most `ceiling` records.
///
/// In dry-run mode patches are logged instead of committed; flushing only
/// clears the buffer.
pub struct BatchWriter<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    ceiling: usize,
    dry_run: bool,
    pending: BTreeMap<String, RecordPatch>,
    groups: usize,
}

impl<'s, S: DocumentStore + ?Sized> BatchWriter<'s, S> {
    pub fn new(store: &'s S, ceiling: usize, dry_run: bool) -> Self {
        Self {
            store,
            ceiling: clamp_batch_size(ceiling),
            dry_run,
            pending: BTreeMap::new(),
            groups: 0,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of groups flushed so far.
    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.ceiling
    }

    /// Buffer a patch without flushing. Returns `true` once the group has
    /// reached the ceiling. Empty patches are ignored.
    pub fn buffer(&mut self, record: &ReviewRecord, patch: RecordPatch) -> bool {
        if patch.is_empty() {
            return self.is_full();
        }
        if self.dry_run {
            let mutation = serde_json::to_string(&PatchMutation::from(&patch)).unwrap_or_default();
            info!(id = %patch.id, patch = %mutation, "dry run: would patch");
            debug!(id = %patch.id, "planned change\n{}", render_patch_diff(record, &patch, Utc::now()));
        }

        match self.pending.get_mut(&patch.id) {
            Some(existing) => existing.merge(patch),
            None => {
                self.pending.insert(patch.id.clone(), patch);
            }
        }
        self.is_full()
    }

    /// Buffer a patch, flushing when the group is full.
    pub async fn push(
        &mut self,
        record: &ReviewRecord,
        patch: RecordPatch,
    ) -> StoreResult<Option<FlushSummary>> {
        if self.buffer(record, patch) {
            self.flush().await
        } else {
            Ok(None)
        }
    }

    /// Write every buffered patch as one group. On failure the buffer is
    /// kept intact.
    pub async fn flush(&mut self) -> StoreResult<Option<FlushSummary>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let group = WriteGroup::new(self.pending.values().cloned().collect());
        let summary = FlushSummary {
            transaction_id: group.transaction_id,
            records: group.len(),
            last_id: group.last_id().map(str::to_string),
            committed: !self.dry_run,
        };

        if self.dry_run {
            info!(
                transaction_id = %summary.transaction_id,
                records = summary.records,
                "dry run: skipping commit"
            );
        } else {
            let receipt = self.store.commit_group(&group).await?;
            info!(
                transaction_id = %receipt.transaction_id,
                records = receipt.document_ids.len(),
                last_id = ?summary.last_id,
                "committed write group"
            );
        }

        self.pending.clear();
        self.groups += 1;
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::FieldPath;
    use crate::store::{MemoryDocumentStore, StoreError};
    use serde_json::json;

    fn store(n: usize) -> MemoryDocumentStore {
        MemoryDocumentStore::from_records(
            (0..n).map(|i| ReviewRecord::from_json(format!("r{i}"), json!({}))),
        )
    }

    fn record_and_patch(id: &str, deleted: bool) -> (ReviewRecord, RecordPatch) {
        let mut patch = RecordPatch::new(id);
        patch.set(FieldPath::field("isDeleted"), deleted).touch();
        (ReviewRecord::from_json(id, json!({})), patch)
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(clamp_batch_size(0), 1);
        assert_eq!(clamp_batch_size(1000), 400);
        assert_eq!(clamp_batch_size(50), 50);
    }

    #[tokio::test]
    async fn flushes_at_ceiling() {
        let store = store(5);
        let mut writer = BatchWriter::new(&store, 2, false);
        let (r0, p0) = record_and_patch("r0", false);
        assert_eq!(writer.push(&r0, p0).await.unwrap(), None);
        let (r1, p1) = record_and_patch("r1", false);
        let summary = writer.push(&r1, p1).await.unwrap().unwrap();
        assert!(summary.committed);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.last_id.as_deref(), Some("r1"));
        assert!(writer.is_empty());
        assert_eq!(store.receipts().len(), 1);
        assert_eq!(store.get("r1").unwrap().is_deleted(), Some(false));
    }

    #[tokio::test]
    async fn same_record_is_merged() {
        let store = store(1);
        let mut writer = BatchWriter::new(&store, 10, false);
        let (r0, first) = record_and_patch("r0", false);
        let (_, second) = record_and_patch("r0", true);
        writer.push(&r0, first).await.unwrap();
        writer.push(&r0, second).await.unwrap();
        assert_eq!(writer.pending(), 1);
        writer.flush().await.unwrap();
        assert_eq!(store.get("r0").unwrap().is_deleted(), Some(true));
    }

    #[tokio::test]
    async fn empty_patches_and_empty_flushes_are_noops() {
        let store = store(1);
        let mut writer = BatchWriter::new(&store, 1, false);
        let record = ReviewRecord::from_json("r0", json!({}));
        assert_eq!(writer.push(&record, RecordPatch::new("r0")).await.unwrap(), None);
        assert_eq!(writer.flush().await.unwrap(), None);
        assert!(store.receipts().is_empty());
    }

    #[tokio::test]
    async fn dry_run_never_commits() {
        let store = store(3);
        let mut writer = BatchWriter::new(&store, 2, true);
        for id in ["r0", "r1", "r2"] {
            let (record, patch) = record_and_patch(id, false);
            writer.push(&record, patch).await.unwrap();
        }
        let summary = writer.flush().await.unwrap().unwrap();
        assert!(!summary.committed);
        assert_eq!(writer.groups(), 2);
        assert!(store.receipts().is_empty());
        assert_eq!(store.get("r0").unwrap().is_deleted(), None);
    }

    #[tokio::test]
    async fn failed_commit_keeps_buffer() {
        let store = store(2);
        store.fail_commit_call(1);
        let mut writer = BatchWriter::new(&store, 5, false);
        let (r0, p0) = record_and_patch("r0", false);
        writer.push(&r0, p0).await.unwrap();
        let err = writer.flush().await.unwrap_err();
        assert!(matches!(err, StoreError::CommitRejected { .. }));
        assert_eq!(writer.pending(), 1);
    }
}
