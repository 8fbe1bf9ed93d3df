//! In-process document store backed by a `BTreeMap`, with failure
//! injection for exercising abort and resume paths.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;

use review_lake_groq::{eval_filter, execute, Expr, Params, Query};

use super::{DocumentStore, StoreError, StoreResult};
use crate::document::ReviewRecord;
use crate::mutation::{CommitReceipt, WriteGroup};

#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    documents: BTreeMap<String, Map<String, Value>>,
    receipts: Vec<CommitReceipt>,
    fetch_calls: usize,
    commit_calls: usize,
    /// 1-based call numbers that fail.
    failing_fetch: Option<usize>,
    failing_commit: Option<usize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = ReviewRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, record: ReviewRecord) {
        self.state().documents.insert(record.id, record.content);
    }

    pub fn get(&self, id: &str) -> Option<ReviewRecord> {
        self.state()
            .documents
            .get(id)
            .map(|content| ReviewRecord::new(id, content.clone()))
    }

    pub fn records(&self) -> Vec<ReviewRecord> {
        self.state()
            .documents
            .iter()
            .map(|(id, content)| ReviewRecord::new(id.clone(), content.clone()))
            .collect()
    }

    /// Receipts of every successful commit, oldest first.
    pub fn receipts(&self) -> Vec<CommitReceipt> {
        self.state().receipts.clone()
    }

    /// Make the `n`th `fetch_page` call (counting from 1) fail.
    pub fn fail_fetch_call(&self, n: usize) {
        self.state().failing_fetch = Some(n);
    }

    /// Make the `n`th `commit_group` call (counting from 1) fail.
    pub fn fail_commit_call(&self, n: usize) {
        self.state().failing_commit = Some(n);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch_page(
        &self,
        start_after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ReviewRecord>> {
        let mut state = self.state();
        state.fetch_calls += 1;
        if state.failing_fetch == Some(state.fetch_calls) {
            return Err(StoreError::Unavailable(format!(
                "injected failure on fetch {}",
                state.fetch_calls
            )));
        }

        let lower = match start_after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        Ok(state
            .documents
            .range::<str, _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, content)| ReviewRecord::new(id.clone(), content.clone()))
            .collect())
    }

    async fn commit_group(&self, group: &WriteGroup) -> StoreResult<CommitReceipt> {
        let mut state = self.state();
        state.commit_calls += 1;
        let transaction_id = group.transaction_id.to_string();
        if state.failing_commit == Some(state.commit_calls) {
            return Err(StoreError::CommitRejected {
                transaction_id,
                reason: format!("injected failure on commit {}", state.commit_calls),
            });
        }
        if let Some(missing) = group
            .patches
            .iter()
            .find(|patch| !state.documents.contains_key(&patch.id))
        {
            return Err(StoreError::CommitRejected {
                transaction_id,
                reason: format!("document {} does not exist", missing.id),
            });
        }

        let now = Utc::now();
        for patch in &group.patches {
            if let Some(content) = state.documents.get_mut(&patch.id) {
                patch.apply_to(content, now);
            }
        }
        let receipt = CommitReceipt {
            transaction_id,
            committed_at: now,
            document_ids: group.patches.iter().map(|p| p.id.clone()).collect(),
        };
        debug!(transaction_id = %receipt.transaction_id, documents = receipt.document_ids.len(), "memory commit");
        state.receipts.push(receipt.clone());
        Ok(receipt)
    }

    async fn find(&self, filter: &Expr, limit: usize) -> StoreResult<Vec<ReviewRecord>> {
        let params = Params::new();
        let mut found = Vec::new();
        for record in self.records() {
            if found.len() >= limit {
                break;
            }
            if eval_filter(filter, &record, &params)? {
                found.push(record);
            }
        }
        Ok(found)
    }

    async fn feed(&self, query: &Query, params: &Params) -> StoreResult<Vec<String>> {
        let records = self.records();
        Ok(execute(query, &records, params)?
            .into_iter()
            .map(|record| record.id.clone())
            .collect())
    }
}
