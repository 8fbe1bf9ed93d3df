//! The document-store seam: everything the pipeline needs from the
//! collection, and nothing more.

pub mod memory;
pub mod postgres;
mod sql;

use async_trait::async_trait;
use review_lake_groq::{EvalError, Expr, Params, Query};

use crate::document::ReviewRecord;
use crate::mutation::{CommitReceipt, WriteGroup};

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("query error: {0}")]
    Query(#[from] EvalError),

    #[error("document {id} is not a JSON object: {reason}")]
    InvalidDocument { id: String, reason: String },

    #[error("write group {transaction_id} rejected: {reason}")]
    CommitRejected {
        transaction_id: String,
        reason: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("page cursor went backwards: {returned} after {previous}")]
    CursorRegression { previous: String, returned: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A collection of review documents keyed by ID.
///
/// Implementations order IDs byte-lexicographically and apply a write group
/// atomically: either every patch lands or none does.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Up to `limit` records with IDs strictly greater than `start_after`,
    /// in ascending ID order.
    async fn fetch_page(
        &self,
        start_after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ReviewRecord>>;

    async fn commit_group(&self, group: &WriteGroup) -> StoreResult<CommitReceipt>;

    /// Up to `limit` records matching `filter`, in ascending ID order.
    async fn find(&self, filter: &Expr, limit: usize) -> StoreResult<Vec<ReviewRecord>>;

    /// IDs returned by an ordered, windowed feed query.
    async fn feed(&self, query: &Query, params: &Params) -> StoreResult<Vec<String>>;
}
