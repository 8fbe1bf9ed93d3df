//! `DocumentStore` over the `documents` table.
//!
//! Each review is one row (`dataset_id`, `document_id`, `doc_type`,
//! `revision`, `content` jsonb, `created_at`, `updated_at`, `deleted`).
//! Soft-deleted rows are invisible to every operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, warn};
use uuid::Uuid;

use review_lake_groq::{eval_filter, execute, Direction, Expr, Params, Query};

use super::sql::{push_defined, push_predicate, translate};
use super::{DocumentStore, StoreError, StoreResult};
use crate::document::{timestamp, ReviewRecord};
use crate::mutation::{CommitReceipt, FieldPath, PatchValue, WriteGroup};

/// Page size used when a filter has to be evaluated in memory.
const FALLBACK_PAGE_SIZE: usize = 1000;

/// Row representation of a document as the pipeline reads it.
#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentRow {
    document_id: String,
    content: Value,
}

impl TryFrom<DocumentRow> for ReviewRecord {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        match row.content {
            Value::Object(content) => Ok(ReviewRecord::new(row.document_id, content)),
            other => Err(StoreError::InvalidDocument {
                id: row.document_id,
                reason: format!("content is {}", json_type(&other)),
            }),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    dataset_id: Uuid,
    doc_type: String,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, dataset_id: Uuid, doc_type: impl Into<String>) -> Self {
        Self {
            pool,
            dataset_id,
            doc_type: doc_type.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn dataset_id(&self) -> Uuid {
        self.dataset_id
    }

    fn select(&self, columns: &str) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!("SELECT {columns} FROM documents WHERE dataset_id = "));
        builder
            .push_bind(self.dataset_id)
            .push(" AND doc_type = ")
            .push_bind(self.doc_type.clone())
            .push(" AND NOT deleted");
        builder
    }

    async fn fetch_all(&self) -> StoreResult<Vec<ReviewRecord>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.fetch_page(cursor.as_deref(), FALLBACK_PAGE_SIZE).await?;
            let Some(last) = page.last() else { break };
            cursor = Some(last.id.clone());
            records.extend(page);
        }
        Ok(records)
    }

    /// Lock the row and bump its revision. Fails if the row is gone.
    async fn touch_row(
        &self,
        conn: &mut PgConnection,
        id: &str,
        revision: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE documents SET revision = $1, updated_at = $2 \
             WHERE dataset_id = $3 AND doc_type = $4 AND document_id = $5 AND NOT deleted",
        )
        .bind(revision)
        .bind(now)
        .bind(self.dataset_id)
        .bind(&self.doc_type)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_write(
        &self,
        conn: &mut PgConnection,
        id: &str,
        path: &FieldPath,
        value: &PatchValue,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let segments = path.segments();
        let value = match value {
            PatchValue::Unset => {
                sqlx::query(
                    "UPDATE documents SET content = content #- $1::text[] \
                     WHERE dataset_id = $2 AND doc_type = $3 AND document_id = $4",
                )
                .bind(segments.to_vec())
                .bind(self.dataset_id)
                .bind(&self.doc_type)
                .bind(id)
                .execute(&mut *conn)
                .await?;
                return Ok(());
            }
            PatchValue::Set(value) => value.clone(),
            PatchValue::ServerTimestamp => timestamp::encode(now),
        };

        // jsonb_set only creates the leaf, so intermediate objects go first.
        for depth in 1..segments.len() {
            sqlx::query(
                "UPDATE documents SET content = jsonb_set(content, $1::text[], '{}'::jsonb, true) \
                 WHERE dataset_id = $2 AND doc_type = $3 AND document_id = $4 \
                 AND jsonb_typeof(content #> $1::text[]) IS DISTINCT FROM 'object'",
            )
            .bind(segments[..depth].to_vec())
            .bind(self.dataset_id)
            .bind(&self.doc_type)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        }

        sqlx::query(
            "UPDATE documents SET content = jsonb_set(content, $1::text[], $2::jsonb, true) \
             WHERE dataset_id = $3 AND doc_type = $4 AND document_id = $5",
        )
        .bind(segments.to_vec())
        .bind(Json(value))
        .bind(self.dataset_id)
        .bind(&self.doc_type)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn fetch_page(
        &self,
        start_after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ReviewRecord>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"SELECT document_id, content FROM documents
               WHERE dataset_id = $1 AND doc_type = $2 AND NOT deleted
                 AND ($3::text IS NULL OR document_id COLLATE "C" > $3)
               ORDER BY document_id COLLATE "C" ASC
               LIMIT $4"#,
        )
        .bind(self.dataset_id)
        .bind(&self.doc_type)
        .bind(start_after)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReviewRecord::try_from).collect()
    }

    async fn commit_group(&self, group: &WriteGroup) -> StoreResult<CommitReceipt> {
        let transaction_id = group.transaction_id.to_string();
        let mut tx = self.pool.begin().await?;
        let now: DateTime<Utc> = sqlx::query_scalar("SELECT now()")
            .fetch_one(&mut *tx)
            .await?;

        for patch in &group.patches {
            if !self.touch_row(&mut tx, &patch.id, &transaction_id, now).await? {
                warn!(%transaction_id, id = %patch.id, "patched document is missing, rolling back");
                return Err(StoreError::CommitRejected {
                    transaction_id,
                    reason: format!("document {} does not exist", patch.id),
                });
            }
            for (path, value) in patch.iter() {
                self.apply_write(&mut tx, &patch.id, path, value, now).await?;
            }
        }
        tx.commit().await?;

        debug!(%transaction_id, documents = group.len(), "committed write group");
        Ok(CommitReceipt {
            transaction_id,
            committed_at: now,
            document_ids: group.patches.iter().map(|p| p.id.clone()).collect(),
        })
    }

    async fn find(&self, filter: &Expr, limit: usize) -> StoreResult<Vec<ReviewRecord>> {
        let params = Params::new();
        let Some(predicate) = translate(filter, &params) else {
            debug!("filter not translatable to SQL, scanning in memory");
            let mut found = Vec::new();
            for record in self.fetch_all().await? {
                if found.len() >= limit {
                    break;
                }
                if eval_filter(filter, &record, &params)? {
                    found.push(record);
                }
            }
            return Ok(found);
        };

        let mut builder = self.select("document_id, content");
        builder.push(" AND ");
        push_predicate(&mut builder, &predicate);
        builder
            .push(r#" ORDER BY document_id COLLATE "C" ASC LIMIT "#)
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        let rows: Vec<DocumentRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(ReviewRecord::try_from).collect()
    }

    async fn feed(&self, query: &Query, params: &Params) -> StoreResult<Vec<String>> {
        let predicate = match &query.filter {
            Some(filter) => match translate(filter, params) {
                Some(predicate) => Some(predicate),
                None => {
                    debug!("feed filter not translatable to SQL, replaying in memory");
                    let records = self.fetch_all().await?;
                    return Ok(execute(query, &records, params)?
                        .into_iter()
                        .map(|record| record.id.clone())
                        .collect());
                }
            },
            None => None,
        };

        let mut builder = self.select("document_id");
        if let Some(predicate) = &predicate {
            builder.push(" AND ");
            push_predicate(&mut builder, predicate);
        }
        for key in &query.order {
            builder.push(" AND ");
            push_defined(&mut builder, &key.path);
        }
        builder.push(" ORDER BY ");
        for key in &query.order {
            builder
                .push("(content #> ")
                .push_bind(key.path.clone())
                .push("::text[]) ")
                .push(match key.direction {
                    Direction::Asc => "ASC, ",
                    Direction::Desc => "DESC, ",
                });
        }
        builder.push(r#"document_id COLLATE "C" ASC"#);
        if let Some(slice) = query.slice {
            builder
                .push(" OFFSET ")
                .push_bind(i64::try_from(slice.start).unwrap_or(i64::MAX))
                .push(" LIMIT ")
                .push_bind(i64::try_from(slice.len()).unwrap_or(i64::MAX));
        }

        let ids: Vec<String> = builder.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(ids)
    }
}
