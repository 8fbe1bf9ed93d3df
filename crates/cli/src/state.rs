use std::sync::Arc;

use review_lake_core::PgDocumentStore;
use sqlx::postgres::PgPoolOptions;

use crate::config::AppConfig;
use crate::error::{CliError, CliResult};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    store: PgDocumentStore,
    config: AppConfig,
}

impl AppState {
    pub async fn connect(config: AppConfig) -> CliResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .min_connections(config.db_min_connections)
            .connect(&config.database_url)
            .await
            .map_err(CliError::Connect)?;
        let store = PgDocumentStore::new(pool, config.dataset_id, config.doc_type.clone());
        Ok(Self {
            inner: Arc::new(InnerState { store, config }),
        })
    }

    pub fn store(&self) -> &PgDocumentStore {
        &self.inner.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }
}
