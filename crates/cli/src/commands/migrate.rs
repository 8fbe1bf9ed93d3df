use review_lake_core::{DocumentStore, Driver, DriverConfig, RunMode, RunState};
use tracing::{error, warn};

use crate::error::CliResult;

pub async fn run<S: DocumentStore + ?Sized>(store: &S, config: DriverConfig) -> CliResult<RunState> {
    if config.mode == RunMode::Commit {
        warn!("commit mode: patches will be written to the store");
    }
    match Driver::new(store, config).run().await {
        Ok(state) => {
            println!(
                "processed {} | changed {} | skipped {} | quarantined {} | recovered {}",
                state.processed, state.changed, state.skipped, state.quarantined, state.recovered
            );
            Ok(state)
        }
        Err(err) => {
            error!(
                error = %err.source,
                processed = err.state.processed,
                resume_cursor = err.resume_cursor.as_deref(),
                "migration aborted"
            );
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_lake_core::document::ReviewRecord;
    use review_lake_core::MemoryDocumentStore;
    use serde_json::json;

    fn store() -> MemoryDocumentStore {
        MemoryDocumentStore::from_records([
            ReviewRecord::from_json("r1", json!({"userId": "u1", "restaurantId": "p1", "dish": "Ramen"})),
            ReviewRecord::from_json("r2", json!({"dish": "orphan"})),
        ])
    }

    #[tokio::test]
    async fn commit_returns_final_counters() {
        let store = store();
        let config = DriverConfig {
            mode: RunMode::Commit,
            ..DriverConfig::default()
        };
        let state = run(&store, config).await.unwrap();
        assert_eq!(state.processed, 2);
        assert_eq!(state.quarantined, 1);
        assert!(!store.receipts().is_empty());
    }

    #[tokio::test]
    async fn failure_carries_resume_cursor() {
        let store = store();
        store.fail_fetch_call(1);
        let err = run(&store, DriverConfig::default()).await.unwrap_err();
        assert_eq!(err.resume_cursor(), None);
        assert!(err.to_string().contains("migration aborted"));
    }
}
