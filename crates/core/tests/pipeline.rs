use review_lake_core::census::{
    run_census, CensusConfig, CensusMode, FeedShape, Lookup, Recommendation, ReplaySource,
    Visibility,
};
use review_lake_core::document::ReviewRecord;
use review_lake_core::{Driver, DriverConfig, MemoryDocumentStore, RunMode, StoreError};
use serde_json::{json, Value};

fn ts(seconds: i64) -> Value {
    json!({"_seconds": seconds, "_nanoseconds": 0})
}

/// One record per documented scenario, keyed so ID order is A..E.
fn scenario_store() -> MemoryDocumentStore {
    MemoryDocumentStore::from_records([
        ReviewRecord::from_json(
            "a-legacy",
            json!({
                "restaurantId": "r1",
                "userId": "u1",
                "dish": "Pad Thai",
                "images": ["a.jpg"],
                "createdAt": "2024-01-01T00:00:00Z",
            }),
        ),
        ReviewRecord::from_json("b-orphan", json!({"userId": "u1"})),
        ReviewRecord::from_json("c-content", json!({"caption": "amazing", "images": ["x.jpg"]})),
        ReviewRecord::from_json(
            "d-canonical",
            json!({
                "userId": "u2",
                "restaurantId": "r2",
                "schemaVersion": 2,
                "isDeleted": false,
                "createdAt": ts(1_704_067_200),
                "media": {"photos": []},
                "dishName": "Ramen",
            }),
        ),
        ReviewRecord::from_json(
            "e-bad-date",
            json!({"userId": "u3", "restaurantId": "r3", "createdAt": "not-a-date"}),
        ),
    ])
}

fn config(mode: RunMode) -> DriverConfig {
    DriverConfig {
        mode,
        ..DriverConfig::default()
    }
}

fn legacy_store(n: usize) -> MemoryDocumentStore {
    MemoryDocumentStore::from_records((0..n).map(|i| {
        ReviewRecord::from_json(
            format!("r{i:02}"),
            json!({"userId": "u1", "restaurantId": "r1", "createdAt": "2024-01-01"}),
        )
    }))
}

#[tokio::test]
async fn commit_run_repairs_every_scenario() {
    let store = scenario_store();
    let state = Driver::new(&store, config(RunMode::Commit)).run().await.unwrap();

    assert_eq!(state.processed, 5);
    assert_eq!(state.changed, 3);
    assert_eq!(state.skipped, 1);
    assert_eq!(state.quarantined, 1);
    assert_eq!(state.recovered, 1);
    assert_eq!(state.cursor.as_deref(), Some("e-bad-date"));

    let a = store.get("a-legacy").unwrap();
    assert_eq!(a.content["createdAt"], ts(1_704_067_200));
    assert_eq!(a.dish_name(), Some("Pad Thai"));
    assert_eq!(a.media_photos(), Some(&vec![json!("a.jpg")]));
    assert_eq!(a.is_deleted(), Some(false));
    assert_eq!(a.schema_version(), Some(2));
    assert!(a.content.contains_key("updatedAt"));

    let b = store.get("b-orphan").unwrap();
    assert_eq!(b.is_deleted(), Some(true));
    assert_eq!(b.normalize_error(), Some("missing foreign key"));

    let c = store.get("c-content").unwrap();
    assert_eq!(c.is_deleted(), Some(false));
    assert_eq!(c.normalize_error(), None);
    assert_eq!(c.media_photos(), Some(&vec![json!("x.jpg")]));

    let d = store.get("d-canonical").unwrap();
    assert!(!d.content.contains_key("updatedAt"));

    let e = store.get("e-bad-date").unwrap();
    assert_eq!(e.content["createdAt"], json!("not-a-date"));
    assert_eq!(e.normalize_error(), Some("invalid createdAt string"));
    assert_eq!(e.is_deleted(), Some(false));
    assert_eq!(e.schema_version(), Some(2));
}

#[tokio::test]
async fn second_commit_run_writes_nothing() {
    let store = scenario_store();
    Driver::new(&store, config(RunMode::Commit)).run().await.unwrap();
    let commits = store.receipts().len();
    let snapshot = store.records();

    let state = Driver::new(&store, config(RunMode::Commit)).run().await.unwrap();
    assert_eq!(store.receipts().len(), commits);
    assert_eq!(store.records(), snapshot);
    assert_eq!(state.changed, 0);
    assert_eq!(state.skipped + state.quarantined, state.processed);
}

#[tokio::test]
async fn media_photos_present_on_every_kept_record() {
    let store = scenario_store();
    Driver::new(&store, config(RunMode::Commit)).run().await.unwrap();
    for record in store.records() {
        if record.is_deleted() == Some(true) {
            continue;
        }
        assert!(record.media_photos().is_some(), "{}", record.id);
    }
}

#[tokio::test]
async fn quarantine_changes_only_its_fields() {
    let original = json!({
        "userId": "u9",
        "dish": "Pho",
        "images": [],
        "createdAt": "2023-05-01",
        "ratings": {"taste": 5},
    });
    let store = MemoryDocumentStore::from_records([ReviewRecord::from_json("q1", original.clone())]);
    Driver::new(&store, config(RunMode::Commit)).run().await.unwrap();

    let after = store.get("q1").unwrap();
    let allowed = ["isDeleted", "normalizeError", "schemaVersion", "updatedAt"];
    for (key, value) in &after.content {
        if !allowed.contains(&key.as_str()) {
            assert_eq!(Some(value), original.get(key), "{key} changed");
        }
    }
    for key in original.as_object().unwrap().keys() {
        assert!(after.content.contains_key(key), "{key} removed");
    }
}

#[tokio::test]
async fn dry_run_counts_without_writing() {
    let store = scenario_store();
    let before = store.records();
    let state = Driver::new(&store, config(RunMode::DryRun)).run().await.unwrap();
    assert_eq!((state.changed, state.skipped, state.quarantined), (3, 1, 1));
    assert!(store.receipts().is_empty());
    assert_eq!(store.records(), before);
}

#[tokio::test]
async fn start_after_skips_processed_records() {
    let store = legacy_store(6);
    let state = Driver::new(
        &store,
        DriverConfig {
            start_after: Some("r03".into()),
            ..config(RunMode::Commit)
        },
    )
    .run()
    .await
    .unwrap();
    assert_eq!(state.processed, 2);
    assert_eq!(store.get("r03").unwrap().schema_version(), None);
    assert_eq!(store.get("r04").unwrap().schema_version(), Some(2));
}

#[tokio::test]
async fn failed_commit_reports_last_committed_cursor() {
    let store = legacy_store(10);
    store.fail_commit_call(2);
    let run = Driver::new(
        &store,
        DriverConfig {
            batch_size: 3,
            page_size: 4,
            ..config(RunMode::Commit)
        },
    );
    let err = run.run().await.unwrap_err();
    assert!(matches!(err.source, StoreError::CommitRejected { .. }));
    assert_eq!(err.resume_cursor.as_deref(), Some("r02"));
    assert_eq!(err.state.processed, 6);
    assert_eq!(store.get("r03").unwrap().schema_version(), None);

    let state = Driver::new(
        &store,
        DriverConfig {
            batch_size: 3,
            page_size: 4,
            start_after: err.resume_cursor.clone(),
            ..config(RunMode::Commit)
        },
    )
    .run()
    .await
    .unwrap();
    assert_eq!(state.processed, 7);
    assert_eq!(state.changed, 7);
    assert!(store.records().iter().all(|r| r.schema_version() == Some(2)));
}

#[tokio::test]
async fn failed_fetch_never_skips_buffered_records() {
    let store = legacy_store(8);
    store.fail_fetch_call(2);
    let err = Driver::new(
        &store,
        DriverConfig {
            page_size: 4,
            ..config(RunMode::Commit)
        },
    )
    .run()
    .await
    .unwrap_err();
    assert!(matches!(err.source, StoreError::Unavailable(_)));
    assert_eq!(err.state.cursor.as_deref(), Some("r03"));
    assert_eq!(err.resume_cursor, None);
    assert!(store.receipts().is_empty());
}

#[tokio::test]
async fn dry_run_failure_resumes_from_last_observed() {
    let store = legacy_store(8);
    store.fail_fetch_call(2);
    let err = Driver::new(
        &store,
        DriverConfig {
            page_size: 4,
            ..config(RunMode::DryRun)
        },
    )
    .run()
    .await
    .unwrap_err();
    assert_eq!(err.resume_cursor.as_deref(), Some("r03"));
}

#[tokio::test]
async fn census_reports_generations_and_visibility() {
    let store = scenario_store();
    let report = run_census(&store, &CensusConfig::default()).await.unwrap();

    assert_eq!(report.mode, CensusMode::Sample);
    assert_eq!(report.stats.sampled, 5);
    // a-legacy and e-bad-date carry string createdAt without isDeleted.
    assert_eq!(report.legacy_percent, 40.0);
    assert_eq!(report.recommendation, Recommendation::Purge);
    assert!(report.lookups.is_empty());

    let canonical = report
        .replay
        .iter()
        .find(|entry| entry.id == "d-canonical")
        .unwrap();
    assert_eq!(canonical.source, ReplaySource::Example);
    assert_eq!(canonical.feeds[&FeedShape::Global], Visibility::Visible { rank: 0 });
    assert_eq!(canonical.feeds[&FeedShape::User], Visibility::Visible { rank: 0 });

    let legacy = report.replay.iter().find(|entry| entry.id == "a-legacy").unwrap();
    assert_eq!(legacy.feeds[&FeedShape::Global], Visibility::FilteredOut);
}

#[tokio::test]
async fn targeted_lookup_skips_the_sample_scan() {
    let store = scenario_store();
    store.fail_fetch_call(1);
    let report = run_census(
        &store,
        &CensusConfig {
            lookups: vec![Lookup::parse("userId == \"u2\"").unwrap()],
            ..CensusConfig::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(report.mode, CensusMode::Targeted);
    assert_eq!(report.stats.sampled, 1);
    assert_eq!(report.lookups.len(), 1);
    assert_eq!(report.lookups[0].matches.len(), 1);
    assert_eq!(report.lookups[0].matches[0].id, "d-canonical");
    assert_eq!(report.recommendation, Recommendation::Migrate);

    let ids: Vec<&str> = report.replay.iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(ids, vec!["d-canonical"]);
    assert_eq!(report.replay[0].source, ReplaySource::Lookup);
    assert_eq!(
        report.replay[0].feeds[&FeedShape::Restaurant],
        Visibility::Visible { rank: 0 }
    );
}

#[tokio::test]
async fn census_after_migration_recommends_migrate() {
    let store = scenario_store();
    Driver::new(&store, config(RunMode::Commit)).run().await.unwrap();
    let report = run_census(&store, &CensusConfig { limit: 3, ..CensusConfig::default() })
        .await
        .unwrap();
    assert_eq!(report.stats.sampled, 3);
    assert_eq!(report.recommendation, Recommendation::Migrate);
}

#[tokio::test]
async fn commit_keeps_photos_from_a_bare_media_list() {
    let store = MemoryDocumentStore::from_records([ReviewRecord::from_json(
        "r1",
        json!({"userId": "u1", "restaurantId": "r1", "media": ["a.jpg", "b.jpg"]}),
    )]);
    Driver::new(&store, config(RunMode::Commit)).run().await.unwrap();
    let record = store.get("r1").unwrap();
    assert_eq!(record.content["media"], json!({"photos": ["a.jpg", "b.jpg"]}));
}
