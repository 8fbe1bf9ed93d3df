use review_lake_core::census::{run_census, CensusConfig, CensusReport};
use review_lake_core::DocumentStore;

use crate::error::CliResult;

pub async fn run<S: DocumentStore + ?Sized>(
    store: &S,
    config: &CensusConfig,
    json: bool,
) -> CliResult<CensusReport> {
    let report = run_census(store, config).await?;
    println!("{}", render(&report, json)?);
    Ok(report)
}

pub fn render(report: &CensusReport, json: bool) -> CliResult<String> {
    if json {
        Ok(serde_json::to_string_pretty(report)?)
    } else {
        Ok(report.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_lake_core::census::Lookup;
    use review_lake_core::document::ReviewRecord;
    use review_lake_core::MemoryDocumentStore;
    use serde_json::{json, Value};

    fn store() -> MemoryDocumentStore {
        MemoryDocumentStore::from_records([
            ReviewRecord::from_json("r1", json!({"userId": "u1", "restaurantId": "p1", "images": []})),
            ReviewRecord::from_json(
                "r2",
                json!({"userId": "u1", "restaurantId": "p1", "schemaVersion": 2, "isDeleted": false}),
            ),
        ])
    }

    #[tokio::test]
    async fn json_report_has_recommendation() {
        let config = CensusConfig {
            lookups: vec![Lookup::parse("userId == \"u1\"").unwrap()],
            ..CensusConfig::default()
        };
        let report = run(&store(), &config, true).await.unwrap();
        let value: Value = serde_json::from_str(&render(&report, true).unwrap()).unwrap();
        assert!(value.get("recommendation").is_some());
        assert_eq!(report.lookups[0].matches.len(), 2);
    }

    #[tokio::test]
    async fn text_report_ends_with_recommendation() {
        let report = run(&store(), &CensusConfig::default(), false).await.unwrap();
        let text = render(&report, false).unwrap();
        assert!(text.contains("Recommendation:"));
    }
}
