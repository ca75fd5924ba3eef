// tests/metrics_pipeline.rs
#![cfg(feature = "strict-metrics")]
use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use world_events::ingest::providers::RssFeedProvider;
use world_events::metrics::Metrics;
use world_events::pipeline::PipelineSettings;
use world_events::{MemoryStore, Pipeline, UnitOfWork};

#[tokio::test]
async fn metrics_exposed_after_a_run() {
    // One recorder per process; this is the only test in the binary.
    let metrics = Metrics::init().expect("recorder");

    let read = |f: &str| std::fs::read_to_string(format!("tests/fixtures/{f}")).expect("fixture");
    let store = Arc::new(MemoryStore::new());
    let summary = Pipeline::new(store)
        .with_provider(Box::new(RssFeedProvider::from_fixture_str(
            "WireServiceA",
            &read("wire_a.xml"),
        )))
        .with_provider(Box::new(RssFeedProvider::from_fixture_str(
            "WireServiceB",
            &read("wire_b.xml"),
        )))
        .with_provider(Box::new(RssFeedProvider::from_fixture_str("Broken", "<<<")))
        .with_settings(PipelineSettings {
            inter_unit_delay: Duration::ZERO,
            ..Default::default()
        })
        .with_fixed_clock(Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap())
        .run(&UnitOfWork::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()))
        .await;
    assert_eq!(summary.created, 1);

    let out = metrics.render();
    for series in [
        "collect_articles_total",
        "collect_events_parsed_total",
        "pipeline_provider_errors_total",
        "collect_fetch_ms",
        "group_groups_total",
        "score_rejected_total",
        "store_commits_total",
        "store_writes_total",
        "pipeline_run_seconds",
        "pipeline_last_run_ts",
    ] {
        assert!(out.contains(series), "missing {series}");
    }
}
