// tests/providers.rs
use chrono::NaiveDate;
use std::fs;

use world_events::config::pipeline::{FixtureConfig, ProviderKind, ProvidersConfig};
use world_events::ingest::collect;
use world_events::ingest::providers::{
    build_providers, NewsApiProvider, OnThisDayProvider, RssFeedProvider,
};
use world_events::ingest::types::{ArticleProvider, Query};

fn fixture(name: &str) -> String {
    fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn rss_keeps_items_published_on_the_query_date() {
    let p = RssFeedProvider::from_fixture_str("WireServiceA", &fixture("wire_a.xml"));
    let out = p.fetch(&Query::Date(day(2024, 5, 1))).await;

    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|a| a.source_name == "WireServiceA"));
    assert!(out.iter().all(|a| a.published_date == day(2024, 5, 1)));

    let flood = &out[0];
    assert_eq!(flood.title, "Flooding swamps Danube river towns");
    assert_eq!(
        flood.body_text,
        "Rivers burst their banks overnight, forcing thousands of residents from their homes along the Danube."
    );
    assert_eq!(
        flood.image_url.as_deref(),
        Some("https://wire-a.test/img/danube.jpg")
    );
    assert_eq!(flood.source_host().as_deref(), Some("wire-a.test"));
    assert_eq!(flood.origin_year, None);
}

#[tokio::test]
async fn rss_topic_needs_every_term() {
    let p = RssFeedProvider::from_fixture_str("WireServiceA", &fixture("wire_a.xml"));

    let out = p.fetch(&Query::Topic("danube".into())).await;
    assert_eq!(out.len(), 1);

    let out = p.fetch(&Query::Topic("danube ceasefire".into())).await;
    assert!(out.is_empty());

    // Topic runs are not tied to a date.
    let out = p.fetch(&Query::Topic("talks".into())).await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].published_date, day(2024, 4, 30));
}

#[tokio::test]
async fn broken_payload_yields_nothing() {
    let p = RssFeedProvider::from_fixture_str("Broken", "<rss><channel><item><title>");
    assert!(p.fetch(&Query::Date(day(2024, 5, 1))).await.is_empty());

    let p = NewsApiProvider::from_fixture_str("{not json");
    assert!(p.fetch(&Query::Date(day(2024, 5, 1))).await.is_empty());

    let p = NewsApiProvider::from_fixture_str(r#"{"status":"error","message":"apiKeyInvalid"}"#);
    assert!(p.fetch(&Query::Topic("anything".into())).await.is_empty());
}

#[tokio::test]
async fn news_api_drops_removed_and_off_date_items() {
    let p = NewsApiProvider::from_fixture_str(&fixture("newsapi.json"));
    let out = p.fetch(&Query::Date(day(2024, 5, 1))).await;

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].source_name, "Reuters");
    assert_eq!(out[1].source_name, "Local Gazette");
    assert!(out.iter().all(|a| a.title != "[Removed]"));

    // Truncation marker stripped, entities decoded.
    assert!(!out[0].body_text.contains("[+"));
    assert!(out[0].body_text.ends_with("several towns…"));
    // Empty image URL is no image; HTML is stripped.
    assert_eq!(out[1].image_url, None);
    assert_eq!(out[1].body_text, "Crews moved residents to higher ground.");
    assert_eq!(out[1].title, "Danube flood: villages evacuated");
}

#[tokio::test]
async fn news_api_topic_keeps_dated_items() {
    let p = NewsApiProvider::from_fixture_str(&fixture("newsapi.json"));
    let out = p.fetch(&Query::Topic("danube".into())).await;
    assert_eq!(out.len(), 3);
}

#[tokio::test]
async fn on_this_day_maps_origin_year_to_event_date() {
    let p = OnThisDayProvider::from_fixture_str(&fixture("onthisday.json"));
    let q = Query::Date(day(2024, 7, 20));
    assert!(p.supports(&q));

    let out = p.fetch(&q).await;
    // The event with empty text is skipped.
    assert_eq!(out.len(), 2);

    let apollo = &out[0];
    assert_eq!(apollo.title, "Apollo 11 lands on the Moon");
    assert_eq!(apollo.published_date, day(1969, 7, 20));
    assert_eq!(apollo.origin_year, Some(1969));
    assert_eq!(apollo.source_name, "Wikipedia");
    assert_eq!(apollo.source_url, "https://en.wikipedia.org/wiki/Apollo_11");
    assert!(apollo.body_text.starts_with("Apollo 11 was the spaceflight"));

    // No page: body falls back to the title, link to the day page.
    let treaty = &out[1];
    assert_eq!(treaty.published_date, day(1876, 7, 20));
    assert_eq!(treaty.body_text, treaty.title);
    assert_eq!(treaty.source_url, "https://en.wikipedia.org/wiki/July_20");
}

#[tokio::test]
async fn on_this_day_ignores_topics() {
    let p = OnThisDayProvider::from_fixture_str(&fixture("onthisday.json"));
    let q = Query::Topic("moon".into());
    assert!(!p.supports(&q));
    assert!(p.fetch(&q).await.is_empty());
}

#[tokio::test]
async fn collect_unions_providers_and_survives_failures() {
    let providers: Vec<Box<dyn ArticleProvider>> = vec![
        Box::new(RssFeedProvider::from_fixture_str(
            "WireServiceA",
            &fixture("wire_a.xml"),
        )),
        Box::new(RssFeedProvider::from_fixture_str(
            "WireServiceB",
            &fixture("wire_b.xml"),
        )),
        Box::new(NewsApiProvider::from_fixture_str(&fixture("newsapi.json"))),
        Box::new(RssFeedProvider::from_fixture_str("Broken", "<<<")),
    ];

    let out = collect(&Query::Date(day(2024, 5, 1)), &providers).await;
    // 2 (A) + 1 (B) + 2 (NewsAPI); the broken feed contributes nothing.
    assert_eq!(out.len(), 5);
    assert!(out.iter().all(|a| !a.title.trim().is_empty()));
}

#[test]
fn build_providers_reads_fixture_files() {
    let cfg = ProvidersConfig {
        on_this_day: false,
        news_api_key: None,
        fixtures: vec![
            FixtureConfig {
                kind: ProviderKind::Rss,
                name: Some("WireServiceA".into()),
                path: "tests/fixtures/wire_a.xml".into(),
            },
            FixtureConfig {
                kind: ProviderKind::OnThisDay,
                name: None,
                path: "tests/fixtures/onthisday.json".into(),
            },
        ],
        ..Default::default()
    };
    let ps = build_providers(&cfg).expect("providers");
    let names: Vec<&str> = ps.iter().map(|p| p.name()).collect();
    assert_eq!(names, vec!["WireServiceA", "Wikipedia"]);
}

#[test]
fn build_providers_fails_on_missing_fixture() {
    let cfg = ProvidersConfig {
        on_this_day: false,
        fixtures: vec![FixtureConfig {
            kind: ProviderKind::NewsApi,
            name: None,
            path: "tests/fixtures/does_not_exist.json".into(),
        }],
        ..Default::default()
    };
    assert!(build_providers(&cfg).is_err());
}
