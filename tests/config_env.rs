// tests/config_env.rs
//! Every test here touches process env; all of them run serially.

use serial_test::serial;
use std::{env, fs};

use world_events::config::{ConfigError, GenerativeConfig, PipelineConfig};
use world_events::generative::{build_generator, TextGenerator};

fn clear_env() {
    for k in [
        "PIPELINE_CONFIG_PATH",
        "AI_CONFIG_PATH",
        "AI_TEST_MODE",
        "OPENAI_API_KEY",
    ] {
        env::remove_var(k);
    }
}

#[test]
#[serial]
fn pipeline_config_path_env_wins() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("pipeline.toml");
    fs::write(
        &p,
        r#"
added_by = "nightly-sweep"
grouping_threshold = 0.6

[store]
batch_size = 50

[run]
run_timeout_secs = 90
"#,
    )
    .unwrap();
    env::set_var("PIPELINE_CONFIG_PATH", &p);

    let cfg = PipelineConfig::load_default().unwrap();
    assert_eq!(cfg.added_by, "nightly-sweep");
    assert_eq!(cfg.grouping_threshold, 0.6);
    assert_eq!(cfg.store.batch_size, 50);
    assert_eq!(cfg.run_timeout(), Some(std::time::Duration::from_secs(90)));

    clear_env();
}

#[test]
#[serial]
fn pipeline_config_path_must_exist() {
    clear_env();
    env::set_var("PIPELINE_CONFIG_PATH", "/definitely/not/here.toml");
    let err = PipelineConfig::load_default().unwrap_err();
    assert!(matches!(err, ConfigError::MissingPath { .. }));
    clear_env();
}

#[test]
#[serial]
fn malformed_pipeline_config_names_the_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("broken.toml");
    fs::write(&p, "grouping_threshold = [").unwrap();

    let err = PipelineConfig::load_from_path(&p).unwrap_err();
    match err {
        ConfigError::Parse { path, .. } => assert!(path.ends_with("broken.toml")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
#[serial]
fn enabled_ai_needs_its_key() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("ai.json");
    fs::write(&p, r#"{"enabled": true, "provider": "openai", "api_key": "ENV"}"#).unwrap();

    let err = GenerativeConfig::load_from_file(&p).unwrap_err();
    assert!(matches!(err, ConfigError::MissingEnv(ref v) if v == "OPENAI_API_KEY"));

    env::set_var("OPENAI_API_KEY", "sk-test");
    let cfg = GenerativeConfig::load_from_file(&p).unwrap();
    assert_eq!(cfg.api_key, "sk-test");
    assert_eq!(cfg.daily_limit, 200);

    clear_env();
}

#[test]
#[serial]
fn disabled_ai_loads_without_key_and_builds_disabled_client() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("ai.json");
    fs::write(&p, r#"{"enabled": false, "api_key": "ENV"}"#).unwrap();
    env::set_var("AI_CONFIG_PATH", &p);

    let cfg = GenerativeConfig::load_default().unwrap();
    assert!(!cfg.enabled);
    let g = build_generator(&cfg);
    assert_eq!(g.name(), "disabled");
    assert!(!g.is_enabled());

    clear_env();
}

#[test]
#[serial]
fn unsupported_ai_provider_is_rejected() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("ai.json");
    fs::write(&p, r#"{"enabled": true, "provider": "Acme", "api_key": "x"}"#).unwrap();

    let err = GenerativeConfig::load_from_file(&p).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedProvider(ref p) if p == "acme"));
}

#[test]
#[serial]
fn ai_test_mode_forces_the_mock() {
    clear_env();
    env::set_var("AI_TEST_MODE", "mock");
    let g = build_generator(&GenerativeConfig::default());
    assert_eq!(g.name(), "mock");
    assert!(g.is_enabled());
    clear_env();
}

#[tokio::test]
#[serial]
async fn pipeline_builds_from_config_with_fixture_providers() {
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::Arc;
    use world_events::config::pipeline::{FixtureConfig, ProviderKind};
    use world_events::{JsonDirStore, UnitOfWork};

    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = PipelineConfig::default();
    cfg.providers.on_this_day = false;
    cfg.providers.news_api_key = None;
    cfg.providers.fixtures = vec![
        FixtureConfig {
            kind: ProviderKind::Rss,
            name: Some("WireServiceA".into()),
            path: "tests/fixtures/wire_a.xml".into(),
        },
        FixtureConfig {
            kind: ProviderKind::Rss,
            name: Some("WireServiceB".into()),
            path: "tests/fixtures/wire_b.xml".into(),
        },
    ];
    cfg.reputation_path = dir.path().join("missing-reputation.json");
    cfg.store.dir = dir.path().join("events");
    cfg.run.inter_unit_delay_ms = 0;
    cfg.enrich.inter_call_delay_ms = 0;

    let store = Arc::new(JsonDirStore::new(cfg.store.dir.clone()));
    let pipeline = world_events::Pipeline::from_config(&cfg, &GenerativeConfig::default(), store)
        .unwrap()
        .with_fixed_clock(Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap());
    assert_eq!(pipeline.settings().batch_limit, 400);

    let summary = pipeline
        .run(&UnitOfWork::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()))
        .await;
    assert!(summary.is_success(), "{summary}");
    assert_eq!(summary.created, 1);

    let file = cfg
        .store
        .dir
        .join("flooding-swamps-danube-river-towns-2024-05-01.json");
    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(file).unwrap()).unwrap();
    assert_eq!(doc["credibility_score"], 79);
    assert_eq!(doc["sources"], serde_json::json!(["WireServiceA", "WireServiceB"]));
}
