use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series carry descriptions in the exposition).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "collect_articles_total",
            "Articles kept after validation and near-duplicate suppression."
        );
        describe_counter!(
            "collect_events_parsed_total",
            "Articles parsed from provider payloads."
        );
        describe_counter!(
            "collect_duplicates_total",
            "Same-source near-duplicate articles dropped."
        );
        describe_counter!(
            "pipeline_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_histogram!("collect_fetch_ms", "Provider fetch time in milliseconds.");
        describe_histogram!("collect_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("group_groups_total", "Article groups formed.");
        describe_counter!(
            "score_rejected_total",
            "Groups rejected below the accept threshold."
        );
        describe_counter!("enrich_calls_total", "Generative service attempts.");
        describe_counter!("enrich_retries_total", "Generative call retries.");
        describe_counter!(
            "enrich_fallback_total",
            "Enrichments served by the heuristic path."
        );
        describe_counter!("enrich_cache_hits_total", "Generative replies served from cache.");
        describe_counter!("store_writes_total", "Documents committed to the store.");
        describe_counter!("store_commits_total", "Successful batch commits.");
        describe_counter!("store_commit_failures_total", "Failed batch commits.");
        describe_histogram!("pipeline_run_seconds", "Wall time of one unit of work.");
        describe_gauge!(
            "pipeline_last_run_ts",
            "Unix ts when a unit of work last finished."
        );
    });
}

/// Prometheus recorder for the CLI. Install once per process.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Prometheus exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
