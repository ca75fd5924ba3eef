// src/ingest/providers/mod.rs
pub mod news_api;
pub mod on_this_day;
pub mod rss_feed;

use std::time::Duration;

use crate::ingest::types::ArticleProvider;

pub use news_api::NewsApiProvider;
pub use on_this_day::OnThisDayProvider;
pub use rss_feed::RssFeedProvider;

pub const USER_AGENT: &str = "world-events/0.1 (+https://github.com/world-events/world-events)";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider timeouts are kept inside 5..=15 seconds.
pub fn clamp_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(5, 15))
}

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Where an adapter reads its payload from.
pub(crate) enum Mode {
    /// Raw payload kept in memory (offline runs, tests).
    Fixture(String),
    Http { client: reqwest::Client },
}

/// Log and count a provider failure; the caller then returns an empty list.
pub(crate) fn report_failure(provider: &str, err: &anyhow::Error) {
    tracing::warn!(target: "collect", provider, error = %format!("{err:#}"), "provider error");
    metrics::counter!("pipeline_provider_errors_total").increment(1);
}

/// Send `req` and return the body, failing on transport errors and non-2xx statuses.
pub(crate) async fn get_text(req: reqwest::RequestBuilder, provider: &str) -> anyhow::Result<String> {
    use anyhow::Context;
    let resp = req
        .send()
        .await
        .with_context(|| format!("{provider} http get"))?;
    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("{provider} returned status {status}");
    }
    resp.text()
        .await
        .with_context(|| format!("{provider} http .text()"))
}

/// Build the configured adapters. Fixture files must be readable; a news key given as
/// "ENV" without NEWS_API_KEY set only disables that provider.
pub fn build_providers(
    cfg: &crate::config::pipeline::ProvidersConfig,
) -> anyhow::Result<Vec<Box<dyn ArticleProvider>>> {
    use crate::config::pipeline::ProviderKind;
    use anyhow::Context;

    let timeout = clamp_timeout(cfg.timeout_secs);
    let mut out: Vec<Box<dyn ArticleProvider>> = Vec::new();

    for f in &cfg.fixtures {
        let payload = std::fs::read_to_string(&f.path)
            .with_context(|| format!("reading fixture {}", f.path.display()))?;
        let p: Box<dyn ArticleProvider> = match f.kind {
            ProviderKind::OnThisDay => Box::new(OnThisDayProvider::from_fixture_str(&payload)),
            ProviderKind::NewsApi => Box::new(NewsApiProvider::from_fixture_str(&payload)),
            ProviderKind::Rss => Box::new(RssFeedProvider::from_fixture_str(
                f.name.as_deref().unwrap_or("RSS"),
                &payload,
            )),
        };
        out.push(p);
    }

    if cfg.on_this_day {
        out.push(Box::new(OnThisDayProvider::http(timeout)));
    }

    if let Some(raw) = cfg.news_api_key.as_deref() {
        match crate::config::resolve_secret(raw, "NEWS_API_KEY") {
            Ok(key) if !key.is_empty() => {
                let mut p = NewsApiProvider::http(key, timeout);
                if let Some(terms) = cfg.news_date_terms.as_deref() {
                    p = p.with_date_terms(terms);
                }
                out.push(Box::new(p));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(target: "collect", error = %e, "news provider disabled");
            }
        }
    }

    for feed in &cfg.rss {
        out.push(Box::new(RssFeedProvider::from_url(&feed.name, &feed.url, timeout)));
    }

    Ok(out)
}
