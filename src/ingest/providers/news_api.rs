// src/ingest/providers/news_api.rs
//! NewsAPI-style `/v2/everything` adapter. Supports both date and topic queries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use super::{get_text, http_client, report_failure, Mode};
use crate::ingest::types::{Article, ArticleProvider, Query};
use crate::ingest::{normalize_text, normalize_title};

const NAME: &str = "NewsAPI";
const BASE_URL: &str = "https://newsapi.org/v2/everything";
const REMOVED_MARKER: &str = "[Removed]";

#[derive(Debug, Deserialize)]
struct Response {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    source: Option<ItemSource>,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    url_to_image: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemSource {
    name: Option<String>,
}

pub struct NewsApiProvider {
    mode: Mode,
    api_key: String,
    base_url: String,
    /// Search terms used for date queries, which carry no topic of their own.
    date_terms: String,
    page_size: u32,
}

impl NewsApiProvider {
    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
            api_key: String::new(),
            base_url: BASE_URL.to_string(),
            date_terms: default_date_terms(),
            page_size: 50,
        }
    }

    pub fn http(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            mode: Mode::Http {
                client: http_client(timeout),
            },
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
            date_terms: default_date_terms(),
            page_size: 50,
        }
    }

    pub fn with_date_terms(mut self, terms: impl Into<String>) -> Self {
        self.date_terms = terms.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn parse_articles(s: &str, query: &Query) -> Result<Vec<Article>> {
        let resp: Response = serde_json::from_str(s).context("parsing newsapi json")?;
        if !resp.status.eq_ignore_ascii_case("ok") {
            anyhow::bail!(
                "newsapi status {}: {}",
                resp.status,
                resp.message.unwrap_or_default()
            );
        }

        let mut out = Vec::with_capacity(resp.articles.len());
        for it in resp.articles {
            let title = normalize_title(it.title.as_deref().unwrap_or_default());
            if title.is_empty() || title == REMOVED_MARKER {
                continue;
            }
            let published = it.published_at.as_deref().and_then(parse_published);
            let published_date = match (published, query) {
                (Some(d), Query::Date(want)) if d != *want => continue,
                (Some(d), _) => d,
                (None, Query::Date(want)) => *want,
                (None, Query::Topic(_)) => continue,
            };
            let body_raw = format!(
                "{} {}",
                it.description.as_deref().unwrap_or_default(),
                strip_truncation_marker(it.content.as_deref().unwrap_or_default())
            );
            let source_name = it
                .source
                .and_then(|s| s.name)
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| NAME.to_string());

            out.push(Article {
                title,
                body_text: normalize_text(&body_raw),
                published_date,
                source_name,
                source_url: it.url.unwrap_or_default(),
                image_url: it.url_to_image.filter(|u| !u.is_empty()),
                origin_year: None,
            });
        }

        counter!("collect_events_parsed_total").increment(out.len() as u64);
        Ok(out)
    }

    async fn try_fetch(&self, query: &Query) -> Result<Vec<Article>> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { client } => {
                if self.api_key.is_empty() {
                    anyhow::bail!("newsapi key missing");
                }
                let page_size = self.page_size.to_string();
                let mut params: Vec<(&str, String)> = vec![
                    ("language", "en".to_string()),
                    ("sortBy", "popularity".to_string()),
                    ("pageSize", page_size),
                ];
                match query {
                    Query::Date(d) => {
                        let day = d.format("%Y-%m-%d").to_string();
                        params.push(("q", self.date_terms.clone()));
                        params.push(("from", day.clone()));
                        params.push(("to", day));
                    }
                    Query::Topic(t) => params.push(("q", t.clone())),
                }
                let req = client
                    .get(&self.base_url)
                    .header("X-Api-Key", &self.api_key)
                    .query(&params);
                get_text(req, NAME).await?
            }
        };
        Self::parse_articles(&body, query)
    }
}

#[async_trait]
impl ArticleProvider for NewsApiProvider {
    async fn fetch(&self, query: &Query) -> Vec<Article> {
        match self.try_fetch(query).await {
            Ok(v) => v,
            Err(e) => {
                report_failure(NAME, &e);
                Vec::new()
            }
        }
    }

    fn name(&self) -> &str {
        NAME
    }
}

fn default_date_terms() -> String {
    "world OR international OR global".to_string()
}

fn parse_published(ts: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(ts.trim())
        .ok()
        .map(|dt| dt.date_naive())
}

/// NewsAPI cuts `content` and appends e.g. `… [+2811 chars]`.
fn strip_truncation_marker(s: &str) -> &str {
    match s.rfind("[+") {
        Some(idx) if s.ends_with("chars]") => s[..idx].trim_end(),
        _ => s,
    }
}
