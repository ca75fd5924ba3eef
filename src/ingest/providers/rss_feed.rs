// src/ingest/providers/rss_feed.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use super::{get_text, http_client, report_failure, Mode};
use crate::ingest::types::{Article, ArticleProvider, Query};
use crate::ingest::{normalize_text, normalize_title};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
}

fn parse_rfc2822_to_date(ts: &str) -> Option<NaiveDate> {
    let unix = OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()?
        .to_offset(UtcOffset::UTC)
        .unix_timestamp();
    chrono::DateTime::from_timestamp(unix, 0).map(|dt| dt.date_naive())
}

/// Generic RSS 2.0 feed. Date queries keep items published that day; topic queries keep
/// items whose title or description mention every term of the topic.
pub struct RssFeedProvider {
    name: String,
    url: String,
    mode: Mode,
}

impl RssFeedProvider {
    pub fn from_fixture_str(name: &str, s: &str) -> Self {
        Self {
            name: name.to_string(),
            url: String::new(),
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_url(name: &str, url: &str, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            mode: Mode::Http {
                client: http_client(timeout),
            },
        }
    }

    fn parse_items(&self, s: &str, query: &Query) -> Result<Vec<Article>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let terms: Vec<String> = match query {
            Query::Topic(t) => t.split_whitespace().map(str::to_lowercase).collect(),
            Query::Date(_) => Vec::new(),
        };

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_title(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let body = normalize_text(it.description.as_deref().unwrap_or_default());
            let published = it.pub_date.as_deref().and_then(parse_rfc2822_to_date);

            let published_date = match (query, published) {
                (Query::Date(want), Some(d)) if d == *want => d,
                (Query::Date(_), _) => continue,
                (Query::Topic(_), Some(d)) => d,
                (Query::Topic(_), None) => continue,
            };
            if !terms.is_empty() {
                let hay = format!("{} {}", title, body).to_lowercase();
                if !terms.iter().all(|t| hay.contains(t.as_str())) {
                    continue;
                }
            }

            out.push(Article {
                title,
                body_text: body,
                published_date,
                source_name: self.name.clone(),
                source_url: it.link.unwrap_or_else(|| self.url.clone()),
                image_url: it.enclosure.and_then(|e| e.url),
                origin_year: None,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("collect_parse_ms").record(ms);
        counter!("collect_events_parsed_total").increment(out.len() as u64);
        Ok(out)
    }

    async fn try_fetch(&self, query: &Query) -> Result<Vec<Article>> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { client } => get_text(client.get(&self.url), &self.name).await?,
        };
        self.parse_items(&body, query)
    }
}

#[async_trait]
impl ArticleProvider for RssFeedProvider {
    async fn fetch(&self, query: &Query) -> Vec<Article> {
        match self.try_fetch(query).await {
            Ok(v) => v,
            Err(e) => {
                report_failure(&self.name, &e);
                Vec::new()
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
