// src/ingest/providers/on_this_day.rs
//! Wikimedia "on this day" feed: historical events for a month/day pair.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use super::{get_text, http_client, report_failure, Mode};
use crate::ingest::types::{Article, ArticleProvider, Query};
use crate::ingest::{normalize_text, normalize_title};

const NAME: &str = "Wikipedia";
const BASE_URL: &str = "https://api.wikimedia.org/feed/v1/wikipedia/en/onthisday/events";

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    text: Option<String>,
    year: Option<i32>,
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    extract: Option<String>,
    thumbnail: Option<Thumbnail>,
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: Option<String>,
}

pub struct OnThisDayProvider {
    mode: Mode,
    base_url: String,
}

impl OnThisDayProvider {
    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn http(timeout: Duration) -> Self {
        Self {
            mode: Mode::Http {
                client: http_client(timeout),
            },
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parse a feed payload for the given month/day. `fallback` is used as the event
    /// date when the origin year cannot form a valid date (e.g. Feb 29).
    fn parse_events(s: &str, month: u32, day: u32, fallback: NaiveDate) -> Result<Vec<Article>> {
        let feed: Feed = serde_json::from_str(s).context("parsing on-this-day json")?;
        let default_url = format!("https://en.wikipedia.org/wiki/{}_{}", month_name(month), day);

        let mut out = Vec::with_capacity(feed.events.len());
        for ev in feed.events {
            let title = normalize_title(ev.text.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let page = ev.pages.first();
            let body = page
                .and_then(|p| p.extract.as_deref())
                .map(normalize_text)
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| title.clone());
            let source_url = page
                .and_then(|p| p.content_urls.as_ref())
                .and_then(|c| c.desktop.as_ref())
                .and_then(|d| d.page.clone())
                .unwrap_or_else(|| default_url.clone());
            let image_url = page
                .and_then(|p| p.thumbnail.as_ref())
                .and_then(|t| t.source.clone());
            let published_date = ev
                .year
                .and_then(|y| NaiveDate::from_ymd_opt(y, month, day))
                .unwrap_or(fallback);

            out.push(Article {
                title,
                body_text: body,
                published_date,
                source_name: NAME.to_string(),
                source_url,
                image_url,
                origin_year: ev.year,
            });
        }

        counter!("collect_events_parsed_total").increment(out.len() as u64);
        Ok(out)
    }

    async fn try_fetch(&self, date: NaiveDate, month: u32, day: u32) -> Result<Vec<Article>> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { client } => {
                let url = format!("{}/{:02}/{:02}", self.base_url, month, day);
                get_text(client.get(url), NAME).await?
            }
        };
        Self::parse_events(&body, month, day, date)
    }
}

#[async_trait]
impl ArticleProvider for OnThisDayProvider {
    async fn fetch(&self, query: &Query) -> Vec<Article> {
        let Query::Date(date) = query else {
            return Vec::new();
        };
        let Some((month, day)) = query.month_day() else {
            return Vec::new();
        };
        match self.try_fetch(*date, month, day).await {
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

    fn supports(&self, query: &Query) -> bool {
        matches!(query, Query::Date(_))
    }
}

fn month_name(month: u32) -> &'static str {
    const NAMES: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    NAMES
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("January")
}
