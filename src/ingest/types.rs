// src/ingest/types.rs
use chrono::{Datelike, NaiveDate};

/// One normalized report from one provider about a possible event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Article {
    pub title: String,            // never empty once past an adapter
    pub body_text: String,        // HTML already stripped
    pub published_date: NaiveDate,
    pub source_name: String,      // e.g. "Reuters", "Wikipedia"
    pub source_url: String,
    pub image_url: Option<String>,
    pub origin_year: Option<i32>, // set by on-this-day providers
}

impl Article {
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Host of `source_url` without a leading `www.`, if the URL parses.
    pub fn source_host(&self) -> Option<String> {
        url_host(&self.source_url)
    }
}

pub(crate) fn url_host(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// What a collection run asks providers for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// A calendar date. Historical providers only use its month/day.
    Date(NaiveDate),
    /// Free-text topic.
    Topic(String),
}

impl Query {
    pub fn month_day(&self) -> Option<(u32, u32)> {
        match self {
            Query::Date(d) => Some((d.month(), d.day())),
            Query::Topic(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Query::Date(d) => d.format("%Y-%m-%d").to_string(),
            Query::Topic(t) => format!("topic:{t}"),
        }
    }
}

/// Adapter over one external content source.
///
/// `fetch` never fails to the caller: transport errors, non-success statuses and
/// malformed payloads are logged inside the adapter and yield an empty list.
#[async_trait::async_trait]
pub trait ArticleProvider: Send + Sync {
    async fn fetch(&self, query: &Query) -> Vec<Article>;
    fn name(&self) -> &str;
    fn supports(&self, _query: &Query) -> bool {
        true
    }
}
