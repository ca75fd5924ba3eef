//! # Event grouping
//!
//! Greedy single-pass clustering of articles by title similarity.
//!
//! - Titles are tokenized: lowercase, possessive `'s` dropped, punctuation removed,
//!   tokens of length <= 3 discarded.
//! - Each article is compared against the *first* article of every existing group using
//!   `|A ∩ B| / max(|A|, |B|)`. The first group with a ratio strictly above the
//!   threshold wins; otherwise the article starts a new group.
//! - An article with no significant tokens always starts its own group.
//!
//! Order-dependent and O(n·g); per-run volumes are small.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

use crate::ingest::types::Article;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;
const MIN_TOKEN_LEN: usize = 4;

static RE_POSSESSIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:'|’)s\b").unwrap());
static RE_NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").unwrap());

/// Significant tokens of a title.
pub fn significant_tokens(title: &str) -> BTreeSet<String> {
    let lower = title.to_lowercase();
    let no_possessive = RE_POSSESSIVE.replace_all(&lower, "");
    RE_NON_ALNUM
        .split(&no_possessive)
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

/// `|A ∩ B| / max(|A|, |B|)`; 0.0 when either side is empty.
pub fn overlap_ratio(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let denom = a.len().max(b.len());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    shared as f64 / denom as f64
}

/// Non-empty, ordered set of articles believed to describe one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleGroup {
    articles: Vec<Article>,
    lead_tokens: BTreeSet<String>,
}

impl ArticleGroup {
    pub fn new(first: Article) -> Self {
        let lead_tokens = significant_tokens(&first.title);
        Self {
            articles: vec![first],
            lead_tokens,
        }
    }

    /// Build a group from an existing list. Returns `None` for an empty list.
    pub fn from_articles(articles: Vec<Article>) -> Option<Self> {
        let mut it = articles.into_iter();
        let mut group = Self::new(it.next()?);
        group.articles.extend(it);
        Some(group)
    }

    fn push(&mut self, article: Article) {
        self.articles.push(article);
    }

    pub fn lead(&self) -> &Article {
        &self.articles[0]
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Distinct source names, in first-seen order (case-insensitive).
    pub fn source_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.articles
            .iter()
            .filter(|a| seen.insert(a.source_name.to_lowercase()))
            .map(|a| a.source_name.clone())
            .collect()
    }

    pub fn source_count(&self) -> usize {
        self.source_names().len()
    }

    pub fn earliest_published(&self) -> NaiveDate {
        self.articles
            .iter()
            .map(|a| a.published_date)
            .min()
            .unwrap_or(self.lead().published_date)
    }

    pub fn is_historical(&self) -> bool {
        self.articles.iter().any(|a| a.origin_year.is_some())
    }

    /// Mean title overlap of members from *other* sources against the lead.
    /// 0.0 for single-source groups.
    pub fn agreement_ratio(&self) -> f64 {
        let lead = self.lead();
        let ratios: Vec<f64> = self.articles[1..]
            .iter()
            .filter(|a| !a.source_name.eq_ignore_ascii_case(&lead.source_name))
            .map(|a| overlap_ratio(&self.lead_tokens, &significant_tokens(&a.title)))
            .collect();
        if ratios.is_empty() {
            return 0.0;
        }
        (ratios.iter().sum::<f64>() / ratios.len() as f64).clamp(0.0, 1.0)
    }

    /// Distinct member titles, lead first.
    pub fn titles(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.articles
            .iter()
            .filter(|a| seen.insert(a.title.to_lowercase()))
            .map(|a| a.title.clone())
            .collect()
    }

    /// Concatenated member bodies (falling back to titles), blank-line separated.
    pub fn combined_text(&self) -> String {
        self.articles
            .iter()
            .map(|a| {
                if a.body_text.is_empty() {
                    a.title.as_str()
                } else {
                    a.body_text.as_str()
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn links(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.articles
            .iter()
            .filter(|a| !a.source_url.is_empty() && seen.insert(a.source_url.clone()))
            .map(|a| a.source_url.clone())
            .collect()
    }

    pub fn image_url(&self) -> Option<String> {
        self.articles.iter().find_map(|a| a.image_url.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EventGrouper {
    threshold: f64,
}

impl Default for EventGrouper {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl EventGrouper {
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn group(&self, articles: Vec<Article>) -> Vec<ArticleGroup> {
        let mut groups: Vec<ArticleGroup> = Vec::new();
        for article in articles {
            let tokens = significant_tokens(&article.title);
            if tokens.is_empty() {
                groups.push(ArticleGroup::new(article));
                continue;
            }
            let target = groups
                .iter()
                .position(|g| overlap_ratio(&g.lead_tokens, &tokens) > self.threshold);
            match target {
                Some(idx) => groups[idx].push(article),
                None => groups.push(ArticleGroup::new(article)),
            }
        }
        metrics::counter!("group_groups_total").increment(groups.len() as u64);
        tracing::debug!(target: "group", groups = groups.len(), "grouping finished");
        groups
    }
}
