// src/enrich/mod.rs
//! Enrichment and bias analysis on top of the generative service.
//!
//! Every call is paced, wrapped in its own timeout, and retried with exponential
//! backoff. When the service is disabled or never yields usable JSON the heuristic path
//! answers instead, so both operations always return a complete value.

pub mod heuristic;
pub mod parse;

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::generative::{DynGenerator, Prompt};
use crate::grouping::ArticleGroup;

/// Retry/timeout settings for one generative operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Sleep after the `attempt`-th failure (1-based): `backoff << (attempt - 1)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << shift)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    Left,
    Right,
    Neutral,
    State,
}

impl Alignment {
    /// Lenient parse of model output; anything unrecognized is `Neutral`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" | "left-leaning" | "center-left" | "centre-left" => Alignment::Left,
            "right" | "right-leaning" | "center-right" | "centre-right" => Alignment::Right,
            "state" | "state media" | "state-media" | "state-aligned" => Alignment::State,
            _ => Alignment::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentOrigin {
    Generated,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasAssessment {
    /// -100 (left) ..= 100 (right).
    pub bias_score: i32,
    /// 0 (calm) ..= 100 (inflammatory).
    pub tone_score: u8,
    pub alignment: Alignment,
    pub rationale: String,
    pub origin: EnrichmentOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentResult {
    pub narrative: String,
    pub short_summary: String,
    pub region: String,
    pub category: String,
    pub key_points: Vec<String>,
    /// Set only when corroborating text was supplied and the model judged it.
    pub corroborated: Option<bool>,
    pub origin: EnrichmentOrigin,
}

/// What the enricher sees of an event.
#[derive(Debug, Clone)]
pub struct EnrichInput {
    pub title: String,
    pub date: NaiveDate,
    pub text: String,
    pub sources: Vec<String>,
    /// Member titles (lead first).
    pub titles: Vec<String>,
    pub corroborating: Option<String>,
}

impl EnrichInput {
    pub fn new(title: impl Into<String>, date: NaiveDate, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            date,
            text: text.into(),
            sources: Vec::new(),
            titles: Vec::new(),
            corroborating: None,
        }
    }

    pub fn from_group(group: &ArticleGroup) -> Self {
        let lead = group.lead();
        Self {
            title: lead.title.clone(),
            date: lead.published_date,
            text: group.combined_text(),
            sources: group.source_names(),
            titles: group.titles(),
            corroborating: None,
        }
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_corroborating(mut self, text: impl Into<String>) -> Self {
        let t = text.into();
        self.corroborating = (!t.trim().is_empty()).then_some(t);
        self
    }
}

// ---- raw model replies ----

#[derive(Debug, Deserialize)]
struct RawEnrichment {
    #[serde(default)]
    narrative: String,
    #[serde(default, alias = "summary")]
    short_summary: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    corroborated: Option<bool>,
}

fn default_tone() -> f64 {
    50.0
}

#[derive(Debug, Deserialize)]
struct RawBias {
    #[serde(default)]
    bias_score: f64,
    #[serde(default = "default_tone")]
    tone_score: f64,
    #[serde(default)]
    alignment: String,
    #[serde(default)]
    rationale: String,
}

const ENRICH_SYSTEM: &str = "You are a careful news editor. Reply with a single JSON object only.";
const BIAS_SYSTEM: &str =
    "You assess media bias and tone. Reply with a single JSON object only, no prose.";

pub struct Enricher {
    generator: DynGenerator,
    retry: RetryPolicy,
    inter_call_delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Enricher {
    pub fn new(generator: DynGenerator, retry: RetryPolicy) -> Self {
        Self {
            generator,
            retry,
            inter_call_delay: Duration::ZERO,
            last_call: Mutex::new(None),
        }
    }

    /// Minimum spacing between consecutive generative calls.
    pub fn with_inter_call_delay(mut self, delay: Duration) -> Self {
        self.inter_call_delay = delay;
        self
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    pub async fn enrich(&self, input: &EnrichInput) -> EnrichmentResult {
        let fallback = heuristic::enrichment(input);
        let prompt = Prompt::json(ENRICH_SYSTEM, enrich_prompt(input));

        let Some(raw) = self.call_json::<RawEnrichment>(&prompt, "enrich").await else {
            metrics::counter!("enrich_fallback_total").increment(1);
            return fallback;
        };

        let context = format!("{} {}", input.title, raw.narrative);
        let narrative = non_empty(raw.narrative, fallback.narrative);
        let short_summary = heuristic::truncate_words(
            &non_empty(raw.short_summary, fallback.short_summary),
            heuristic::SUMMARY_MAX_CHARS,
        );
        let key_points: Vec<String> = raw
            .key_points
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .take(5)
            .collect();

        EnrichmentResult {
            narrative,
            short_summary,
            region: non_empty(raw.region, fallback.region),
            category: heuristic::canonical_category(&raw.category, &context).to_string(),
            key_points: if key_points.is_empty() {
                fallback.key_points
            } else {
                key_points
            },
            corroborated: input.corroborating.as_ref().and(raw.corroborated),
            origin: EnrichmentOrigin::Generated,
        }
    }

    pub async fn analyze_bias(&self, narrative: &str, sources: &[String]) -> BiasAssessment {
        let prompt = Prompt::json(BIAS_SYSTEM, bias_prompt(narrative, sources)).max_tokens(400);
        match self.call_json::<RawBias>(&prompt, "bias").await {
            Some(raw) => BiasAssessment {
                bias_score: clamp_round(raw.bias_score, -100.0, 100.0) as i32,
                tone_score: clamp_round(raw.tone_score, 0.0, 100.0) as u8,
                alignment: Alignment::parse(&raw.alignment),
                rationale: raw.rationale.trim().to_string(),
                origin: EnrichmentOrigin::Generated,
            },
            None => {
                metrics::counter!("enrich_fallback_total").increment(1);
                heuristic::bias()
            }
        }
    }

    async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.inter_call_delay;
            let now = Instant::now();
            if ready > now {
                tokio::time::sleep(ready - now).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Call the generator until a reply parses as `T`, or attempts run out.
    async fn call_json<T: DeserializeOwned>(&self, prompt: &Prompt, op: &'static str) -> Option<T> {
        if !self.generator.is_enabled() {
            return None;
        }
        let max = self.retry.max_attempts.max(1);
        for attempt in 1..=max {
            self.pace().await;
            metrics::counter!("enrich_calls_total").increment(1);

            match tokio::time::timeout(self.retry.call_timeout, self.generator.generate(prompt)).await
            {
                Ok(Ok(text)) => match parse::extract_json::<T>(&text) {
                    Some(v) => return Some(v),
                    None => {
                        tracing::warn!(target: "enrich", op, attempt, "unparseable reply");
                        self.generator.discard(prompt);
                    }
                },
                Ok(Err(e)) if !e.is_retryable() => {
                    tracing::info!(target: "enrich", op, error = %e, "generator unavailable, using heuristic");
                    return None;
                }
                Ok(Err(e)) => {
                    tracing::warn!(target: "enrich", op, attempt, error = %e, "generator error");
                }
                Err(_) => {
                    tracing::warn!(
                        target: "enrich",
                        op,
                        attempt,
                        timeout_ms = self.retry.call_timeout.as_millis() as u64,
                        "generator timed out"
                    );
                }
            }

            if attempt < max {
                metrics::counter!("enrich_retries_total").increment(1);
                tokio::time::sleep(self.retry.backoff_for(attempt)).await;
            }
        }
        tracing::warn!(target: "enrich", op, attempts = max, "giving up, using heuristic");
        None
    }
}

fn non_empty(s: String, fallback: String) -> String {
    if s.trim().is_empty() {
        fallback
    } else {
        s.trim().to_string()
    }
}

fn clamp_round(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_finite() {
        v.round().clamp(lo, hi)
    } else {
        0.0f64.clamp(lo, hi)
    }
}

fn enrich_prompt(input: &EnrichInput) -> String {
    let mut p = format!(
        "Event: {}\nDate: {}\nSources: {}\n\nReports:\n{}\n\n",
        input.title,
        input.date.format("%Y-%m-%d"),
        if input.sources.is_empty() {
            "unknown".to_string()
        } else {
            input.sources.join(", ")
        },
        heuristic::truncate_chars(&input.text, 6000),
    );
    if let Some(c) = &input.corroborating {
        p.push_str(&format!(
            "Previously stored description:\n{}\n\n",
            heuristic::truncate_chars(c, 2000)
        ));
    }
    p.push_str(
        "Return JSON with keys: \"narrative\" (3-6 factual paragraphs), \"short_summary\" \
         (one sentence, max 280 characters), \"region\", \"category\" (one of War, Politics, \
         Science, Technology, Environment, Economy, Culture, Medicine, Space, Human Rights, \
         World), \"key_points\" (up to 5 strings)",
    );
    if input.corroborating.is_some() {
        p.push_str(
            ", \"corroborated\" (true if the reports support the stored description)",
        );
    }
    p.push('.');
    p
}

fn bias_prompt(narrative: &str, sources: &[String]) -> String {
    format!(
        "Sources: {}\n\nText:\n{}\n\nReturn JSON with keys: \"bias_score\" (-100 left to 100 \
         right), \"tone_score\" (0 calm to 100 inflammatory), \"alignment\" (Left, Right, \
         Neutral or State), \"rationale\" (one sentence).",
        sources.join(", "),
        heuristic::truncate_chars(narrative, 4000),
    )
}
