//! # Credibility scoring
//! Pure, testable mapping from a group of reports to a 0–100 credibility score.
//! No I/O.
//!
//! Policy: a baseline, plus a capped reputation bonus per distinct reputable source,
//! plus a diversity bonus for independent sources (larger for three or more), plus a
//! small agreement bonus, minus a penalty for single-source events. Recent events get a
//! bonus; stale ones are scaled down. With a prior score the result is blended towards
//! it. The final value is clamped to `[0, 100]`.
//!
//! Thresholds are two-tier: the ingest stage accepts at a lower bar than the
//! cross-verification stage requires for `verified`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::grouping::ArticleGroup;
use crate::reputation::{normalize, ReputationTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// First contact with a group: decides whether it is stored at all.
    Ingest,
    /// Later re-scoring of stored records: decides promotion to `verified`.
    CrossVerify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageThresholds {
    /// Minimum score for the group to be kept.
    pub accept: u8,
    /// `verified` when score >= this.
    pub verified: u8,
    /// `flagged` when score < this.
    pub flag_below: u8,
}

impl StageThresholds {
    fn sanitized(mut self) -> Self {
        self.accept = self.accept.min(100);
        self.verified = self.verified.min(100);
        self.flag_below = self.flag_below.min(self.verified);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredibilityPolicy {
    pub baseline: i32,
    pub reputation_cap: i32,
    pub diversity_bonus_two: i32,
    pub diversity_bonus_three: i32,
    pub agreement_weight: f64,
    pub recency_bonus: i32,
    pub freshness_days: i64,
    pub stale_after_days: i64,
    pub stale_factor: f64,
    /// Historical (on-this-day) groups are old by nature and skip the stale factor.
    pub stale_exempt_historical: bool,
    pub single_source_penalty: i32,
    /// Weight of the prior score when re-scoring an existing record.
    pub prior_weight: f64,
    pub ingest: StageThresholds,
    pub cross_verify: StageThresholds,
}

impl Default for CredibilityPolicy {
    fn default() -> Self {
        Self {
            baseline: 60,
            reputation_cap: 20,
            diversity_bonus_two: 10,
            diversity_bonus_three: 15,
            agreement_weight: 5.0,
            recency_bonus: 5,
            freshness_days: 3,
            stale_after_days: 365,
            stale_factor: 0.9,
            stale_exempt_historical: true,
            single_source_penalty: 10,
            prior_weight: 0.3,
            ingest: StageThresholds {
                accept: 60,
                verified: 80,
                flag_below: 40,
            },
            cross_verify: StageThresholds {
                accept: 0,
                verified: 75,
                flag_below: 50,
            },
        }
    }
}

impl CredibilityPolicy {
    /// Clamp weights into sane ranges; keeps `flag_below <= verified`.
    pub fn sanitized(mut self) -> Self {
        self.baseline = self.baseline.clamp(0, 100);
        self.reputation_cap = self.reputation_cap.max(0);
        self.diversity_bonus_two = self.diversity_bonus_two.max(0);
        self.diversity_bonus_three = self.diversity_bonus_three.max(self.diversity_bonus_two);
        self.agreement_weight = self.agreement_weight.max(0.0);
        self.recency_bonus = self.recency_bonus.max(0);
        self.stale_factor = self.stale_factor.clamp(0.0, 1.0);
        self.single_source_penalty = self.single_source_penalty.max(0);
        self.prior_weight = self.prior_weight.clamp(0.0, 1.0);
        self.ingest = self.ingest.sanitized();
        self.cross_verify = self.cross_verify.sanitized();
        self
    }

    pub fn thresholds(&self, stage: Stage) -> StageThresholds {
        match stage {
            Stage::Ingest => self.ingest,
            Stage::CrossVerify => self.cross_verify,
        }
    }
}

/// One source behind an event: a name and, when known, the host it was published on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub name: String,
    pub host: Option<String>,
}

impl SourceRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }
}

/// Everything the scorer looks at.
#[derive(Debug, Clone)]
pub struct ScoringInput {
    pub sources: Vec<SourceRef>,
    pub event_date: NaiveDate,
    pub agreement_ratio: f64,
    pub historical: bool,
}

impl ScoringInput {
    pub fn from_group(group: &ArticleGroup) -> Self {
        Self {
            sources: group
                .articles()
                .iter()
                .map(|a| SourceRef {
                    name: a.source_name.clone(),
                    host: a.source_host(),
                })
                .collect(),
            event_date: group.earliest_published(),
            agreement_ratio: group.agreement_ratio(),
            historical: group.is_historical(),
        }
    }

    /// Add sources already known for the event (e.g. from a stored record).
    pub fn with_known_sources(mut self, names: &[String]) -> Self {
        self.sources.extend(names.iter().map(SourceRef::named));
        self
    }
}

/// Derived per run; never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CredibilityAssessment {
    pub score: u8,
    pub source_count: usize,
    pub agreement_ratio: f64,
    pub recency_days: i64,
    pub verified: bool,
    pub flagged: bool,
    pub accepted: bool,
    pub stage: Stage,
}

#[derive(Debug, Clone)]
pub struct CredibilityScorer {
    policy: CredibilityPolicy,
    reputation: ReputationTable,
}

impl CredibilityScorer {
    pub fn new(policy: CredibilityPolicy, reputation: ReputationTable) -> Self {
        Self {
            policy: policy.sanitized(),
            reputation,
        }
    }

    pub fn policy(&self) -> &CredibilityPolicy {
        &self.policy
    }

    pub fn assess_group(
        &self,
        group: &ArticleGroup,
        prior: Option<u8>,
        stage: Stage,
        today: NaiveDate,
    ) -> CredibilityAssessment {
        self.assess(&ScoringInput::from_group(group), prior, stage, today)
    }

    pub fn assess(
        &self,
        input: &ScoringInput,
        prior: Option<u8>,
        stage: Stage,
        today: NaiveDate,
    ) -> CredibilityAssessment {
        let p = &self.policy;

        // Distinct names (for source_count and reputation) and independent sources
        // (distinct name AND distinct host).
        let mut names = Vec::new();
        let mut seen_names = HashSet::new();
        let mut seen_hosts = HashSet::new();
        let mut independent = 0usize;
        for s in &input.sources {
            let n = normalize(&s.name);
            if n.is_empty() {
                continue;
            }
            let new_name = seen_names.insert(n);
            let new_host = match &s.host {
                Some(h) => seen_hosts.insert(h.clone()),
                None => true,
            };
            if new_name {
                names.push(s.name.as_str());
                if new_host {
                    independent += 1;
                }
            }
        }
        let source_count = names.len();

        let reputation: i32 = names
            .iter()
            .map(|n| self.reputation.bonus_for(n).min(p.reputation_cap))
            .sum::<i32>()
            .min(p.reputation_cap);

        let diversity = match independent {
            0 | 1 => 0,
            2 => p.diversity_bonus_two,
            _ => p.diversity_bonus_three,
        };

        let agreement = input.agreement_ratio.clamp(0.0, 1.0);
        let agreement_bonus = if source_count >= 2 {
            (agreement * p.agreement_weight).round() as i32
        } else {
            0
        };

        let single_penalty = if source_count == 1 {
            p.single_source_penalty
        } else {
            0
        };

        let recency_days = (today - input.event_date).num_days().max(0);
        let recency = if recency_days <= p.freshness_days {
            p.recency_bonus
        } else {
            0
        };

        let mut raw = f64::from(
            p.baseline + reputation + diversity + agreement_bonus + recency - single_penalty,
        );
        if recency_days > p.stale_after_days && !(input.historical && p.stale_exempt_historical) {
            raw *= p.stale_factor;
        }
        if let Some(prior) = prior {
            raw = raw * (1.0 - p.prior_weight) + f64::from(prior) * p.prior_weight;
        }
        let score = raw.round().clamp(0.0, 100.0) as u8;

        let th = p.thresholds(stage);
        let out = CredibilityAssessment {
            score,
            source_count,
            agreement_ratio: agreement,
            recency_days,
            verified: score >= th.verified,
            flagged: score < th.flag_below,
            accepted: score >= th.accept,
            stage,
        };
        tracing::debug!(
            target: "score",
            score,
            source_count,
            independent,
            reputation,
            recency_days,
            ?stage,
            "assessed"
        );
        out
    }
}
