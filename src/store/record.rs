// src/store/record.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::enrich::BiasAssessment;

pub const SLUG_MAX_CHARS: usize = 120;

/// Lowercase; keep alphanumerics, hyphens and spaces; whitespace runs and repeated
/// hyphens become one hyphen; no leading/trailing hyphen; at most 120 chars.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else if c == '-' || c.is_whitespace() {
            pending_hyphen = true;
        }
    }

    if let Some((i, _)) = out.char_indices().nth(SLUG_MAX_CHARS) {
        out.truncate(i);
    }
    let out = out.trim_end_matches('-');
    if out.is_empty() {
        "event".to_string()
    } else {
        out.to_string()
    }
}

/// Content-addressed id: `slug(title)-YYYY-MM-DD`.
pub fn event_id(title: &str, date: NaiveDate) -> String {
    format!("{}-{}", slugify(title), date.format("%Y-%m-%d"))
}

/// State of a record before it was revised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub updated_at: DateTime<Utc>,
    pub narrative_snapshot: String,
    pub credibility_score_snapshot: u8,
    pub sources_snapshot: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    /// Short summary.
    pub description: String,
    /// Narrative.
    pub long_description: String,
    pub date: NaiveDate,
    pub region: String,
    pub category: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    pub sources: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub credibility_score: u8,
    #[serde(default)]
    pub agreement_ratio: f64,
    pub verified: bool,
    pub flagged: bool,
    /// On-this-day event; exempt from the stale factor when re-scored.
    #[serde(default)]
    pub historical: bool,
    #[serde(default)]
    pub bias: Option<BiasAssessment>,
    #[serde(default)]
    pub revisions: Vec<Revision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub added_by: String,
}

/// Freshly computed state for an event, not yet reconciled with storage.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub title: String,
    pub date: NaiveDate,
    pub description: String,
    pub long_description: String,
    pub region: String,
    pub category: String,
    pub key_points: Vec<String>,
    pub sources: Vec<String>,
    pub links: Vec<String>,
    pub image_url: Option<String>,
    pub credibility_score: u8,
    pub agreement_ratio: f64,
    pub verified: bool,
    pub flagged: bool,
    pub historical: bool,
    pub bias: Option<BiasAssessment>,
}

fn union_ci(base: &[String], extra: &[String]) -> Vec<String> {
    let mut out = base.to_vec();
    for s in extra {
        if !out.iter().any(|o| o.eq_ignore_ascii_case(s)) {
            out.push(s.clone());
        }
    }
    out
}

impl EventRecord {
    pub fn create(id: String, draft: RecordDraft, now: DateTime<Utc>, added_by: &str) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            long_description: draft.long_description,
            date: draft.date,
            region: draft.region,
            category: draft.category,
            key_points: draft.key_points,
            sources: union_ci(&[], &draft.sources),
            links: union_ci(&[], &draft.links),
            image_url: draft.image_url,
            credibility_score: draft.credibility_score.min(100),
            agreement_ratio: draft.agreement_ratio,
            verified: draft.verified,
            flagged: draft.flagged,
            historical: draft.historical,
            bias: draft.bias,
            revisions: Vec::new(),
            created_at: now,
            updated_at: now,
            added_by: added_by.to_string(),
        }
    }

    /// Current state as a draft; maintenance passes tweak a few fields and revise.
    pub fn to_draft(&self) -> RecordDraft {
        RecordDraft {
            title: self.title.clone(),
            date: self.date,
            description: self.description.clone(),
            long_description: self.long_description.clone(),
            region: self.region.clone(),
            category: self.category.clone(),
            key_points: self.key_points.clone(),
            sources: self.sources.clone(),
            links: self.links.clone(),
            image_url: self.image_url.clone(),
            credibility_score: self.credibility_score,
            agreement_ratio: self.agreement_ratio,
            verified: self.verified,
            flagged: self.flagged,
            historical: self.historical,
            bias: self.bias.clone(),
        }
    }

    /// Apply `draft` on top of this record. `None` when nothing material changed
    /// (narrative, score, source set, bias, verified/flagged).
    ///
    /// Otherwise the previous narrative/score/sources are appended as a [`Revision`]
    /// stamped with the previous `updated_at`; `id`, `title`, `date`, `created_at` and
    /// `added_by` are kept.
    pub fn revise(&self, draft: RecordDraft, now: DateTime<Utc>) -> Option<Self> {
        let sources = union_ci(&self.sources, &draft.sources);
        let narrative = if draft.long_description.trim().is_empty() {
            self.long_description.clone()
        } else {
            draft.long_description
        };
        let bias = draft.bias.or_else(|| self.bias.clone());
        let score = draft.credibility_score.min(100);

        let changed = narrative != self.long_description
            || score != self.credibility_score
            || sources.len() != self.sources.len()
            || bias != self.bias
            || draft.verified != self.verified
            || draft.flagged != self.flagged;
        if !changed {
            return None;
        }

        let mut next = self.clone();
        next.revisions.push(Revision {
            updated_at: self.updated_at,
            narrative_snapshot: self.long_description.clone(),
            credibility_score_snapshot: self.credibility_score,
            sources_snapshot: self.sources.clone(),
        });
        next.long_description = narrative;
        if !draft.description.trim().is_empty() {
            next.description = draft.description;
        }
        if !draft.region.trim().is_empty() {
            next.region = draft.region;
        }
        if !draft.category.trim().is_empty() {
            next.category = draft.category;
        }
        if !draft.key_points.is_empty() {
            next.key_points = draft.key_points;
        }
        next.sources = sources;
        next.links = union_ci(&self.links, &draft.links);
        next.image_url = draft.image_url.or_else(|| self.image_url.clone());
        next.credibility_score = score;
        next.agreement_ratio = draft.agreement_ratio;
        next.verified = draft.verified;
        next.flagged = draft.flagged;
        next.historical = self.historical || draft.historical;
        next.bias = bias;
        next.updated_at = now.max(self.updated_at);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, h, 0, 0).unwrap()
    }

    fn draft() -> RecordDraft {
        RecordDraft {
            title: "Quake hits coast".into(),
            date: d(2024, 5, 1),
            description: "A quake.".into(),
            long_description: "A strong quake hit the coast.".into(),
            region: "Global".into(),
            category: "Environment".into(),
            key_points: vec!["Quake hits coast".into()],
            sources: vec!["A".into()],
            links: vec!["https://a.test/1".into()],
            image_url: None,
            credibility_score: 70,
            agreement_ratio: 0.0,
            verified: false,
            flagged: false,
            historical: false,
            bias: None,
        }
    }

    #[test]
    fn slug_rules() {
        assert_eq!(slugify("NASA's  New Rover -- Launches!"), "nasas-new-rover-launches");
        assert_eq!(slugify("  --Hello   World--  "), "hello-world");
        assert_eq!(slugify("!!!"), "event");
        assert_eq!(slugify(""), "event");
        let long = "word ".repeat(60);
        let s = slugify(&long);
        assert!(s.chars().count() <= SLUG_MAX_CHARS);
        assert!(!s.ends_with('-'));
    }

    #[test]
    fn id_is_deterministic() {
        let a = event_id("Moon Landing", d(1969, 7, 20));
        assert_eq!(a, "moon-landing-1969-07-20");
        assert_eq!(a, event_id("moon   landing", d(1969, 7, 20)));
    }

    #[test]
    fn unchanged_draft_is_not_a_revision() {
        let r = EventRecord::create("x".into(), draft(), t(1), "test");
        assert!(r.revise(draft(), t(2)).is_none());
        // Already-known source with different casing changes nothing either.
        let mut d2 = draft();
        d2.sources = vec!["a".into()];
        assert!(r.revise(d2, t(2)).is_none());
    }

    #[test]
    fn revisions_append_and_keep_identity() {
        let r0 = EventRecord::create("x".into(), draft(), t(1), "test");

        let mut d1 = draft();
        d1.sources = vec!["B".into()];
        d1.credibility_score = 79;
        let r1 = r0.revise(d1, t(2)).unwrap();
        assert_eq!(r1.sources, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(r1.revisions.len(), 1);
        assert_eq!(r1.revisions[0].credibility_score_snapshot, 70);
        assert_eq!(r1.revisions[0].sources_snapshot, vec!["A".to_string()]);
        assert_eq!(r1.revisions[0].updated_at, t(1));
        assert_eq!(r1.created_at, t(1));
        assert_eq!(r1.updated_at, t(2));

        let mut d2 = draft();
        d2.long_description = "Revised narrative.".into();
        let r2 = r1.revise(d2, t(3)).unwrap();
        assert_eq!(r2.revisions.len(), 2);
        assert_eq!(r2.revisions[..1], r1.revisions[..]);
        assert!(r2.revisions[0].updated_at <= r2.revisions[1].updated_at);
        // Sources are never dropped by a revision.
        assert_eq!(r2.sources.len(), 2);
        assert_eq!(r2.id, "x");
    }

    #[test]
    fn clock_skew_never_moves_updated_at_backwards() {
        let r0 = EventRecord::create("x".into(), draft(), t(5), "test");
        let mut d1 = draft();
        d1.credibility_score = 90;
        let r1 = r0.revise(d1, t(4)).unwrap();
        assert_eq!(r1.updated_at, t(5));
    }

    #[test]
    fn document_roundtrip() {
        let r = EventRecord::create("x".into(), draft(), t(1), "test");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["credibility_score"], 70);
        let back: EventRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }
}
