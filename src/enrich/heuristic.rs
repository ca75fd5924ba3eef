// src/enrich/heuristic.rs
//! Deterministic enrichment used when the generative service is off or unusable.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Alignment, BiasAssessment, EnrichInput, EnrichmentOrigin, EnrichmentResult};

pub const NARRATIVE_MAX_CHARS: usize = 2000;
pub const SUMMARY_MAX_CHARS: usize = 280;
pub const DEFAULT_REGION: &str = "Global";
pub const DEFAULT_CATEGORY: &str = "World";

/// Ordered keyword table; the first matching row wins.
static CATEGORY_TABLE: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        (
            "War",
            r"\b(wars?|battles?|invasion|invades?|troops|military|army|siege|airstrikes?|ceasefire|armistice|bombing)\b",
        ),
        (
            "Politics",
            r"\b(elections?|president|parliament|senate|government|minister|treaty|votes?|referendum|congress|coup|budget bill)\b",
        ),
        (
            "Science",
            r"\b(scientists?|discovery|discovers?|research|physics|chemistry|experiment|nobel|fossil)\b",
        ),
        (
            "Technology",
            r"\b(technology|computers?|internet|software|artificial intelligence|robots?|smartphones?|semiconductors?|chips?)\b",
        ),
        (
            "Environment",
            r"\b(climate|earthquakes?|floods?|flooding|flooded|hurricanes?|wildfires?|volcano|volcanic|tsunami|pollution|emissions|drought)\b",
        ),
        (
            "Economy",
            r"\b(economy|economic|markets?|stocks?|inflation|banks?|trade|gdp|recession|budget|tariffs?)\b",
        ),
        (
            "Culture",
            r"\b(films?|music|art|festival|museum|olympics?|olympic games|novel|album|championship|world cup)\b",
        ),
        (
            "Medicine",
            r"\b(vaccines?|disease|pandemic|epidemic|hospitals?|virus|outbreak|health|medical|surgery)\b",
        ),
        (
            "Space",
            r"\b(nasa|rockets?|satellites?|moon|mars|orbit|astronauts?|spacecraft|space station|rover)\b",
        ),
        (
            "Human Rights",
            r"\b(human rights|civil rights|protests?|refugees?|discrimination|freedom|genocide|asylum)\b",
        ),
    ]
    .into_iter()
    .filter_map(|(name, pat)| {
        Regex::new(&format!("(?i){pat}"))
            .ok()
            .map(|re| (name, re))
    })
    .collect()
});

/// Category from free text using the ordered keyword table, else `World`.
pub fn categorize(text: &str) -> &'static str {
    CATEGORY_TABLE
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(name, _)| *name)
        .unwrap_or(DEFAULT_CATEGORY)
}

/// Map a model-provided category onto the table. Exact names pass through; anything
/// else is run through the keyword table, then through `context`.
pub fn canonical_category(raw: &str, context: &str) -> &'static str {
    let raw = raw.trim();
    if let Some((name, _)) = CATEGORY_TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw))
    {
        return name;
    }
    if raw.eq_ignore_ascii_case(DEFAULT_CATEGORY) {
        return DEFAULT_CATEGORY;
    }
    match categorize(raw) {
        DEFAULT_CATEGORY => categorize(context),
        c => c,
    }
}

/// First `max` chars (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => s[..i].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// At most `max` chars, cut at the last word boundary; an ellipsis marks the cut.
pub fn truncate_words(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        return s.to_string();
    }
    // Leave room for the ellipsis.
    let end = s
        .char_indices()
        .nth(max.saturating_sub(1))
        .map_or(s.len(), |(i, _)| i);
    let head = &s[..end];
    let at_boundary = s[end..].chars().next().map_or(true, char::is_whitespace);
    let cut = if at_boundary {
        head.trim_end()
    } else {
        match head.rfind(char::is_whitespace) {
            Some(i) if i > 0 => head[..i].trim_end(),
            _ => head,
        }
    };
    format!("{cut}…")
}

pub fn enrichment(input: &EnrichInput) -> EnrichmentResult {
    let body = if input.text.trim().is_empty() {
        input.title.as_str()
    } else {
        input.text.as_str()
    };

    let mut key_points: Vec<String> = Vec::new();
    for t in std::iter::once(&input.title).chain(input.titles.iter()) {
        if key_points.len() == 3 {
            break;
        }
        if !t.trim().is_empty() && !key_points.iter().any(|k| k.eq_ignore_ascii_case(t)) {
            key_points.push(t.clone());
        }
    }

    EnrichmentResult {
        narrative: truncate_chars(body, NARRATIVE_MAX_CHARS),
        short_summary: truncate_words(body, SUMMARY_MAX_CHARS),
        region: DEFAULT_REGION.to_string(),
        category: categorize(&format!("{} {}", input.title, input.text)).to_string(),
        key_points,
        corroborated: None,
        origin: EnrichmentOrigin::Heuristic,
    }
}

pub fn bias() -> BiasAssessment {
    BiasAssessment {
        bias_score: 0,
        tone_score: 50,
        alignment: Alignment::Neutral,
        rationale: "heuristic".to_string(),
        origin: EnrichmentOrigin::Heuristic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_decides_ties() {
        // Both Politics ("senate") and Economy ("budget") match; Politics is earlier.
        assert_eq!(categorize("Senate passes new budget"), "Politics");
        assert_eq!(categorize("NASA launches new Mars rover"), "Space");
        assert_eq!(categorize("Troops cross the border"), "War");
        assert_eq!(categorize("A quiet day"), "World");
    }

    #[test]
    fn whole_words_only() {
        // "art" inside "start" must not count as Culture.
        assert_eq!(categorize("Start of something"), "World");
    }

    #[test]
    fn canonical_category_maps_unknowns() {
        assert_eq!(canonical_category("politics", ""), "Politics");
        assert_eq!(canonical_category("Armed conflict / war", ""), "War");
        assert_eq!(canonical_category("Misc", "an earthquake struck"), "Environment");
        assert_eq!(canonical_category("Misc", "nothing"), "World");
    }

    #[test]
    fn truncate_words_respects_boundary() {
        let s = "alpha beta gamma delta";
        let t = truncate_words(s, 12);
        assert_eq!(t, "alpha beta…");
        assert!(t.chars().count() <= 12);
        assert_eq!(truncate_words("short", 12), "short");
    }

    #[test]
    fn heuristic_is_never_empty() {
        let input = EnrichInput::new("Volcano erupts", chrono::NaiveDate::MIN, "");
        let e = enrichment(&input);
        assert_eq!(e.narrative, "Volcano erupts");
        assert_eq!(e.short_summary, "Volcano erupts");
        assert_eq!(e.region, "Global");
        assert_eq!(e.category, "Environment");
        assert_eq!(e.origin, EnrichmentOrigin::Heuristic);
    }
}
