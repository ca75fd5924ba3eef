//! # Source Reputation
//!
//! Static mapping from known sources (names or domains) to an additive credibility bonus.
//!
//! - Loads from JSON config (bonuses + aliases).
//! - Case-insensitive lookup; punctuation, dashes and dots are normalized to spaces, so
//!   `apnews.com` and `AP News` normalize the same way.
//! - Fallback order: aliases → exact match → whole-word match → default (0).
//! - Includes a built-in `default_seed()`: wire services and standards bodies get the
//!   largest bonus, major outlets a medium one, reference works a small one.

use serde::Deserialize;
use std::{cmp::Reverse, collections::HashMap, fs, path::Path};

/// Reputation table, loaded from JSON or defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ReputationTable {
    /// Bonus for sources with no entry.
    #[serde(default)]
    pub default_bonus: i32,
    /// Bonus per canonical source name.
    #[serde(default)]
    pub bonuses: HashMap<String, i32>,
    /// Alternative spellings/domains → canonical names.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Default for ReputationTable {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl ReputationTable {
    /// Load from a JSON file. Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<ReputationTable>(&s) {
                Ok(t) => t.normalized(),
                Err(e) => {
                    tracing::warn!(target: "score", path = %path.display(), error = %e, "invalid reputation table, using seed");
                    Self::default_seed()
                }
            },
            Err(_) => Self::default_seed(),
        }
    }

    /// Keys in config files may use any casing/punctuation.
    fn normalized(self) -> Self {
        Self {
            default_bonus: self.default_bonus.max(0),
            bonuses: self
                .bonuses
                .into_iter()
                .map(|(k, v)| (normalize(&k), v.max(0)))
                .collect(),
            aliases: self
                .aliases
                .into_iter()
                .map(|(k, v)| (normalize(&k), normalize(&v)))
                .collect(),
        }
    }

    /// Bonus for a source name or domain.
    pub fn bonus_for(&self, source: &str) -> i32 {
        let s = normalize(source);
        if s.is_empty() {
            return self.default_bonus;
        }

        // 1) Alias resolution.
        if let Some(canon) = self.aliases.get(&s) {
            if let Some(&b) = self.bonuses.get(canon) {
                return b;
            }
        }

        // 2) Exact match.
        if let Some(&b) = self.bonuses.get(&s) {
            return b;
        }

        // 3) Whole-word match, longest key first so "new york times" beats "times".
        // Equal lengths: higher bonus, then the lexically smaller key.
        let padded = format!(" {s} ");
        let mut best: Option<(usize, i32, Reverse<&str>)> = None;
        for (k, &b) in self.bonuses.iter().chain(
            self.aliases
                .iter()
                .filter_map(|(a, c)| self.bonuses.get(c).map(|b| (a, b))),
        ) {
            if !padded.contains(&format!(" {k} ")) {
                continue;
            }
            let cand = (k.len(), b, Reverse(k.as_str()));
            if best.as_ref().map_or(true, |cur| cand > *cur) {
                best = Some(cand);
            }
        }
        if let Some((_, b, _)) = best {
            return b;
        }

        self.default_bonus
    }

    pub fn is_reputable(&self, source: &str) -> bool {
        self.bonus_for(source) > 0
    }

    /// Built-in seed used when no config is found.
    pub fn default_seed() -> Self {
        let mut bonuses = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            // Wire services and standards bodies.
            ("reuters", 15),
            ("associated press", 15),
            ("agence france presse", 15),
            ("united nations", 15),
            ("world health organization", 15),
            ("nasa", 15),
            ("european space agency", 15),
            ("usgs", 15),
            ("noaa", 15),
            // Major international outlets.
            ("bbc", 8),
            ("the guardian", 8),
            ("new york times", 8),
            ("washington post", 8),
            ("al jazeera", 8),
            ("npr", 8),
            ("financial times", 8),
            ("wall street journal", 8),
            ("bloomberg", 8),
            ("the economist", 8),
            ("deutsche welle", 8),
            ("le monde", 8),
            // Reference works.
            ("wikipedia", 10),
            ("britannica", 10),
        ] {
            bonuses.insert(k.to_string(), v);
        }

        for (a, c) in [
            ("ap", "associated press"),
            ("ap news", "associated press"),
            ("apnews com", "associated press"),
            ("afp", "agence france presse"),
            ("un news", "united nations"),
            ("esa", "european space agency"),
            ("u s geological survey", "usgs"),
            ("bbc news", "bbc"),
            ("bbc co uk", "bbc"),
            ("guardian", "the guardian"),
            ("theguardian com", "the guardian"),
            ("nyt", "new york times"),
            ("nytimes com", "new york times"),
            ("the new york times", "new york times"),
            ("ft", "financial times"),
            ("wsj", "wall street journal"),
            ("aljazeera com", "al jazeera"),
            ("dw", "deutsche welle"),
            ("en wikipedia org", "wikipedia"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_bonus: 0,
            bonuses,
            aliases,
        }
    }
}

/// Lowercase, replace punctuation/dashes/dots with spaces, collapse spaces.
pub(crate) fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\', '.', ',', '\'', '’', ':'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(['\n', '\r', '\t'], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ReputationTable {
        ReputationTable::default_seed()
    }

    #[test]
    fn exact_and_case_insensitive() {
        let t = table();
        assert_eq!(t.bonus_for("Reuters"), 15);
        assert_eq!(t.bonus_for("REUTERS"), 15);
    }

    #[test]
    fn alias_and_domain() {
        let t = table();
        assert_eq!(t.bonus_for("AP"), 15);
        assert_eq!(t.bonus_for("apnews.com"), 15);
        assert_eq!(t.bonus_for("The Guardian"), 8);
        assert_eq!(t.bonus_for("theguardian.com"), 8);
    }

    #[test]
    fn whole_word_only() {
        let t = table();
        // "ap" must not match inside "japan".
        assert_eq!(t.bonus_for("Japan Today"), 0);
        assert_eq!(t.bonus_for("BBC World Service"), 8);
    }

    #[test]
    fn equal_length_word_matches_break_ties_deterministically() {
        // Each table gets a fresh hasher seed, so iteration order varies between rounds.
        for _ in 0..32 {
            let bonuses: HashMap<String, i32> = [("star", 4), ("post", 9), ("mail", 6)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            let t = ReputationTable {
                default_bonus: 0,
                bonuses,
                aliases: HashMap::new(),
            };
            assert_eq!(t.bonus_for("Star Post"), 9);
            assert_eq!(t.bonus_for("Morning Star Mail"), 6);
        }
    }

    #[test]
    fn unknown_sources_get_nothing() {
        let t = table();
        assert_eq!(t.bonus_for("WireServiceA"), 0);
        assert!(!t.is_reputable("Some Blog"));
        assert_eq!(t.bonus_for(""), 0);
    }
}
