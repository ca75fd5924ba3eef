// src/enrich/parse.rs
use serde::de::DeserializeOwned;

/// Parse a JSON object out of a model reply.
///
/// Order: the reply as-is, then with Markdown code fences removed, then the outermost
/// `{…}` substring. `None` when none of them parse.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<T>(trimmed) {
        return Some(v);
    }

    let unfenced = strip_fences(trimmed);
    if unfenced != trimmed {
        if let Ok(v) = serde_json::from_str::<T>(unfenced) {
            return Some(v);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<T>(&trimmed[start..=end]).ok()
}

fn strip_fences(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Drop the info string ("json") up to the first newline.
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
