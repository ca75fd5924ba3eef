// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::ingest::types::{Article, ArticleProvider, Query};
use metrics::{counter, histogram};
use strsim::normalized_levenshtein;

/// Titles from the same source at or above this similarity are treated as re-posts.
pub const NEAR_DUPLICATE_SIMILARITY: f64 = 0.95;

const BODY_MAX_CHARS: usize = 5000;
const TITLE_MAX_CHARS: usize = 300;

/// Normalize body text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > BODY_MAX_CHARS {
        out = out.chars().take(BODY_MAX_CHARS).collect();
    }
    out
}

/// Same as [`normalize_text`], plus trailing sentence punctuation removal and a shorter cap.
pub fn normalize_title(s: &str) -> String {
    let mut out = normalize_text(s);
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',' | ':' | ';') {
            out.pop();
        } else {
            break;
        }
    }
    if out.chars().count() > TITLE_MAX_CHARS {
        out = out.chars().take(TITLE_MAX_CHARS).collect();
    }
    out.trim_end().to_string()
}

/// Fan out to every provider that supports `query`, wait for all of them, and return the
/// union of what came back. A provider that fails contributes nothing; it never aborts
/// the collection.
pub async fn collect(query: &Query, providers: &[Box<dyn ArticleProvider>]) -> Vec<Article> {
    crate::metrics::ensure_described();

    let fetches = providers
        .iter()
        .filter(|p| p.supports(query))
        .map(|p| async move {
            let t0 = std::time::Instant::now();
            let articles = p.fetch(query).await;
            let ms = t0.elapsed().as_secs_f64() * 1_000.0;
            (p.name(), articles, ms)
        });
    let results = futures::future::join_all(fetches).await;

    let mut raw = Vec::new();
    for (name, articles, ms) in results {
        histogram!("collect_fetch_ms").record(ms);
        tracing::debug!(target: "collect", provider = name, count = articles.len(), ms, "provider settled");
        raw.extend(articles);
    }

    let before = raw.len();
    raw.retain(Article::is_valid);
    let out = suppress_near_duplicates(raw);

    counter!("collect_articles_total").increment(out.len() as u64);
    tracing::info!(
        target: "collect",
        query = %query.label(),
        kept = out.len(),
        dropped = before - out.len(),
        "collection finished"
    );
    out
}

/// Drop re-posts: a later article from the same source whose title is nearly identical to
/// one already kept. Order is preserved.
pub fn suppress_near_duplicates(articles: Vec<Article>) -> Vec<Article> {
    let mut keep: Vec<Article> = Vec::with_capacity(articles.len());
    for a in articles {
        let title = a.title.to_lowercase();
        let dup = keep.iter().any(|k| {
            k.source_name.eq_ignore_ascii_case(&a.source_name)
                && normalized_levenshtein(&k.title.to_lowercase(), &title)
                    >= NEAR_DUPLICATE_SIMILARITY
        });
        if dup {
            counter!("collect_duplicates_total").increment(1);
            continue;
        }
        keep.push(a);
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn art(source: &str, title: &str) -> Article {
        Article {
            title: title.into(),
            body_text: String::new(),
            published_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            source_name: source.into(),
            source_url: format!("https://{}.example/a", source.to_lowercase()),
            image_url: None,
            origin_year: None,
        }
    }

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <p>Hello,&nbsp;&nbsp;<b>world</b></p>  ";
        assert_eq!(normalize_text(s), "Hello, world");
    }

    #[test]
    fn normalize_title_drops_trailing_punct() {
        assert_eq!(normalize_title("Quake strikes!!! "), "Quake strikes");
        assert_eq!(normalize_title("&ldquo;Deal&rdquo; reached."), "\"Deal\" reached");
    }

    #[test]
    fn near_duplicates_only_within_same_source() {
        let out = suppress_near_duplicates(vec![
            art("Reuters", "Flooding hits coastal city"),
            art("Reuters", "Flooding hits coastal city."),
            art("AP", "Flooding hits coastal city"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].source_name, "AP");
    }
}
