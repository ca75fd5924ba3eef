// src/generative/cache.rs
//! Response cache + daily call ceiling around any [`TextGenerator`].
//!
//! Cache hits never count against the daily limit; only successful real calls do.
//! A reply the caller rejects via [`TextGenerator::discard`] is removed from the cache.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{GenerationError, Prompt, ResponseFormat, TextGenerator};

pub struct CachingGenerator<G: TextGenerator> {
    inner: G,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<G: TextGenerator> CachingGenerator<G> {
    pub fn new(inner: G, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir); // best-effort
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    pub fn calls_today(&self) -> u32 {
        self.counter.lock().unwrap_or_else(|e| e.into_inner()).count
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for CachingGenerator<G> {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        // 1) Cache lookup.
        let key = cache_key(prompt);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            metrics::counter!("enrich_cache_hits_total").increment(1);
            return Ok(hit.text);
        }

        // 2) Daily limit.
        {
            let mut g = self.counter.lock().unwrap_or_else(|e| e.into_inner());
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                return Err(GenerationError::DailyLimit(self.daily_limit_max));
            }
        }

        // 3) Real call.
        let text = self.inner.generate(prompt).await?;
        let _ = write_cache_file(&self.cache_dir, &key, &CachedReply { text: text.clone() });
        let mut g = self.counter.lock().unwrap_or_else(|e| e.into_inner());
        g.count = g.count.saturating_add(1);
        let _ = save_daily_counter(&self.cache_dir, &g);
        Ok(text)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    fn discard(&self, prompt: &Prompt) {
        let path = cache_path(&self.cache_dir, &cache_key(prompt));
        if fs::remove_file(&path).is_ok() {
            tracing::debug!(target: "enrich", path = %path.display(), "discarded cached reply");
        }
        self.inner.discard(prompt);
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedReply {
    text: String,
}

fn cache_key(prompt: &Prompt) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.system.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.user.as_bytes());
    hasher.update([match prompt.format {
        ResponseFormat::Text => b't',
        ResponseFormat::JsonObject => b'j',
    }]);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<CachedReply> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&s).ok()
}

fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(contents.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

fn write_cache_file(dir: &Path, key: &str, value: &CachedReply) -> io::Result<()> {
    let json = serde_json::to_string(value).map_err(io::Error::other)?;
    write_atomic(&cache_path(dir, key), &json)
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let s = serde_json::to_string(dc).map_err(io::Error::other)?;
    write_atomic(&counter_path(dir), &s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generative::{MockGenerator, MockReply};

    #[tokio::test]
    async fn cache_hit_skips_inner_and_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let gen = CachingGenerator::new(MockGenerator::fixed("{}"), tmp.path().to_path_buf(), 1);
        let p = Prompt::json("sys", "same input");

        assert_eq!(gen.generate(&p).await.unwrap(), "{}");
        assert_eq!(gen.calls_today(), 1);
        // Second identical prompt is served from disk even though the limit is reached.
        assert_eq!(gen.generate(&p).await.unwrap(), "{}");
        assert_eq!(gen.inner.calls(), 1);

        let other = Prompt::json("sys", "different input");
        assert!(matches!(
            gen.generate(&other).await,
            Err(GenerationError::DailyLimit(1))
        ));
    }

    #[tokio::test]
    async fn discarded_reply_is_fetched_again() {
        let tmp = tempfile::tempdir().unwrap();
        let gen = CachingGenerator::new(
            MockGenerator::scripted(
                vec![MockReply::Text("garbled".into())],
                MockReply::Text("{}".into()),
            ),
            tmp.path().to_path_buf(),
            10,
        );
        let p = Prompt::json("sys", "input");

        assert_eq!(gen.generate(&p).await.unwrap(), "garbled");
        gen.discard(&p);
        assert_eq!(gen.generate(&p).await.unwrap(), "{}");
        // Accepted reply stays cached.
        assert_eq!(gen.generate(&p).await.unwrap(), "{}");
        assert_eq!(gen.inner.calls(), 2);
        assert_eq!(gen.calls_today(), 2);
    }

    #[test]
    fn cache_key_depends_on_format() {
        let a = Prompt::json("s", "u");
        let mut b = a.clone();
        b.format = ResponseFormat::Text;
        assert_ne!(cache_key(&a), cache_key(&b));
        assert_eq!(cache_key(&a).len(), 32);
    }
}
