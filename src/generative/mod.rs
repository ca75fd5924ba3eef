//! Generative text service: provider abstraction, disabled/mock clients, and a caching
//! wrapper with a per-day call ceiling.
//!
//! The rest of the crate only sees [`TextGenerator`]; the enricher owns retries and
//! fallbacks.

pub mod cache;
pub mod openai;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

pub use cache::CachingGenerator;
pub use openai::OpenAiGenerator;

use crate::config::ai::GenerativeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// One request to the generative service.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub format: ResponseFormat,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Prompt {
    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ResponseFormat::JsonObject,
            max_tokens: 1200,
            temperature: 0.3,
        }
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generative service disabled")]
    Disabled,
    #[error("daily limit of {0} calls reached")]
    DailyLimit(u32),
    #[error("missing api key for {0}")]
    MissingApiKey(&'static str),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited by generative service")]
    RateLimited,
    #[error("generative service returned status {0}")]
    Status(u16),
    #[error("empty response")]
    Empty,
    #[error("{0}")]
    Other(String),
}

impl GenerationError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Disabled
            | GenerationError::DailyLimit(_)
            | GenerationError::MissingApiKey(_) => false,
            GenerationError::Status(code) => *code >= 500,
            GenerationError::Http(_)
            | GenerationError::RateLimited
            | GenerationError::Empty
            | GenerationError::Other(_) => true,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
    /// `false` for clients that never call out; callers skip rate-limit delays for them.
    fn is_enabled(&self) -> bool {
        true
    }
    /// The caller could not use the reply to `prompt`; drop any stored copy so the next
    /// attempt reaches the service.
    fn discard(&self, _prompt: &Prompt) {}
}

pub type DynGenerator = Arc<dyn TextGenerator>;

/// Always fails with [`GenerationError::Disabled`]; used when AI is turned off.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

/// Scripted reply for [`MockGenerator`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(String),
    /// Sleep, then answer; used to exercise per-call timeouts.
    Delayed(Duration, String),
}

/// Deterministic generator for tests and local runs. Replies come from the script in
/// order; once it is exhausted the fallback reply repeats.
pub struct MockGenerator {
    script: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    calls: AtomicUsize,
}

impl MockGenerator {
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::scripted(Vec::new(), MockReply::Text(text.into()))
    }

    pub fn scripted(replies: Vec<MockReply>, fallback: MockReply) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut q = self.script.lock().unwrap_or_else(|e| e.into_inner());
            q.pop_front().unwrap_or_else(|| self.fallback.clone())
        };
        match next {
            MockReply::Text(t) => Ok(t),
            MockReply::Fail(msg) => Err(GenerationError::Other(msg)),
            MockReply::Delayed(d, t) => {
                tokio::time::sleep(d).await;
                Ok(t)
            }
        }
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Reply used by `AI_TEST_MODE=mock`; satisfies both the enrichment and the bias prompt.
pub const MOCK_REPLY: &str = r#"{"narrative":"Mock narrative.","short_summary":"Mock summary.","region":"Global","category":"World","key_points":["mock"],"bias_score":0,"tone_score":50,"alignment":"Neutral","rationale":"mock"}"#;

/// Build a generator according to config and environment.
///
/// * `AI_TEST_MODE=mock` → deterministic mock.
/// * `enabled == false` → disabled client.
/// * `provider == "openai"` → OpenAI wrapped with response cache + daily limit.
pub fn build_generator(cfg: &GenerativeConfig) -> DynGenerator {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockGenerator::fixed(MOCK_REPLY));
    }

    if !cfg.enabled {
        return Arc::new(DisabledGenerator);
    }

    match cfg.provider.as_str() {
        "openai" => {
            let mut provider = OpenAiGenerator::new(&cfg.api_key, cfg.model.as_deref());
            if let Some(base) = cfg.base_url.as_deref() {
                provider = provider.with_base_url(base);
            }
            let dir = cfg
                .cache_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("cache/ai"));
            Arc::new(CachingGenerator::new(provider, dir, cfg.daily_limit))
        }
        other => {
            tracing::warn!(target: "enrich", provider = other, "unsupported generative provider, AI disabled");
            Arc::new(DisabledGenerator)
        }
    }
}
