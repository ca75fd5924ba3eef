// src/config/pipeline.rs
//! Pipeline configuration (TOML). Every field has a default, so an empty file, or no
//! file at the default path, yields a working offline setup.

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use super::ConfigError;
use crate::credibility::CredibilityPolicy;
use crate::enrich::RetryPolicy;
use crate::grouping::DEFAULT_SIMILARITY_THRESHOLD;

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OnThisDay,
    NewsApi,
    Rss,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

/// Provider backed by a payload on disk instead of the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureConfig {
    pub kind: ProviderKind,
    /// Feed name; only used for `rss`.
    #[serde(default)]
    pub name: Option<String>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub on_this_day: bool,
    /// Literal key or "ENV" (NEWS_API_KEY). Absent disables the news provider.
    pub news_api_key: Option<String>,
    pub news_date_terms: Option<String>,
    pub rss: Vec<FeedConfig>,
    pub fixtures: Vec<FixtureConfig>,
    /// Clamped to 5..=15.
    pub timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            on_this_day: true,
            news_api_key: None,
            news_date_terms: None,
            rss: Vec::new(),
            fixtures: Vec::new(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub batch_size: usize,
    /// Records updated more recently than this are not re-enriched (collection runs,
    /// reenrich and bias passes); rescore ignores it. 0 disables.
    pub min_refresh_age_hours: u64,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/events"),
            batch_size: 400,
            min_refresh_age_hours: 12,
            timeout_secs: 10,
        }
    }
}

impl StoreConfig {
    pub fn min_refresh_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.min_refresh_age_hours.min(24 * 365) as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub call_timeout_secs: u64,
    pub inter_call_delay_ms: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            call_timeout_secs: 30,
            inter_call_delay_ms: 1000,
        }
    }
}

impl EnrichConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub enrich: bool,
    pub analyze_bias: bool,
    pub inter_unit_delay_ms: u64,
    /// 0 means no run-level timeout.
    pub run_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            enrich: true,
            analyze_bias: true,
            inter_unit_delay_ms: 250,
            run_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Provenance tag written into every record.
    pub added_by: String,
    pub grouping_threshold: f64,
    pub reputation_path: PathBuf,
    pub providers: ProvidersConfig,
    pub store: StoreConfig,
    pub enrich: EnrichConfig,
    pub run: RunConfig,
    pub credibility: CredibilityPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            added_by: "world-events".to_string(),
            grouping_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            reputation_path: PathBuf::from("config/reputation.json"),
            providers: ProvidersConfig::default(),
            store: StoreConfig::default(),
            enrich: EnrichConfig::default(),
            run: RunConfig::default(),
            credibility: CredibilityPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: PipelineConfig = toml::from_str(s).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        Ok(cfg.sanitized())
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Load using env var + fallbacks:
    /// 1) $PIPELINE_CONFIG_PATH (must exist)
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            let pb = PathBuf::from(&p);
            if !pb.exists() {
                return Err(ConfigError::MissingPath {
                    var: ENV_PIPELINE_CONFIG_PATH,
                    path: p,
                });
            }
            return Self::load_from_path(pb);
        }
        let pb = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
        if pb.exists() {
            Self::load_from_path(pb)
        } else {
            Ok(Self::default())
        }
    }

    /// Clamp out-of-range values instead of failing.
    pub fn sanitized(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.grouping_threshold) {
            self.grouping_threshold = DEFAULT_SIMILARITY_THRESHOLD;
        }
        if self.added_by.trim().is_empty() {
            self.added_by = "world-events".to_string();
        }
        self.store.batch_size = self.store.batch_size.max(1);
        self.store.timeout_secs = self.store.timeout_secs.max(1);
        self.enrich.max_attempts = self.enrich.max_attempts.clamp(1, 10);
        self.enrich.call_timeout_secs = self.enrich.call_timeout_secs.max(1);
        self.credibility = self.credibility.sanitized();
        self
    }

    pub fn inter_unit_delay(&self) -> Duration {
        Duration::from_millis(self.run.inter_unit_delay_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run.run_timeout_secs > 0).then(|| Duration::from_secs(self.run.run_timeout_secs))
    }
}
