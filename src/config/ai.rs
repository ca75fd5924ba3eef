// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{resolve_secret, ConfigError};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";
pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";

fn default_provider() -> String {
    "openai".to_string()
}
fn default_daily_limit() -> u32 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerativeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Only "openai" (or an OpenAI-compatible endpoint via `base_url`) is supported.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// "ENV" means: read from OPENAI_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: None,
            base_url: None,
            daily_limit: default_daily_limit(),
            api_key: String::new(),
            cache_dir: None,
        }
    }
}

impl GenerativeConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut cfg: GenerativeConfig =
            serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        cfg.provider = cfg.provider.trim().to_lowercase();
        if cfg.provider != "openai" {
            return Err(ConfigError::UnsupportedProvider(cfg.provider));
        }

        // A disabled config may omit the key entirely.
        if cfg.enabled {
            cfg.api_key = resolve_secret(&cfg.api_key, "OPENAI_API_KEY")?;
        }
        Ok(cfg)
    }

    /// `$AI_CONFIG_PATH`, else `config/ai.json`; no file at the default path means AI off.
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(p) = std::env::var(ENV_AI_CONFIG_PATH) {
            let pb = PathBuf::from(&p);
            if !pb.exists() {
                return Err(ConfigError::MissingPath {
                    var: ENV_AI_CONFIG_PATH,
                    path: p,
                });
            }
            return Self::load_from_file(pb);
        }
        let pb = PathBuf::from(DEFAULT_AI_CONFIG_PATH);
        if pb.exists() {
            Self::load_from_file(pb)
        } else {
            Ok(Self::default())
        }
    }
}
