// src/config/mod.rs
pub mod ai;
pub mod pipeline;

pub use ai::GenerativeConfig;
pub use pipeline::PipelineConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {message}")]
    Parse { path: String, message: String },
    #[error("{var} points to non-existent path {path}")]
    MissingPath { var: &'static str, path: String },
    #[error("missing {0} env var")]
    MissingEnv(String),
    #[error("unsupported provider in config: {0}")]
    UnsupportedProvider(String),
}

/// Resolve a secret that may be given literally or as `"ENV"` (read from `var`).
pub(crate) fn resolve_secret(raw: &str, var: &str) -> Result<String, ConfigError> {
    if raw.trim().eq_ignore_ascii_case("env") {
        std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.to_string()))
    } else {
        Ok(raw.trim().to_string())
    }
}
