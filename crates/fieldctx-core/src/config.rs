//! Configuration loader and typed sections.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_RETRIEVAL__LEXICAL_CANDIDATES=50`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::field_spec::StrategyKind;

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> Result<Self> { Self::load_from(Path::new("config.toml")) }

    /// Load `base` plus the environment overlay next to it (`config.<env>.toml`).
    pub fn load_from(base: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let dir = base.parent().unwrap_or_else(|| Path::new("."));

        let mut figment = Figment::new().merge(Toml::file(base));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config = Self { figment, env_name: "custom".to_string() };
        config.validate()?;
        Ok(config)
    }

    pub fn env_name(&self) -> &str { &self.env_name }

    pub fn figment(&self) -> &Figment { &self.figment }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::invalid_config(format!("Failed to get '{key}': {e}")))
    }

    /// Section `key` if present, else its `Default`.
    fn section<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Serialize + Default,
    {
        Figment::from(Serialized::defaults(T::default()))
            .merge(self.figment.focus(key))
            .extract()
            .map_err(|e| Error::invalid_config(format!("Invalid [{key}] section: {e}")))
    }

    pub fn retrieval(&self) -> Result<RetrievalConfig> { self.section("retrieval") }

    pub fn data(&self) -> Result<DataConfig> { self.section("data") }

    pub fn embedding(&self) -> Result<EmbeddingConfig> { self.section("embedding") }

    pub fn logging(&self) -> Result<LoggingConfig> { self.section("logging") }

    fn validate(&self) -> Result<()> {
        self.retrieval()?.validate()?;
        let embedding = self.embedding()?;
        if embedding.dim == 0 {
            return Err(Error::invalid_config("embedding.dim must be > 0"));
        }
        Ok(())
    }
}

/// How raw lexical relevance scores are mapped into [0, 1].
///
/// Full-text relevance is unbounded, so this is a calibration knob rather than
/// a derived constant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LexicalNormalization {
    /// `min(score / divisor, 1.0)`.
    FixedDivisor { divisor: f32 },
    /// `min(score / p, 1.0)` where `p` is the batch score at `percentile` (0, 1].
    Percentile { percentile: f32 },
}

impl Default for LexicalNormalization {
    fn default() -> Self { LexicalNormalization::FixedDivisor { divisor: 10.0 } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub strategy: StrategyKind,
    pub lexical_candidates: usize,
    pub semantic_candidates: usize,
    pub lexical_weight: f32,
    pub semantic_weight: f32,
    pub lexical_normalization: LexicalNormalization,
    pub lexical_timeout_ms: u64,
    pub semantic_timeout_ms: u64,
    pub lookup_timeout_ms: u64,
    pub degrade_to_single_channel: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::TwoPhase,
            lexical_candidates: 100,
            semantic_candidates: 100,
            lexical_weight: 0.5,
            semantic_weight: 0.5,
            lexical_normalization: LexicalNormalization::default(),
            lexical_timeout_ms: 5_000,
            semantic_timeout_ms: 5_000,
            lookup_timeout_ms: 2_000,
            degrade_to_single_channel: true,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lexical_candidates == 0 || self.semantic_candidates == 0 {
            return Err(Error::invalid_config("retrieval candidate counts must be > 0"));
        }
        let weights_ok = |w: f32| w.is_finite() && w >= 0.0;
        if !weights_ok(self.lexical_weight) || !weights_ok(self.semantic_weight) {
            return Err(Error::invalid_config("retrieval weights must be finite and >= 0"));
        }
        if self.lexical_weight + self.semantic_weight <= 0.0 {
            return Err(Error::invalid_config("retrieval weights must not both be 0"));
        }
        match self.lexical_normalization {
            LexicalNormalization::FixedDivisor { divisor } if !(divisor.is_finite() && divisor > 0.0) => {
                return Err(Error::invalid_config("lexical_normalization.divisor must be > 0"));
            }
            LexicalNormalization::Percentile { percentile } if !(percentile > 0.0 && percentile <= 1.0) => {
                return Err(Error::invalid_config("lexical_normalization.percentile must be in (0, 1]"));
            }
            _ => {}
        }
        if self.lexical_timeout_ms == 0 || self.semantic_timeout_ms == 0 || self.lookup_timeout_ms == 0 {
            return Err(Error::invalid_config("retrieval timeouts must be > 0 ms"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Chunks loaded from `chunks_file` into a `MemoryChunkIndex`.
    #[default]
    Memory,
    /// Tantivy for lexical search and lookups, LanceDB for vectors.
    TantivyLance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub backend: BackendKind,
    pub chunks_file: String,
    pub tantivy_index_dir: String,
    pub lancedb_dir: String,
    pub lancedb_table: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            chunks_file: "../dev_data/chunks.jsonl".to_string(),
            tantivy_index_dir: "../dev_data/indexes/tantivy".to_string(),
            lancedb_dir: "../dev_data/indexes/lancedb".to_string(),
            lancedb_table: "chunks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    #[default]
    Hash,
    Candle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub dim: usize,
    pub model_dir: Option<String>,
    pub max_len: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self { Self { provider: EmbeddingProviderKind::Hash, dim: 1024, model_dir: None, max_len: 256 } }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self { Self { level: "info".to_string(), format: LogFormat::Text } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retrieval_config_is_valid() {
        assert!(RetrievalConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_weights_and_bad_normalization() {
        let mut cfg = RetrievalConfig { lexical_weight: 0.0, semantic_weight: 0.0, ..RetrievalConfig::default() };
        assert!(cfg.validate().is_err());
        cfg.lexical_weight = 1.0;
        cfg.lexical_normalization = LexicalNormalization::Percentile { percentile: 0.0 };
        assert!(cfg.validate().is_err());
        cfg.lexical_normalization = LexicalNormalization::FixedDivisor { divisor: -1.0 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/base");
        assert_eq!(resolve_with_base(base, "/abs/x"), PathBuf::from("/abs/x"));
        assert_eq!(resolve_with_base(base, "rel/x"), PathBuf::from("/base/rel/x"));
    }
}
