//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_INDEX__DISABLE_EMBEDDINGS=1`). Provides helpers to expand `~` and
//! `${VAR}` and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::default("index", IndexSettings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn index_settings(&self) -> anyhow::Result<IndexSettings> {
        self.get("index")
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let settings = self.index_settings()?;
        settings.validate()?;
        if matches!(env, "prod" | "production") && settings.use_fake_embeddings {
            return Err(Error::InvalidConfig("fake embeddings are not allowed in production".into()).into());
        }
        Ok(())
    }
}

/// Settings for the hybrid index, read from the `index` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Directory holding `index.json` and `embedding_cache.json`.
    pub data_dir: String,
    pub embed_url: String,
    pub embed_model: String,
    pub embed_timeout_ms: u64,
    /// Forces lexical-only ranking without contacting the provider.
    #[serde(deserialize_with = "deserialize_flag")]
    pub disable_embeddings: bool,
    #[serde(deserialize_with = "deserialize_flag")]
    pub use_fake_embeddings: bool,
    /// Debounce window for index snapshots.
    pub persist_delay_ms: u64,
    /// Number of content characters appended to the title when embedding.
    pub content_prefix_chars: usize,
    pub ranking: RankingSettings,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.recall/data".to_string(),
            embed_url: "http://localhost:11434/api/embeddings".to_string(),
            embed_model: "qwen3-embedding:0.6b".to_string(),
            embed_timeout_ms: 5_000,
            disable_embeddings: false,
            use_fake_embeddings: false,
            persist_delay_ms: 200,
            content_prefix_chars: 500,
            ranking: RankingSettings::default(),
        }
    }
}

impl IndexSettings {
    pub fn data_path(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn persist_delay(&self) -> Duration {
        Duration::from_millis(self.persist_delay_ms)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.data_dir.trim().is_empty() {
            return Err(Error::InvalidConfig("index.data_dir must not be empty".into()));
        }
        if self.embed_timeout_ms == 0 {
            return Err(Error::InvalidConfig("index.embed_timeout_ms must be positive".into()));
        }
        self.ranking.validate()
    }
}

/// Scoring thresholds for the hybrid ranker.
///
/// A vector score is used only when similarity exceeds `min_similarity` and
/// the entry either matches the query lexically or reaches
/// `confident_similarity`. Otherwise a title hit scores `title_hit_score` and
/// a content-only hit scores `content_hit_score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    pub min_similarity: f32,
    pub confident_similarity: f32,
    pub title_hit_score: f32,
    pub content_hit_score: f32,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self { min_similarity: 0.3, confident_similarity: 0.6, title_hit_score: 3.0, content_hit_score: 1.0 }
    }
}

impl RankingSettings {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.confident_similarity < self.min_similarity {
            return Err(Error::InvalidConfig(format!(
                "index.ranking.confident_similarity ({}) is below min_similarity ({})",
                self.confident_similarity, self.min_similarity
            )));
        }
        if self.title_hit_score <= 0.0 || self.content_hit_score <= 0.0 {
            return Err(Error::InvalidConfig("index.ranking hit scores must be positive".into()));
        }
        Ok(())
    }
}

/// Interpret an env-style switch value: `1`, `true`, `yes`, `on` are set.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
        Flag::Text(s) => is_truthy(&s),
    })
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
