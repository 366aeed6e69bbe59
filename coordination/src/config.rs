//! Polishing configuration
//!
//! Loaded from TOML; every field has a default so a file only needs to
//! name its providers. A few settings can be overridden from the
//! environment:
//!
//! - `POLISH_DATABASE_PATH`: SQLite file, empty disables persistence
//! - `POLISH_MAX_RETRIES`: router attempts per instance
//! - `POLISH_PASS_COUNT`: number of passes

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::notes::Importance;
use crate::polish::{Dimension, PolishingConfig, DEFAULT_SCORE};
use crate::router::{ProviderPool, RouterConfig, DEFAULT_MAX_RETRIES};

/// Characters of original text below which no notes are requested.
pub const DEFAULT_NOTE_MIN_TEXT_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Provider {0} is not configured")]
    MissingProvider(String),

    #[error("No credentials for provider {0}")]
    MissingCredentials(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolishConfig {
    /// Providers used by every pass without its own list.
    pub providers: Vec<String>,
    /// Per-pass provider lists; entry `i` is pass `i + 1`. Empty entries fall back.
    pub pass_providers: Vec<Vec<String>>,
    pub pass_count: u32,
    pub min_consensus: usize,
    /// Per-pass consensus minimum; 0 or a missing entry uses `min_consensus`.
    pub pass_min_consensus: Vec<usize>,

    pub verify_spirit: bool,
    pub verify_language: bool,
    pub verify_context: bool,
    pub verify_vocabulary: bool,
    pub default_score: f64,

    pub enable_note_taking: bool,
    pub min_note_importance: Importance,
    pub carry_notes_forward: bool,
    pub note_min_text_chars: usize,

    pub max_retries: u32,
    pub retry_delay_ms: u64,

    /// Empty disables persistence.
    pub database_path: String,
}

impl Default for PolishConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            pass_providers: Vec::new(),
            pass_count: 2,
            min_consensus: 2,
            pass_min_consensus: Vec::new(),
            verify_spirit: true,
            verify_language: true,
            verify_context: true,
            verify_vocabulary: true,
            default_score: DEFAULT_SCORE,
            enable_note_taking: true,
            min_note_importance: Importance::Medium,
            carry_notes_forward: true,
            note_min_text_chars: DEFAULT_NOTE_MIN_TEXT_CHARS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: 2000,
            database_path: String::new(),
        }
    }
}

impl PolishConfig {
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Overlay `POLISH_*` environment variables. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("POLISH_DATABASE_PATH") {
            self.database_path = path;
        }
        if let Some(retries) = std::env::var("POLISH_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            self.max_retries = retries;
        }
        if let Some(passes) = std::env::var("POLISH_PASS_COUNT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            self.pass_count = passes;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.pass_count == 0 {
            return Err(ConfigError::Invalid("pass_count must be at least 1".into()));
        }
        if self.min_consensus == 0 {
            return Err(ConfigError::Invalid(
                "min_consensus must be at least 1".into(),
            ));
        }
        if self.providers.is_empty() {
            return Err(ConfigError::Invalid("no providers configured".into()));
        }
        if self.dimensions().is_empty() {
            return Err(ConfigError::Invalid(
                "at least one verification dimension must be enabled".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.default_score) {
            return Err(ConfigError::Invalid(format!(
                "default_score {} outside [0, 1]",
                self.default_score
            )));
        }
        for name in self.pass_providers.iter().flatten() {
            if !self.providers.contains(name) {
                return Err(ConfigError::MissingProvider(name.clone()));
            }
        }
        Ok(())
    }

    /// Fail if any provider some pass will use has no router in `pool`.
    pub fn check_pool(&self, pool: &ProviderPool) -> ConfigResult<()> {
        for pass in 1..=self.pass_count {
            for name in self.providers_for_pass(pass) {
                if !pool.contains(&name) {
                    return Err(ConfigError::MissingProvider(name));
                }
            }
        }
        Ok(())
    }

    /// Every provider referenced by any pass, in first-use order.
    pub fn all_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.providers.iter().chain(self.pass_providers.iter().flatten()) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Providers for pass `pass_number` (1-based).
    pub fn providers_for_pass(&self, pass_number: u32) -> Vec<String> {
        pass_number
            .checked_sub(1)
            .and_then(|i| self.pass_providers.get(i as usize))
            .filter(|list| !list.is_empty())
            .cloned()
            .unwrap_or_else(|| self.providers.clone())
    }

    pub fn min_consensus_for_pass(&self, pass_number: u32) -> usize {
        pass_number
            .checked_sub(1)
            .and_then(|i| self.pass_min_consensus.get(i as usize))
            .copied()
            .filter(|n| *n > 0)
            .unwrap_or(self.min_consensus)
    }

    /// Enabled dimensions in canonical order.
    pub fn dimensions(&self) -> Vec<Dimension> {
        Dimension::ALL
            .into_iter()
            .filter(|d| match d {
                Dimension::Spirit => self.verify_spirit,
                Dimension::Language => self.verify_language,
                Dimension::Context => self.verify_context,
                Dimension::Vocabulary => self.verify_vocabulary,
            })
            .collect()
    }

    pub fn polishing_config_for_pass(&self, pass_number: u32) -> PolishingConfig {
        PolishingConfig {
            providers: self.providers_for_pass(pass_number),
            min_consensus: self.min_consensus_for_pass(pass_number),
            dimensions: self.dimensions(),
            default_score: self.default_score,
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn persistence_enabled(&self) -> bool {
        !self.database_path.trim().is_empty()
    }
}
