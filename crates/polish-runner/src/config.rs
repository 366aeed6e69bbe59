//! Runner configuration: polishing settings plus provider endpoints.
//!
//! ```toml
//! [polish]
//! providers = ["openai", "deepseek"]
//! pass_count = 2
//!
//! [[endpoints]]
//! name = "openai"
//! base_url = "https://api.openai.com/v1"
//! api_key_env = "OPENAI_API_KEY"
//! model = "gpt-4o"
//! instances = 2
//! ```

use std::path::Path;

use polish_coordination::{ConfigError, PolishConfig, DEFAULT_INSTANCES_PER_PROVIDER};
use serde::Deserialize;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

fn default_instances() -> usize {
    DEFAULT_INSTANCES_PER_PROVIDER
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// One OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub base_url: String,
    /// Literal key; takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub model: String,
    #[serde(default = "default_instances")]
    pub instances: usize,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl EndpointConfig {
    /// The API key, or `MissingCredentials` when it resolves empty.
    pub fn resolve_key(&self) -> Result<String, ConfigError> {
        let key = match (&self.api_key, &self.api_key_env) {
            (Some(key), _) => key.clone(),
            (None, Some(var)) => std::env::var(var).unwrap_or_default(),
            (None, None) => String::new(),
        };
        if key.trim().is_empty() {
            return Err(ConfigError::MissingCredentials(self.name.clone()));
        }
        Ok(key)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub polish: PolishConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl RunnerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Every provider the passes use must have an endpoint with a key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.polish.validate()?;
        for name in self.polish.all_providers() {
            let endpoint = self
                .endpoint(&name)
                .ok_or_else(|| ConfigError::MissingProvider(name.clone()))?;
            endpoint.resolve_key()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [polish]
        providers = ["openai", "local"]
        pass_count = 1

        [[endpoints]]
        name = "openai"
        base_url = "https://api.openai.com/v1"
        api_key = "sk-test"
        model = "gpt-4o"

        [[endpoints]]
        name = "local"
        base_url = "http://localhost:8000/v1"
        api_key = "local"
        model = "qwen"
        instances = 4
    "#;

    #[test]
    fn test_parse_endpoints() {
        let config = RunnerConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoint("openai").unwrap().instances, 2);
        assert_eq!(config.endpoint("local").unwrap().instances, 4);
        assert_eq!(config.endpoint("local").unwrap().timeout_secs, 120);
        assert_eq!(config.polish.pass_count, 1);
    }

    #[test]
    fn test_provider_without_endpoint() {
        let mut config = RunnerConfig::from_toml_str(SAMPLE).unwrap();
        config.polish.providers.push("anthropic".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingProvider(name)) if name == "anthropic"
        ));
    }

    #[test]
    fn test_empty_key_is_missing_credentials() {
        let mut config = RunnerConfig::from_toml_str(SAMPLE).unwrap();
        config.endpoints[0].api_key = None;
        config.endpoints[0].api_key_env = Some("POLISH_RUNNER_TEST_UNSET_KEY".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredentials(name)) if name == "openai"
        ));
    }
}
