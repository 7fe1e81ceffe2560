use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Result, anyhow};

use crate::ai::{system_instruction, GenerationProvider, OllamaClient, OpenAIClient};
use crate::dispatcher::Timeouts;
use crate::error::{GenerationError, SearchError};
use crate::provider::Provider;
use crate::search::{EndpointSearchClient, ExaSearchClient, SearchBackend, SearchProvider};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "http://localhost:3000/api/exawebsearch";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub backend: Option<String>,
    pub endpoint: Option<String>,
    pub exa_api_key: Option<String>,
    pub num_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: Some(SearchBackend::Endpoint.as_str().to_string()),
            endpoint: None,
            exa_api_key: None,
            num_results: 5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub fireworks_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub ollama_url: Option<String>,
    /// Always answer in this language; unset mirrors the user's language
    pub reply_language: Option<String>,
    pub search: SearchConfig,
    pub search_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Fireworks.as_str().to_string()),
            default_model: None,
            fireworks_api_key: None,
            openai_api_key: None,
            ollama_url: None,
            reply_language: None,
            search: SearchConfig::default(),
            search_timeout_secs: 30,
            generation_timeout_secs: 60,
            log_level: None,
        }
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config {}: {}", config_path.display(), e))?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    /// Persist a model picked in the UI. Re-reads the file so flag overrides
    /// for this run are not written back.
    pub fn save_default_model(config_path: &Path, model: &str) -> Result<()> {
        let mut config = Self::load_from(config_path)?;
        config.default_model = Some(model.to_string());
        config.save_to(config_path)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("deepsearch").join("config.json"))
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Fireworks)
    }

    pub fn model(&self) -> String {
        self.default_model
            .clone()
            .unwrap_or_else(|| self.provider().default_model().to_string())
    }

    pub fn search_backend(&self) -> SearchBackend {
        self.search
            .backend
            .as_deref()
            .and_then(SearchBackend::from_str)
            .unwrap_or_default()
    }

    pub fn ollama_url(&self) -> String {
        self.ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
    }

    /// API key for a hosted provider; the environment wins over the file.
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        let from_env = provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty());
        from_env.or_else(|| match provider {
            Provider::Fireworks => self.fireworks_api_key.clone(),
            Provider::OpenAI => self.openai_api_key.clone(),
            Provider::Ollama => None,
        })
    }

    /// Returns where a provider's key comes from: "env", "config", "local", or None
    pub fn key_source(&self, provider: Provider) -> Option<&'static str> {
        if provider == Provider::Ollama {
            return Some("local");
        }
        let in_env = provider
            .api_key_env()
            .map(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
            .unwrap_or(false);
        if in_env {
            Some("env")
        } else if self.api_key(provider).is_some() {
            Some("config")
        } else {
            None
        }
    }

    pub fn exa_api_key(&self) -> Option<String> {
        std::env::var("EXA_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.search.exa_api_key.clone())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            search: Duration::from_secs(self.search_timeout_secs.max(1)),
            generation: Duration::from_secs(self.generation_timeout_secs.max(1)),
        }
    }

    pub fn system_prompt(&self) -> String {
        system_instruction(self.reply_language.as_deref())
    }

    pub fn build_search(&self) -> std::result::Result<Arc<dyn SearchProvider>, SearchError> {
        match self.search_backend() {
            SearchBackend::Endpoint => {
                let endpoint = self
                    .search
                    .endpoint
                    .as_deref()
                    .unwrap_or(DEFAULT_SEARCH_ENDPOINT);
                Ok(Arc::new(EndpointSearchClient::new(endpoint)))
            }
            SearchBackend::Exa => {
                let key = self.exa_api_key().ok_or(SearchError::MissingApiKey("Exa"))?;
                Ok(Arc::new(ExaSearchClient::new(&key, self.search.num_results.max(1))))
            }
        }
    }

    pub fn build_generator(
        &self,
        provider: Provider,
        model: &str,
    ) -> std::result::Result<Arc<dyn GenerationProvider>, GenerationError> {
        let system_prompt = self.system_prompt();
        match provider {
            Provider::Ollama => Ok(Arc::new(OllamaClient::new(&self.ollama_url(), model, system_prompt))),
            Provider::Fireworks | Provider::OpenAI => {
                let key = self
                    .api_key(provider)
                    .ok_or(GenerationError::MissingApiKey(provider.display_name()))?;
                Ok(Arc::new(OpenAIClient::new(
                    provider.default_base_url(),
                    &key,
                    model,
                    system_prompt,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.provider(), Provider::Fireworks);
        assert_eq!(config.model(), "accounts/fireworks/models/deepseek-r1");
        assert_eq!(config.timeouts().search, Duration::from_secs(30));
        assert_eq!(config.timeouts().generation, Duration::from_secs(60));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.provider = Some("ollama".to_string());
        config.default_model = Some("qwq".to_string());
        config.reply_language = Some("Chinese".to_string());
        config.search.endpoint = Some("http://search.local/api".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.provider(), Provider::Ollama);
        assert!(loaded.system_prompt().ends_with("Always reply in Chinese."));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"provider":"openai","search":{"backend":"exa"}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.provider(), Provider::OpenAI);
        assert_eq!(config.model(), "gpt-4o-mini");
        assert_eq!(config.search_backend(), SearchBackend::Exa);
        assert_eq!(config.search.num_results, 5);
        assert_eq!(config.generation_timeout_secs, 60);
    }

    #[test]
    fn test_save_default_model_keeps_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"provider":"ollama","ollama_url":"http://gpu:11434"}"#).unwrap();

        Config::save_default_model(&path, "qwq").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.default_model.as_deref(), Some("qwq"));
        assert_eq!(loaded.provider(), Provider::Ollama);
        assert_eq!(loaded.ollama_url(), "http://gpu:11434");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let mut config = Config::new();
        config.provider = Some("ollama".to_string());
        assert_eq!(config.key_source(Provider::Ollama), Some("local"));
        let generator = config.build_generator(Provider::Ollama, "llama3.2").unwrap();
        assert_eq!(generator.model(), "llama3.2");
    }

    #[test]
    fn test_endpoint_backend_is_default() {
        let config = Config::new();
        let search = config.build_search().unwrap();
        assert_eq!(search.name(), "endpoint");
    }
}
