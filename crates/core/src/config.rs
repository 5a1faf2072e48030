use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::capability::SummarizerOptions;
use crate::error::{Error, Result};
use crate::paths::Paths;

/// Environment variable that fills in an empty remote API key.
pub const API_KEY_ENV: &str = "PARLEY_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
    /// None = not set, Some("") = force direct connection, Some(url) = use this proxy.
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// "remote" or "ollama".
    #[serde(default = "default_backend_provider")]
    pub provider: String,
    /// Model used by the on-device backend.
    #[serde(default = "default_backend_model")]
    pub model: String,
}

fn default_backend_provider() -> String {
    "remote".to_string()
}

fn default_backend_model() -> String {
    "llama3.2:1b".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: default_backend_provider(),
            model: default_backend_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub no_proxy: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            no_proxy: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// How text length is measured for the summarization offer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LengthMetric {
    #[default]
    Words,
    Characters,
}

impl LengthMetric {
    pub fn measure(&self, text: &str) -> usize {
        match self {
            LengthMetric::Words => word_count(text),
            LengthMetric::Characters => text.chars().count(),
        }
    }
}

/// Number of whitespace-delimited tokens.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Whether translation waits for an explicit request or runs right after detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TranslationMode {
    #[default]
    OnDemand,
    Automatic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageOption {
    pub code: String,
    pub name: String,
}

impl LanguageOption {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

fn default_languages() -> Vec<LanguageOption> {
    vec![
        LanguageOption::new("en", "English"),
        LanguageOption::new("pt", "Portuguese"),
        LanguageOption::new("es", "Spanish"),
        LanguageOption::new("ru", "Russian"),
        LanguageOption::new("tr", "Turkish"),
        LanguageOption::new("fr", "French"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Summarization is offered when the measured length is strictly greater than this.
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: usize,
    #[serde(default)]
    pub length_metric: LengthMetric,
    #[serde(default)]
    pub translation_mode: TranslationMode,
    #[serde(default = "default_target_language")]
    pub default_target_language: String,
    #[serde(default = "default_languages")]
    pub languages: Vec<LanguageOption>,
    #[serde(default)]
    pub summarizer: SummarizerOptions,
}

fn default_summarize_threshold() -> usize {
    150
}

fn default_target_language() -> String {
    "en".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            summarize_threshold: default_summarize_threshold(),
            length_metric: LengthMetric::default(),
            translation_mode: TranslationMode::default(),
            default_target_language: default_target_language(),
            languages: default_languages(),
            summarizer: SummarizerOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn exceeds_threshold(&self, text: &str) -> bool {
        self.length_metric.measure(text) > self.summarize_threshold
    }

    pub fn is_supported_language(&self, code: &str) -> bool {
        self.languages.iter().any(|l| l.code == code)
    }

    /// Display name for a configured language, falling back to the code itself.
    pub fn language_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.languages
            .iter()
            .find(|l| l.code == code)
            .map(|l| l.name.as_str())
            .unwrap_or(code)
    }

    pub fn language_codes(&self) -> Vec<String> {
        self.languages.iter().map(|l| l.code.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("remote".to_string(), ProviderConfig::default());
        providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                api_key: String::new(),
                api_base: Some("http://localhost:11434".to_string()),
                proxy: None,
            },
        );

        Self {
            backend: BackendConfig::default(),
            providers,
            network: NetworkConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        let mut config = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            let key = key.trim().to_string();
            if !key.is_empty() {
                let remote = self.providers.entry("remote".to_string()).or_default();
                if remote.api_key.is_empty() {
                    remote.api_key = key;
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        if pipeline.summarize_threshold == 0 {
            return Err(Error::Config("pipeline.summarizeThreshold must be positive".to_string()));
        }

        let mut seen = HashSet::new();
        for lang in &pipeline.languages {
            if lang.code.trim().is_empty() {
                return Err(Error::Config("language codes must not be empty".to_string()));
            }
            if !seen.insert(lang.code.as_str()) {
                return Err(Error::Config(format!("duplicate language code '{}'", lang.code)));
            }
        }

        if !pipeline.is_supported_language(&pipeline.default_target_language) {
            return Err(Error::Config(format!(
                "defaultTargetLanguage '{}' is not in the languages list",
                pipeline.default_target_language
            )));
        }
        Ok(())
    }

    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}
