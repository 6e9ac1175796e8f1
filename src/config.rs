//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::agent::llm::Provider;
use crate::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// JSON file mapping chat ids to project records
    #[serde(default)]
    pub projects_file: Option<PathBuf>,

    /// JSONL file receiving one usage record per request (logged only when unset)
    #[serde(default)]
    pub usage_log: Option<PathBuf>,

    /// Completion round-trips allowed per request. Can only lower the
    /// ceiling of 3.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

/// OpenAI chat completions settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_openai_url")]
    pub base_url: String,

    #[serde(default = "default_openai_model")]
    pub default_model: String,

    /// Mode name -> model id
    #[serde(default = "default_openai_models")]
    pub models: HashMap<String, String>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Gemini generateContent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_gemini_url")]
    pub base_url: String,

    #[serde(default = "default_gemini_model")]
    pub default_model: String,

    /// Mode name -> model id
    #[serde(default = "default_gemini_models")]
    pub models: HashMap<String, String>,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Web search (Brave) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_search_url")]
    pub base_url: String,

    #[serde(default = "default_search_results")]
    pub max_results: usize,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

/// Multimodal text extraction settings (PDF and DOCX fallback)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Falls back to the Gemini key when empty
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_gemini_url")]
    pub base_url: String,

    #[serde(default = "default_gemini_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Where referenced files live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    #[serde(default = "default_upload_prefix")]
    pub upload_prefix: String,

    #[serde(default = "default_document_prefix")]
    pub document_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_max_iterations() -> usize {
    3
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_models() -> HashMap<String, String> {
    HashMap::from([
        ("fast".to_string(), "gpt-4o-mini".to_string()),
        ("default".to_string(), "gpt-4o".to_string()),
    ])
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_models() -> HashMap<String, String> {
    HashMap::from([
        ("fast".to_string(), "gemini-2.0-flash".to_string()),
        ("thinking".to_string(), "gemini-2.0-flash-thinking-exp".to_string()),
    ])
}

fn default_max_output_tokens() -> u32 {
    8192
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_search_url() -> String {
    "https://api.search.brave.com/res/v1".to_string()
}

fn default_search_results() -> usize {
    5
}

fn default_search_timeout() -> u64 {
    20
}

fn default_upload_dir() -> PathBuf {
    config_dir().join("uploads")
}

fn default_documents_dir() -> PathBuf {
    config_dir().join("documents")
}

fn default_upload_prefix() -> String {
    "/uploads/".to_string()
}

fn default_document_prefix() -> String {
    "/api/documents/".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18790
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai: OpenAiConfig::default(),
            gemini: GeminiConfig::default(),
            search: SearchConfig::default(),
            extraction: ExtractionConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
            projects_file: None,
            usage_log: None,
            max_iterations: default_max_iterations(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openai_url(),
            default_model: default_openai_model(),
            models: default_openai_models(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_gemini_url(),
            default_model: default_gemini_model(),
            models: default_gemini_models(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_search_url(),
            max_results: default_search_results(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_gemini_url(),
            model: default_gemini_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            documents_dir: default_documents_dir(),
            upload_prefix: default_upload_prefix(),
            document_prefix: default_document_prefix(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl OpenAiConfig {
    /// Model id for a request mode; unknown or absent modes use the default model.
    pub fn model_for(&self, mode: Option<&str>) -> &str {
        mode.and_then(|m| self.models.get(m))
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }
}

impl GeminiConfig {
    /// Model id for a request mode; unknown or absent modes use the default model.
    pub fn model_for(&self, mode: Option<&str>) -> &str {
        mode.and_then(|m| self.models.get(m))
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }
}

impl Config {
    /// Model a request for `provider` in `mode` is sent to.
    pub fn model_name(&self, provider: Provider, mode: Option<&str>) -> String {
        match provider {
            Provider::OpenAi => self.openai.model_for(mode).to_string(),
            Provider::Gemini => self.gemini.model_for(mode).to_string(),
        }
    }

    /// Overlay secrets from the environment.
    pub fn apply_env(&mut self) {
        let overrides = [
            ("OPENAI_API_KEY", &mut self.openai.api_key),
            ("GEMINI_API_KEY", &mut self.gemini.api_key),
            ("BRAVE_API_KEY", &mut self.search.api_key),
            ("PARLEY_EXTRACTION_API_KEY", &mut self.extraction.api_key),
        ];

        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    debug!("Using {} from environment", var);
                    *slot = value;
                }
            }
        }
    }

    /// Key for the extraction service, falling back to the Gemini key.
    pub fn extraction_api_key(&self) -> &str {
        if self.extraction.api_key.is_empty() {
            &self.gemini.api_key
        } else {
            &self.extraction.api_key
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from the default location, then apply env overrides.
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load configuration from a file. A missing file yields the defaults.
pub fn load_from(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)?
    } else {
        debug!("No config at {:?}, using defaults", path);
        Config::default()
    };

    config.apply_env();
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
