//! Configuration system for mnema.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::traits::LlmConfig;

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAI,
    Anthropic,
}

/// Provider configuration with type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Provider type.
    pub provider: LlmProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: LlmConfig,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            config: LlmConfig {
                model: "gpt-4.1-nano-2025-04-14".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Review queue tuning.
///
/// These constants were tuned empirically; keep them adjustable per
/// deployment rather than baked into the prioritizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Retrievability band within which queue ordering is randomized.
    pub tie_epsilon: f32,
    /// Hours during which never-reviewed material gets a freshness boost.
    pub fresh_window_hours: i64,
    /// Half-life, in hours, of the freshness boost decay.
    pub fresh_half_life_hours: f32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tie_epsilon: 0.05,
            fresh_window_hours: 72,
            fresh_half_life_hours: 24.0,
        }
    }
}

/// Bounds for batched mutations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    /// Maximum records fetched and patched per batch.
    pub max_per_batch: usize,
    /// Hard ceiling on batch iterations per invocation.
    pub max_iterations: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_per_batch: 50,
            max_iterations: 100,
        }
    }
}

/// Generation pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Minimum normalized title length for a synthesized concept.
    pub min_title_len: usize,
    /// Target phrasings requested per concept.
    pub target_phrasings_per_concept: u32,
    /// Upper bound on concepts synthesized from one prompt.
    pub max_concepts_per_job: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            min_title_len: 3,
            target_phrasings_per_concept: 3,
            max_concepts_per_job: 10,
        }
    }
}

/// Main study configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// LLM configuration for the generation pipeline.
    pub llm: LlmProviderConfig,
    /// Review queue tuning.
    pub queue: QueueConfig,
    /// Batched mutation bounds.
    pub batch: BatchLimits,
    /// Generation pipeline tuning.
    pub jobs: JobConfig,
    /// Path to the study database.
    pub db_path: PathBuf,
    /// Config schema version.
    pub version: String,
}

impl Default for StudyConfig {
    fn default() -> Self {
        let mnema_dir = dirs::home_dir()
            .map(|h| h.join(".mnema"))
            .unwrap_or_else(|| PathBuf::from(".mnema"));

        Self {
            llm: LlmProviderConfig::default(),
            queue: QueueConfig::default(),
            batch: BatchLimits::default(),
            jobs: JobConfig::default(),
            db_path: mnema_dir.join("study.db"),
            version: "v1".to_string(),
        }
    }
}

impl StudyConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::MnemaResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| crate::error::MnemaError::Configuration(e.to_string())),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| crate::error::MnemaError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| crate::error::MnemaError::Configuration(e.to_string())),
            _ => Err(crate::error::MnemaError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(model) = std::env::var("MNEMA_LLM_MODEL") {
            config.llm.config.model = model;
        }
        if let Ok(provider) = std::env::var("MNEMA_LLM_PROVIDER") {
            match provider.to_lowercase().as_str() {
                "anthropic" => config.llm.provider = LlmProvider::Anthropic,
                "openai" => config.llm.provider = LlmProvider::OpenAI,
                _ => {}
            }
        }
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            config.llm.config.api_key = Some(api_key);
        }
        if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
            if config.llm.provider == LlmProvider::Anthropic {
                config.llm.config.api_key = Some(api_key);
            }
        }
        if let Ok(db_path) = std::env::var("MNEMA_DB_PATH") {
            config.db_path = PathBuf::from(db_path);
        }

        config
    }
}
