//! Configuration management and the static model table

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::Provider;

/// Default system instructions, used when the caller supplies none
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional literary translator for web novels. \
Translate the chapter you are given faithfully, preserving tone, names and established terminology. \
Output the translated title on the first line followed by the translated body. \
Do not add commentary, notes or any conversational wrapper.";

/// Fixed fallback when a model has no rate-limit entry
pub const DEFAULT_RATE_PER_MINUTE: u32 = 10;

/// Sampling and limit parameters for one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub provider: Provider,
    /// Requests per minute allowed by the provider; drives inter-job pacing
    pub requests_per_minute: u32,
    /// Daily request cap; gates queue admission
    pub daily_cap: u32,
    pub max_output_tokens: u32,
    /// Whether the model accepts a thinking/reasoning budget parameter.
    /// Sending it to other models is rejected as a 400 by the provider.
    pub supports_thinking: bool,
    pub top_p: f32,
    /// Cerebras-specific reasoning effort hint
    pub reasoning_effort: Option<String>,
}

/// Configuration for the translation workbench
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    pub gemini_keys: Vec<String>,
    pub cerebras_keys: Vec<String>,
    pub gpt_oss_keys: Vec<String>,
    /// Base URL of the OpenAI-compatible endpoint, e.g. `https://host/v1`
    pub gpt_oss_base_url: String,
    /// Model identifier sent to the OpenAI-compatible endpoint
    pub gpt_oss_model: String,
    /// Shared daily-usage counter endpoint; best-effort, optional
    pub usage_sync_url: Option<String>,
    /// Path of the local JSON state file (durations, daily usage)
    pub state_path: PathBuf,
    pub models: Vec<ModelSpec>,
    /// Extra politeness delay added on top of the per-model rate interval
    pub pacing_buffer_ms: u64,
    /// Overload retries per key before the job fails
    pub overload_max_attempts: u32,
    /// Base backoff delay, doubled per overload attempt
    pub overload_base_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            gemini_keys: vec![],
            cerebras_keys: vec![],
            gpt_oss_keys: vec![],
            gpt_oss_base_url: String::new(),
            gpt_oss_model: String::new(),
            usage_sync_url: None,
            state_path: PathBuf::from("workbench-state.json"),
            models: default_models(),
            pacing_buffer_ms: 200,
            overload_max_attempts: 3,
            overload_base_delay_ms: 2000,
            timeout_ms: 120_000,
        }
    }
}

/// id, provider, rpm, daily cap, max output tokens, supports thinking
const DEFAULT_MODELS: &[(&str, Provider, u32, u32, u32, bool)] = &[
    ("gemini-2.5-flash", Provider::Gemini, 10, 250, 65_536, true),
    ("gemini-flash-lite-latest", Provider::Gemini, 15, 1000, 65_536, false),
    ("gemini-2.5-pro", Provider::Gemini, 5, 100, 65_536, true),
    ("gemini-3-pro-preview", Provider::Gemini, 5, 50, 65_536, true),
    ("cerebras/llama-3.1-70b", Provider::Cerebras, 30, 100, 8_192, false),
    ("cerebras/gpt-oss-120b", Provider::Cerebras, 30, 100, 65_536, false),
    ("gpt-oss/custom", Provider::GptOss, 30, 1000, 16_384, false),
];

fn default_models() -> Vec<ModelSpec> {
    DEFAULT_MODELS
        .iter()
        .map(|(id, provider, rpm, cap, max_tokens, thinking)| ModelSpec {
            id: id.to_string(),
            provider: *provider,
            requests_per_minute: *rpm,
            daily_cap: *cap,
            max_output_tokens: *max_tokens,
            supports_thinking: *thinking,
            top_p: 1.0,
            reasoning_effort: if *id == "cerebras/gpt-oss-120b" {
                Some("medium".to_string())
            } else {
                None
            },
        })
        .collect()
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

impl WorkbenchConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("GEMINI_API_KEYS") {
            config.gemini_keys = split_keys(&raw);
        }
        if let Ok(raw) = std::env::var("CEREBRAS_API_KEYS") {
            config.cerebras_keys = split_keys(&raw);
        }
        if let Ok(raw) = std::env::var("GPT_OSS_API_KEYS") {
            config.gpt_oss_keys = split_keys(&raw);
        }
        if let Ok(url) = std::env::var("GPT_OSS_BASE_URL") {
            config.gpt_oss_base_url = url.trim().to_string();
        }
        if let Ok(model) = std::env::var("GPT_OSS_MODEL") {
            config.gpt_oss_model = model.trim().to_string();
        }
        if let Ok(url) = std::env::var("USAGE_SYNC_URL") {
            if !url.trim().is_empty() {
                config.usage_sync_url = Some(url.trim().to_string());
            }
        }
        if let Ok(path) = std::env::var("WORKBENCH_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }
        if let Ok(raw) = std::env::var("REQUEST_TIMEOUT_MS") {
            config.timeout_ms = raw.parse().map_err(|_| TranslationError::ConfigError {
                message: format!("REQUEST_TIMEOUT_MS is not a number: {}", raw),
            })?;
        }

        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(TranslationError::ConfigError {
                message: "No models configured".to_string(),
            });
        }
        if self.overload_max_attempts == 0 {
            return Err(TranslationError::ConfigError {
                message: "overload_max_attempts must be greater than 0".to_string(),
            });
        }
        if self.gemini_keys.is_empty() && self.cerebras_keys.is_empty() && self.gpt_oss_keys.is_empty()
        {
            warn!("No API keys configured for any provider");
        }
        if !self.gpt_oss_keys.is_empty()
            && (self.gpt_oss_base_url.is_empty() || self.gpt_oss_model.is_empty())
        {
            return Err(TranslationError::ConfigError {
                message: "gpt_oss_base_url and gpt_oss_model are required when GPT-OSS keys are set"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Find a model spec by identifier
    pub fn model(&self, id: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Keys configured for one provider, deduplicated in order
    pub fn keys_for(&self, provider: Provider) -> Vec<String> {
        let raw = match provider {
            Provider::Gemini => &self.gemini_keys,
            Provider::Cerebras => &self.cerebras_keys,
            Provider::GptOss => &self.gpt_oss_keys,
        };
        let mut seen = std::collections::HashSet::new();
        raw.iter()
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect()
    }

    /// Mandatory delay between two jobs for a model
    pub fn pacing_interval_ms(&self, model_id: &str) -> u64 {
        let rpm = self
            .model(model_id)
            .map(|m| m.requests_per_minute)
            .unwrap_or(DEFAULT_RATE_PER_MINUTE)
            .max(1);
        60_000 / rpm as u64 + self.pacing_buffer_ms
    }
}

/// The templated user message: title plus source text, with the instruction to
/// emit the translated title and body only
pub fn build_user_query(title: &str, source_text: &str) -> String {
    format!(
        "Original title: {}\nOriginal chapter content:\n---\n{}\n---\n\n\
         Apply the instructions exactly to the text above and output only the \
         translated, formatted text (the title, then the content).",
        title, source_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_table() {
        let config = WorkbenchConfig::default();
        assert_eq!(config.models.len(), 7);

        let flash = config.model("gemini-2.5-flash").unwrap();
        assert!(flash.supports_thinking);
        assert_eq!(flash.provider, Provider::Gemini);

        let lite = config.model("gemini-flash-lite-latest").unwrap();
        assert!(!lite.supports_thinking);

        let big = config.model("cerebras/gpt-oss-120b").unwrap();
        assert_eq!(big.reasoning_effort.as_deref(), Some("medium"));
        assert_eq!(big.max_output_tokens, 65_536);
    }

    #[test]
    fn test_pacing_interval() {
        let config = WorkbenchConfig::default();
        // gemini-2.5-flash: 10 rpm -> 6000ms + 200ms buffer
        assert_eq!(config.pacing_interval_ms("gemini-2.5-flash"), 6_200);
        // unknown models fall back to 10 rpm
        assert_eq!(config.pacing_interval_ms("no-such-model"), 6_200);
    }

    #[test]
    fn test_keys_for_dedup() {
        let config = WorkbenchConfig {
            gemini_keys: vec!["a".into(), "b".into(), "a".into()],
            ..Default::default()
        };
        assert_eq!(config.keys_for(Provider::Gemini), vec!["a", "b"]);
        assert!(config.keys_for(Provider::Cerebras).is_empty());
    }

    #[test]
    fn test_validate_gpt_oss_requires_endpoint() {
        let config = WorkbenchConfig {
            gpt_oss_keys: vec!["k".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WorkbenchConfig {
            gpt_oss_keys: vec!["k".into()],
            gpt_oss_base_url: "https://host/v1".into(),
            gpt_oss_model: "my-model".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_user_query_embeds_title_and_text() {
        let query = build_user_query("Chapter 1", "Once upon a time");
        assert!(query.contains("Chapter 1"));
        assert!(query.contains("Once upon a time"));
    }
}
