//! Configuration loading from murmur.toml.

use policy::{DEFAULT_TTL_MINUTES, ToolPolicy};
use runtime::providers::DEFAULT_MAX_TOKENS;
use runtime::{DEFAULT_MAX_ROUNDS, OrchestratorConfig, ProviderKind};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Which model to talk to.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Tool exposure and the tool loop.
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Fallback log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Provider configuration.
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_kind")]
    pub kind: ProviderKind,

    /// Model to use. Defaults per provider.
    pub model: Option<String>,

    /// API key. Falls back to the provider's environment variable.
    pub api_key: Option<String>,

    /// Endpoint override, e.g. a local proxy.
    pub base_url: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            model: None,
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
        }
    }
}

/// Tool configuration.
#[derive(Debug, Deserialize)]
pub struct ToolsConfig {
    /// Tools every exchange sees.
    #[serde(default = "default_baseline")]
    pub baseline: Vec<String>,

    /// Lifetime of a model-requested grant.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,

    /// Tool rounds allowed per user turn.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            ttl_minutes: default_ttl_minutes(),
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_kind() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_baseline() -> Vec<String> {
    vec![runtime::tools::CURRENT_TIME.to_string()]
}

fn default_ttl_minutes() -> i64 {
    DEFAULT_TTL_MINUTES
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

fn default_system_prompt() -> String {
    "You are Murmur, a voice assistant. Answer in short, speakable sentences.".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            tools: ToolsConfig::default(),
            system_prompt: default_system_prompt(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn model(&self) -> &str {
        self.provider
            .model
            .as_deref()
            .unwrap_or(match self.provider.kind {
                ProviderKind::OpenAi => "gpt-4o-mini",
                ProviderKind::Anthropic => "claude-sonnet-4-20250514",
                ProviderKind::Gemini => "gemini-2.5-flash",
            })
    }

    /// The configured key, else the provider's environment variable.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.api_key_from(|name| std::env::var(name).ok())
    }

    fn api_key_from(&self, env: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
        let kind = self.provider.kind;
        self.provider
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env(kind.api_key_env()).filter(|k| !k.trim().is_empty()))
            .ok_or(ConfigError::MissingApiKey {
                kind,
                env: kind.api_key_env(),
            })
    }

    pub fn policy(&self) -> ToolPolicy {
        ToolPolicy::with_baseline(self.tools.baseline.iter().cloned())
            .ttl_minutes(self.tools.ttl_minutes)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        let config = OrchestratorConfig::default().max_tokens(self.provider.max_tokens);
        match &self.provider.base_url {
            Some(url) => config.base_url(self.provider.kind, url.clone()),
            None => config,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("no API key for {kind}: set provider.api_key or {env}")]
    MissingApiKey { kind: ProviderKind, env: &'static str },
}
