//! Configuration loading, validation, and management for emissary.
//!
//! Loads configuration from `emissary.toml` with environment variable
//! overrides for credentials. Validates all settings at startup; there is
//! no ambient global state — the loaded struct is passed into constructors.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `emissary.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote chat-completion service settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Push-notification sink settings
    #[serde(default)]
    pub pushover: PushoverConfig,

    /// Persona document settings
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Conversation loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Gateway (HTTP server) settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("pushover", &self.pushover)
            .field("persona", &self.persona)
            .field("agent", &self.agent)
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// Settings for the remote chat-completion service.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Service endpoint URL (e.g. https://my-resource.openai.azure.com)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// API key. Usually supplied via AZURE_OPENAI_API_KEY instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Fixed API version string sent with every request
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Model deployment name
    #[serde(default = "default_deployment")]
    pub deployment: String,
}

fn default_api_version() -> String {
    "2024-10-21".into()
}
fn default_deployment() -> String {
    "gpt-4o".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: default_api_version(),
            deployment: default_deployment(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .finish()
    }
}

/// Settings for the Pushover notification sink.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PushoverConfig {
    /// Application token. Usually supplied via PUSHOVER_TOKEN instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// User key. Usually supplied via PUSHOVER_USER instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_key: Option<String>,
}

impl std::fmt::Debug for PushoverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushoverConfig")
            .field("token", &redact(&self.token))
            .field("user_key", &redact(&self.user_key))
            .finish()
    }
}

/// Where the persona's documents live and who the persona is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// The name the assistant stays in character as
    #[serde(default = "default_persona_name")]
    pub name: String,

    /// PDF resume, extracted page by page
    #[serde(default = "default_resume_path")]
    pub resume_path: PathBuf,

    /// Plain-text experience note, read verbatim
    #[serde(default = "default_experience_path")]
    pub experience_path: PathBuf,
}

fn default_persona_name() -> String {
    "Emissary".into()
}
fn default_resume_path() -> PathBuf {
    PathBuf::from("me/resume.pdf")
}
fn default_experience_path() -> PathBuf {
    PathBuf::from("me/experience.txt")
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            resume_path: default_resume_path(),
            experience_path: default_experience_path(),
        }
    }
}

/// Conversation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per model response (None = provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Maximum tool-call rounds per turn before the turn fails
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tool_rounds() -> u32 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (`./emissary.toml`, or the
    /// file named by `EMISSARY_CONFIG`).
    ///
    /// Credentials are taken from the environment when the file omits them:
    /// - `AZURE_OPENAI_API_KEY`, `AZURE_OPENAI_ENDPOINT`
    /// - `PUSHOVER_TOKEN`, `PUSHOVER_USER`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("EMISSARY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("emissary.toml"));
        Self::load_path(&path)
    }

    /// Load configuration from the given file, applying env overrides.
    pub fn load_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Pull credentials from the environment when the file omitted them.
    fn apply_env_overrides(&mut self) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("AZURE_OPENAI_API_KEY").ok();
        }
        if self.provider.endpoint.is_none() {
            self.provider.endpoint = std::env::var("AZURE_OPENAI_ENDPOINT").ok();
        }
        if self.pushover.token.is_none() {
            self.pushover.token = std::env::var("PUSHOVER_TOKEN").ok();
        }
        if self.pushover.user_key.is_none() {
            self.pushover.user_key = std::env::var("PUSHOVER_USER").ok();
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.temperature < 0.0 || self.agent.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_rounds must be at least 1".into(),
            ));
        }

        if self.persona.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "persona.name must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for first-run setup).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            pushover: PushoverConfig::default(),
            persona: PersonaConfig::default(),
            agent: AgentConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider.api_version, "2024-10-21");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.agent.max_tool_rounds, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.deployment, config.provider.deployment);
        assert_eq!(parsed.gateway.port, config.gateway.port);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            agent: AgentConfig {
                temperature: 5.0,
                ..AgentConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_tool_rounds_rejected() {
        let config = AppConfig {
            agent: AgentConfig {
                max_tool_rounds: 0,
                ..AgentConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/emissary.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.persona.name, "Emissary");
    }

    #[test]
    fn parse_full_file() {
        let toml_str = r#"
[provider]
endpoint = "https://acme.openai.azure.com"
deployment = "gpt-4o-mini"

[persona]
name = "Ada Lovelace"
resume_path = "docs/cv.pdf"
experience_path = "docs/background.txt"

[agent]
max_tool_rounds = 4

[gateway]
port = 3000
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.provider.endpoint.as_deref(),
            Some("https://acme.openai.azure.com")
        );
        assert_eq!(config.provider.deployment, "gpt-4o-mini");
        assert_eq!(config.persona.name, "Ada Lovelace");
        assert_eq!(config.agent.max_tool_rounds, 4);
        assert_eq!(config.gateway.port, 3000);
        // Unset sections fall back to defaults
        assert_eq!(config.provider.api_version, "2024-10-21");
        assert!(config.pushover.token.is_none());
    }

    #[test]
    fn load_from_written_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("emissary.toml");
        std::fs::write(&path, "[gateway]\nport = 9999\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.gateway.port, 9999);
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            provider: ProviderConfig {
                api_key: Some("sk-secret".into()),
                ..ProviderConfig::default()
            },
            pushover: PushoverConfig {
                token: Some("app-token".into()),
                user_key: Some("user-key".into()),
            },
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("app-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("2024-10-21"));
        assert!(toml_str.contains("8080"));
    }
}
