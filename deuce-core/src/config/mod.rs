//! Configuration management for Dr. Deuce.
//!
//! Settings come from a TOML file, with a handful of environment overrides
//! for deployment.
//!
//! # Configuration Sources
//!
//! ## Environment
//! - `DEUCE_CONFIG` - explicit path to the settings file
//! - `DEUCE_DATA_DIR` - root for knowledge documents and the index snapshot
//! - `DEUCE_HOST` / `DEUCE_PORT` - gateway bind address overrides
//!
//! ## Settings (TOML File)
//! Located at `~/.config/dr-deuce/config.toml`:
//! ```toml
//! default_model = ["qwen", "deepseek"]
//!
//! [models.qwen]
//! provider = "ollama"
//! model = "qwen2.5:1.5b"
//!
//! [session]
//! max_turns = 20
//!
//! [knowledge]
//! embedding_provider = "ollama"
//! top_k = 3
//! ```

pub mod knowledge;
mod settings;

use std::env;

pub use knowledge::{EmbeddingProvider, KnowledgeSettings};
pub use settings::{
    GatewaySettings, GenerationSettings, LoggingSettings, ModelChain, ModelConfig,
    OrchestratorSettings, ProviderKind, SessionSettings, Settings, SettingsError,
};

/// Load .env file if it exists.
pub fn load_dotenv() {
    // Silently ignore errors (file might not exist)
    let _ = dotenvy::dotenv();
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Default model chain is empty")]
    DefaultModelNotSet,

    #[error("Model alias '{0}' in default_model not found under [models]")]
    ModelNotFound(String),

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

impl Config {
    /// Load configuration from `.env`, the settings file and env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        load_dotenv();
        let settings = Settings::load()?;
        Self::from_settings(settings)
    }

    /// Validate already-parsed settings and apply environment overrides.
    pub fn from_settings(mut settings: Settings) -> Result<Self, ConfigError> {
        apply_env_overrides(&mut settings)?;

        if settings.default_model.is_empty() {
            return Err(ConfigError::DefaultModelNotSet);
        }
        for alias in settings.default_model.iter() {
            if !settings.models.contains_key(alias) {
                return Err(ConfigError::ModelNotFound(alias.to_string()));
            }
        }

        Ok(Self { settings })
    }

    /// Models of the generation fallback chain, in priority order.
    pub fn model_chain(&self) -> Vec<(&str, &ModelConfig)> {
        self.settings
            .default_model
            .iter()
            .filter_map(|alias| self.settings.models.get(alias).map(|m| (alias, m)))
            .collect()
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        self.settings.bind_addr()
    }
}

fn apply_env_overrides(settings: &mut Settings) -> Result<(), ConfigError> {
    if let Ok(host) = env::var("DEUCE_HOST")
        && !host.trim().is_empty()
    {
        settings.gateway.host = host;
    }
    if let Ok(port) = env::var("DEUCE_PORT") {
        settings.gateway.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
            var: "DEUCE_PORT",
            value: port.clone(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        let config = Config::from_settings(Settings::default()).unwrap();
        let chain: Vec<&str> = config.model_chain().iter().map(|(a, _)| *a).collect();
        assert_eq!(chain, vec!["qwen", "deepseek"]);
    }

    #[test]
    fn unknown_alias_is_rejected() {
        let mut settings = Settings::default();
        settings.default_model = ModelChain::single("missing");
        let err = Config::from_settings(settings).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn empty_chain_is_rejected() {
        let mut settings = Settings::default();
        settings.default_model = ModelChain::many(Vec::new());
        assert!(matches!(
            Config::from_settings(settings),
            Err(ConfigError::DefaultModelNotSet)
        ));
    }
}
