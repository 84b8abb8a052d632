//! Settings loaded from the TOML configuration file.
//!
//! Every section has serde defaults so a partial file is enough; a fully
//! commented default file is written on first run.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::knowledge::KnowledgeSettings;

/// Ordered list of model aliases used as a generation fallback chain.
///
/// Accepts either a single string (`"qwen"`) or a list
/// (`["qwen", "deepseek"]`) in TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelChain(Vec<String>);

impl ModelChain {
    pub fn single(alias: impl Into<String>) -> Self {
        Self(vec![alias.into()])
    }

    pub fn many(aliases: Vec<String>) -> Self {
        Self(aliases)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'de> Deserialize<'de> for ModelChain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ChainVisitor;

        impl<'de> Visitor<'de> for ChainVisitor {
            type Value = ModelChain;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a model alias or a list of model aliases")
            }

            fn visit_str<E>(self, value: &str) -> Result<ModelChain, E>
            where
                E: de::Error,
            {
                let value = value.trim();
                if value.is_empty() {
                    Ok(ModelChain(Vec::new()))
                } else {
                    Ok(ModelChain(vec![value.to_string()]))
                }
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<ModelChain, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut aliases = Vec::new();
                while let Some(alias) = seq.next_element::<String>()? {
                    let alias = alias.trim();
                    if !alias.is_empty() && !aliases.iter().any(|a| a == alias) {
                        aliases.push(alias.to_string());
                    }
                }
                Ok(ModelChain(aliases))
            }
        }

        deserializer.deserialize_any(ChainVisitor)
    }
}

impl Serialize for ModelChain {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.0.len() == 1 {
            serializer.serialize_str(&self.0[0])
        } else {
            self.0.serialize(serializer)
        }
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# Dr. Deuce configuration file
# Located at: ~/.config/dr-deuce/config.toml (override with DEUCE_CONFIG)

# Generation fallback chain; every alias must exist under [models].
default_model = ["qwen", "deepseek"]

[models.qwen]
provider = "ollama"
model = "qwen2.5:1.5b"
# base_url = "http://127.0.0.1:11434"

[models.deepseek]
provider = "ollama"
model = "deepseek-r1:1.5b"

[gateway]
host = "127.0.0.1"
port = 8000

[logging]
level = "info"

[session]
max_turns = 20
idle_timeout_minutes = 30
eviction_interval_seconds = 60
history_window = 6

[knowledge]
embedding_provider = "ollama"
embedding_url = "http://127.0.0.1:11434"
embedding_model = "nomic-embed-text"
embedding_batch = 32
top_k = 3
chunk_min_chars = 200
# documents_dir = "/var/lib/dr-deuce/knowledge"
# snapshot_path = "/var/lib/dr-deuce/index.json"

[orchestrator]
tool_timeout_ms = 5000
retrieval_timeout_ms = 4000
generation_timeout_ms = 60000
turn_timeout_ms = 90000
min_tool_confidence = 0.5

[generation]
cooldown_seconds = 120
"#;

/// Settings loaded from TOML configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Generation fallback chain (aliases into `models`).
    #[serde(default = "default_model_chain")]
    pub default_model: ModelChain,

    /// Configured models keyed by alias
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, ModelConfig>,

    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub knowledge: KnowledgeSettings,

    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    #[serde(default)]
    pub generation: GenerationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_model: default_model_chain(),
            models: default_models(),
            gateway: GatewaySettings::default(),
            logging: LoggingSettings::default(),
            session: SessionSettings::default(),
            knowledge: KnowledgeSettings::default(),
            orchestrator: OrchestratorSettings::default(),
            generation: GenerationSettings::default(),
        }
    }
}

/// Generation backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

/// Model configuration entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub provider: ProviderKind,
    /// Model identifier as known to the provider
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Gateway server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewaySettings {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace); `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Session store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Maximum turns kept per session; oldest are evicted first.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Idle minutes after which a session expires.
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: u64,
    /// Seconds between background eviction sweeps.
    #[serde(default = "default_eviction_interval_seconds")]
    pub eviction_interval_seconds: u64,
    /// Number of recent turns folded into query rewriting and generation.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.idle_timeout_minutes as i64)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_seconds.max(1))
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            idle_timeout_minutes: default_idle_timeout_minutes(),
            eviction_interval_seconds: default_eviction_interval_seconds(),
            history_window: default_history_window(),
        }
    }
}

/// Turn-level timeouts and routing thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,
    /// Aggregate budget for a whole turn; exceeding it fails the turn.
    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
    /// Minimum intent confidence for a tool to be considered plausible.
    #[serde(default = "default_min_tool_confidence")]
    pub min_tool_confidence: f32,
}

impl OrchestratorSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            tool_timeout_ms: default_tool_timeout_ms(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
            generation_timeout_ms: default_generation_timeout_ms(),
            turn_timeout_ms: default_turn_timeout_ms(),
            min_tool_confidence: default_min_tool_confidence(),
        }
    }
}

/// Generation fallback behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationSettings {
    /// Seconds a failing model is skipped before being retried.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

impl GenerationSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

fn default_model_chain() -> ModelChain {
    ModelChain::many(vec!["qwen".to_string(), "deepseek".to_string()])
}

fn default_models() -> BTreeMap<String, ModelConfig> {
    let mut models = BTreeMap::new();
    models.insert(
        "qwen".to_string(),
        ModelConfig {
            provider: ProviderKind::Ollama,
            model: "qwen2.5:1.5b".to_string(),
            base_url: None,
        },
    );
    models.insert(
        "deepseek".to_string(),
        ModelConfig {
            provider: ProviderKind::Ollama,
            model: "deepseek-r1:1.5b".to_string(),
            base_url: None,
        },
    );
    models
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_turns() -> usize {
    20
}

fn default_idle_timeout_minutes() -> u64 {
    30
}

fn default_eviction_interval_seconds() -> u64 {
    60
}

fn default_history_window() -> usize {
    6
}

fn default_tool_timeout_ms() -> u64 {
    5_000
}

fn default_retrieval_timeout_ms() -> u64 {
    4_000
}

fn default_generation_timeout_ms() -> u64 {
    60_000
}

fn default_turn_timeout_ms() -> u64 {
    90_000
}

fn default_min_tool_confidence() -> f32 {
    0.5
}

fn default_cooldown_seconds() -> u64 {
    120
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

impl Settings {
    /// Load settings from the config file, writing the default file when absent.
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::config_path()?;

        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, DEFAULT_CONFIG_TOML)?;
            tracing::info!("Wrote default configuration to {}", path.display());
        }

        let content = fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Resolve the config file path (`DEUCE_CONFIG` or the XDG config dir).
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(path) = std::env::var("DEUCE_CONFIG")
            && !path.trim().is_empty()
        {
            return Ok(PathBuf::from(path));
        }
        let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(dir.join("dr-deuce").join("config.toml"))
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_toml_matches_default_settings() {
        let parsed = Settings::from_toml(DEFAULT_CONFIG_TOML).unwrap();
        let defaults = Settings::default();

        assert_eq!(parsed.default_model, defaults.default_model);
        assert_eq!(parsed.models.len(), defaults.models.len());
        assert_eq!(parsed.gateway.port, defaults.gateway.port);
        assert_eq!(parsed.session.max_turns, defaults.session.max_turns);
        assert_eq!(parsed.knowledge.top_k, defaults.knowledge.top_k);
        assert_eq!(
            parsed.orchestrator.turn_timeout_ms,
            defaults.orchestrator.turn_timeout_ms
        );
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let settings = Settings::from_toml(
            r#"
default_model = "qwen"

[session]
max_turns = 4
"#,
        )
        .unwrap();

        assert_eq!(settings.default_model, ModelChain::single("qwen"));
        assert_eq!(settings.session.max_turns, 4);
        assert_eq!(settings.session.idle_timeout_minutes, 30);
        assert_eq!(settings.gateway.port, 8000);
        assert!(settings.models.contains_key("deepseek"));
    }

    #[test]
    fn model_chain_drops_blank_and_duplicate_aliases() {
        let settings = Settings::from_toml(r#"default_model = ["qwen", "", "qwen", "deepseek"]"#)
            .unwrap();
        let chain: Vec<&str> = settings.default_model.iter().collect();
        assert_eq!(chain, vec!["qwen", "deepseek"]);
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr(), "127.0.0.1:8000");
    }

    #[test]
    fn load_writes_default_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        unsafe { std::env::set_var("DEUCE_CONFIG", &path) };

        let settings = Settings::load().unwrap();
        unsafe { std::env::remove_var("DEUCE_CONFIG") };

        assert!(path.exists());
        assert_eq!(settings.session.history_window, 6);
    }
}
