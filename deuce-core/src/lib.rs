//! Shared configuration and conversation types for Dr. Deuce.

pub mod config;
pub mod message;

pub use config::{
    Config, ConfigError, EmbeddingProvider, GatewaySettings, GenerationSettings,
    KnowledgeSettings, LoggingSettings, ModelChain, ModelConfig, OrchestratorSettings,
    ProviderKind, SessionSettings, Settings, SettingsError, load_dotenv,
};
pub use message::{
    ChatReply, Citation, ToolInvocationRecord, ToolStatus, Turn, TurnContent, TurnRole,
};
