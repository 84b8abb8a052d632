//! Provider trait for the text-generation capability.

use serde::{Deserialize, Serialize};

use crate::chat::history::ChatMessage;

/// Everything a model sees for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system: String,
    /// History followed by the current user message.
    pub messages: Vec<ChatMessage>,
}

/// Provider error types
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("No content in response")]
    NoContent,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid response format: {0}")]
    InvalidFormat(String),
}

impl ProviderError {
    /// HTTP status when the backend answered with an error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::HttpError(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Provider trait for different generation backends
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Current model
    fn model(&self) -> &str;

    /// Produce the answer text for `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}
