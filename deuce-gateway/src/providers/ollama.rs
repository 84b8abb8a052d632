//! Ollama chat client (`/api/chat`, non-streaming).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::chat::history::ChatRole;
use crate::providers::provider::{GenerationRequest, Provider, ProviderError};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Reasoning models (deepseek-r1) prefix their answer with a think block.
static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("think regex is valid"));

#[derive(Clone)]
pub struct OllamaClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(base_url: Option<&str>, model: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

/// Drop think blocks and surrounding whitespace.
pub fn clean_answer(raw: &str) -> String {
    THINK_RE.replace_all(raw, "").trim().to_string()
}

#[async_trait::async_trait]
impl Provider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(OllamaMessage {
                role: "system",
                content: &request.system,
            });
        }
        messages.extend(request.messages.iter().map(|m| OllamaMessage {
            role: role_name(m.role),
            content: &m.content,
        }));

        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let response = self
            .http_client
            .post(self.chat_url())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let response_text = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&response_text).map_err(|e| {
            let preview: String = response_text.chars().take(300).collect();
            ProviderError::InvalidFormat(format!("{e}: {preview}"))
        })?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: error,
            });
        }

        let content = parsed
            .message
            .map(|m| clean_answer(&m.content))
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ProviderError::NoContent);
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_blocks_are_removed() {
        let raw = "<think>\nthe user asks about iron\n</think>\n\nIron helps carry oxygen.";
        assert_eq!(clean_answer(raw), "Iron helps carry oxygen.");
    }

    #[test]
    fn base_url_defaults_and_trims() {
        let client = OllamaClient::new(None, "qwen2.5:1.5b");
        assert_eq!(client.chat_url(), "http://127.0.0.1:11434/api/chat");
        let client = OllamaClient::new(Some("http://gpu-box:11434/"), "qwen2.5:1.5b");
        assert_eq!(client.chat_url(), "http://gpu-box:11434/api/chat");
    }

    #[test]
    fn response_parses_message_content() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"model":"qwen2.5:1.5b","message":{"role":"assistant","content":"Hi"},"done":true}"#,
        )
        .unwrap();
        assert_eq!(parsed.message.unwrap().content, "Hi");
    }
}
