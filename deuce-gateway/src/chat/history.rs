//! Provider-neutral chat history built from session turns.

use deuce_core::{Turn, TurnRole};
use serde::{Deserialize, Serialize};

/// Role in provider-neutral chat history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

impl From<TurnRole> for ChatRole {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => ChatRole::User,
            TurnRole::Assistant => ChatRole::Assistant,
            TurnRole::Tool => ChatRole::Tool,
        }
    }
}

/// Provider-neutral chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Build history messages from session turns with optional limit.
///
/// Tool turns are replayed through their summary line.
pub fn build_history_messages<'a>(
    turns: impl IntoIterator<Item = &'a Turn>,
    limit: Option<usize>,
) -> Vec<ChatMessage> {
    let mut history: Vec<ChatMessage> = turns
        .into_iter()
        .map(|turn| ChatMessage {
            role: turn.role.into(),
            content: turn.text(),
        })
        .collect();

    if let Some(limit) = limit
        && history.len() > limit
    {
        history.drain(..history.len() - limit);
    }
    history
}
