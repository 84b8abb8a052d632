use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a turn in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
            TurnRole::Tool => write!(f, "tool"),
        }
    }
}

/// Body of a turn: plain text or a structured tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnContent {
    Text { text: String },
    ToolResult { tool: String, output: Value },
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Succeeded,
    InvalidInput,
    Failed,
    TimedOut,
}

impl ToolStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ToolStatus::Succeeded)
    }
}

/// Record of a tool call made while answering a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    pub tool: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// One entry of a session's history. Immutable once appended; `seq` is
/// assigned by the session on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub seq: u64,
    pub role: TurnRole,
    pub content: TurnContent,
    /// Chunk identifiers the answer drew on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolInvocationRecord>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    fn new(role: TurnRole, content: TurnContent) -> Self {
        Self {
            seq: 0,
            role,
            content,
            citations: Vec::new(),
            tool_call: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnRole::User, TurnContent::Text { text: text.into() })
    }

    pub fn assistant(text: impl Into<String>, citations: Vec<String>) -> Self {
        let mut turn = Self::new(TurnRole::Assistant, TurnContent::Text { text: text.into() });
        turn.citations = citations;
        turn
    }

    /// Tool turn carrying the structured output (or the error) of one call.
    pub fn tool(record: ToolInvocationRecord) -> Self {
        let output = match (&record.output, &record.error) {
            (Some(output), _) => output.clone(),
            (None, Some(error)) => serde_json::json!({ "error": error }),
            (None, None) => Value::Null,
        };
        let mut turn = Self::new(
            TurnRole::Tool,
            TurnContent::ToolResult {
                tool: record.tool.clone(),
                output,
            },
        );
        turn.tool_call = Some(record);
        turn
    }

    /// Text used when the turn is replayed as history.
    pub fn text(&self) -> String {
        match &self.content {
            TurnContent::Text { text } => text.clone(),
            TurnContent::ToolResult { tool, output } => match output.get("summary") {
                Some(Value::String(summary)) => format!("[{tool}] {summary}"),
                _ => format!("[{tool}] {output}"),
            },
        }
    }
}

/// A knowledge passage an answer drew on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub score: f32,
}

/// Reply to `send_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub tool_calls: Vec<ToolInvocationRecord>,
    /// True when the answer asks for missing tool input.
    #[serde(default)]
    pub clarification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}
