//! Message intent: small talk, informational questions and tool domains.
//!
//! Classification is keyword based and deterministic. Each tool declares
//! trigger phrases; a message gets one scored candidate per tool whose
//! triggers it mentions.

use crate::entities::{contains_term, extract_fields};
use crate::tools::{Tool, ToolRegistry};

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "thanks",
    "thank you",
    "thx",
    "bye",
    "goodbye",
    "how are you",
    "ok",
    "okay",
    "cool",
];

/// Phrases asking for explanation rather than a calculation.
const INFORMATIONAL_CUES: &[&str] = &[
    "what is",
    "what are",
    "what does",
    "what causes",
    "why",
    "explain",
    "tell me about",
    "how does",
    "how do",
    "how can",
    "how to",
    "is it normal",
    "should i",
    "advice",
    "tips",
    "recommend*",
    "mean",
];

const SMALL_TALK_MAX_WORDS: usize = 6;

/// One tool whose domain the message falls into.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolIntent {
    pub tool: String,
    /// In `[0, 1]`; grows with the number of triggers hit and with fields
    /// readable from the message.
    pub confidence: f32,
    pub matched: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageIntent {
    pub small_talk: bool,
    pub informational: bool,
    /// Candidates ordered by confidence descending, then name.
    pub tools: Vec<ToolIntent>,
}

impl MessageIntent {
    pub fn is_tool_only(&self) -> bool {
        !self.tools.is_empty() && !self.informational
    }
}

pub fn classify(registry: &ToolRegistry, text: &str) -> MessageIntent {
    let lower = text.to_lowercase();

    let mut tools: Vec<ToolIntent> = registry
        .tools()
        .filter_map(|tool| score_tool(tool.as_ref(), &lower))
        .collect();
    tools.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.tool.cmp(&b.tool))
    });

    let informational = INFORMATIONAL_CUES
        .iter()
        .any(|cue| contains_term(&lower, cue));
    let small_talk = tools.is_empty()
        && lower.split_whitespace().count() <= SMALL_TALK_MAX_WORDS
        && GREETINGS.iter().any(|g| contains_term(&lower, g));

    MessageIntent {
        small_talk,
        informational,
        tools,
    }
}

/// Score one tool against an already lowercased message.
pub fn score_tool(tool: &dyn Tool, lower: &str) -> Option<ToolIntent> {
    let matched: Vec<&'static str> = tool
        .triggers()
        .iter()
        .copied()
        .filter(|trigger| contains_term(lower, trigger))
        .collect();
    if matched.is_empty() {
        return None;
    }

    let mut confidence = 0.5 + 0.2 * (matched.len() - 1) as f32;
    if !extract_fields(tool.input_schema(), lower).is_empty() {
        confidence += 0.1;
    }

    Some(ToolIntent {
        tool: tool.name().to_string(),
        confidence: confidence.min(1.0),
        matched,
    })
}
