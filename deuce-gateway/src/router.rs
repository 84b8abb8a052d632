//! Tool routing: which calculators a message asks for and with what input.
//!
//! Every plausible candidate is invoked rather than guessing a winner. If
//! any requested tool lacks required input the whole turn becomes a
//! deterministic clarification question. Informational questions only run
//! the tools whose input is already complete.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::entities::extract_fields;
use crate::intent::MessageIntent;
use crate::session::{PendingClarification, Session};
use crate::tools::{Tool, ToolRegistry};

/// A tool selected for this turn, with its constructed input.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub input: Value,
    pub confidence: f32,
}

/// What one tool still needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingInput {
    pub tool: String,
    pub label: String,
    /// Human descriptions of the missing fields.
    pub needs: Vec<String>,
    /// Fields already known, kept for the follow-up message.
    pub partial: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clarification {
    pub requests: Vec<MissingInput>,
    pub question: String,
}

impl Clarification {
    fn new(requests: Vec<MissingInput>) -> Self {
        let question = render_question(&requests);
        Self { requests, question }
    }

    /// Partial inputs to remember until the user answers.
    pub fn pending(&self) -> Vec<PendingClarification> {
        self.requests
            .iter()
            .map(|r| PendingClarification {
                tool: r.tool.clone(),
                partial: r.partial.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolDecision {
    None,
    Invoke(Vec<ToolCall>),
    Clarify(Clarification),
}

pub struct ToolRouter {
    registry: Arc<ToolRegistry>,
    min_confidence: f32,
    history_window: usize,
}

impl ToolRouter {
    pub fn new(registry: Arc<ToolRegistry>, min_confidence: f32, history_window: usize) -> Self {
        Self {
            registry,
            min_confidence,
            history_window,
        }
    }

    pub fn route(&self, session: &Session, message: &str, intent: &MessageIntent) -> ToolDecision {
        // (tool, confidence, asked for outright)
        let mut candidates: Vec<(Arc<dyn Tool>, f32, bool)> = intent
            .tools
            .iter()
            .filter(|t| t.confidence >= self.min_confidence)
            .filter_map(|t| {
                let tool = self.registry.resolve(&t.tool).ok()?;
                Some((tool, t.confidence, !intent.informational))
            })
            .collect();

        // An answer to an open clarification goes back to its tool even
        // without trigger words.
        for tool in self.resumed_tools(session, message, intent) {
            match candidates.iter_mut().find(|c| c.0.name() == tool.name()) {
                Some(candidate) => candidate.2 = true,
                None => candidates.push((tool, self.min_confidence, true)),
            }
        }

        if candidates.is_empty() {
            return ToolDecision::None;
        }

        let history = session.recent_user_texts(self.history_window);
        let mut calls = Vec::new();
        let mut missing = Vec::new();
        for (tool, confidence, requested) in candidates {
            let input = self.construct_input(tool.as_ref(), session, &history, message);
            let needs = missing_fields(tool.as_ref(), &input);
            if needs.is_empty() {
                calls.push(ToolCall {
                    tool: tool.name().to_string(),
                    input: Value::Object(input),
                    confidence,
                });
            } else if requested {
                missing.push(MissingInput {
                    tool: tool.name().to_string(),
                    label: tool.label(),
                    needs,
                    partial: input,
                });
            } else {
                // a question about the domain, not a request to calculate
                debug!(
                    "[session:{}] skipping {} for an informational question",
                    session.id,
                    tool.name()
                );
            }
        }

        if !missing.is_empty() {
            debug!(
                "[session:{}] clarification needed for {:?}",
                session.id,
                missing.iter().map(|m| m.tool.as_str()).collect::<Vec<_>>()
            );
            ToolDecision::Clarify(Clarification::new(missing))
        } else if calls.is_empty() {
            ToolDecision::None
        } else {
            debug!(
                "[session:{}] routing to {:?}",
                session.id,
                calls.iter().map(|c| c.tool.as_str()).collect::<Vec<_>>()
            );
            ToolDecision::Invoke(calls)
        }
    }

    /// Whether `message` answers an open clarification, i.e. supplies at
    /// least one field of a pending tool.
    pub fn resumes_pending(&self, session: &Session, message: &str, intent: &MessageIntent) -> bool {
        !self.resumed_tools(session, message, intent).is_empty()
    }

    fn resumed_tools(
        &self,
        session: &Session,
        message: &str,
        intent: &MessageIntent,
    ) -> Vec<Arc<dyn Tool>> {
        if intent.small_talk {
            return Vec::new();
        }
        session
            .pending()
            .iter()
            .filter_map(|pending| self.registry.resolve(&pending.tool).ok())
            .filter(|tool| !extract_fields(tool.input_schema(), message).is_empty())
            .collect()
    }

    /// Entities from recent history, then the pending partial input, then
    /// the current message; later sources win.
    fn construct_input(
        &self,
        tool: &dyn Tool,
        session: &Session,
        history: &[String],
        message: &str,
    ) -> Map<String, Value> {
        let schema = tool.input_schema();
        let mut input = Map::new();
        for text in history {
            input.extend(extract_fields(schema, text));
        }
        if let Some(pending) = session.pending_for(tool.name()) {
            input.extend(pending.partial.clone());
        }
        input.extend(extract_fields(schema, message));
        input
    }
}

/// Descriptions of what `input` lacks; empty when the tool can run.
fn missing_fields(tool: &dyn Tool, input: &Map<String, Value>) -> Vec<String> {
    let schema = tool.input_schema();
    let is_set = |name: &str| input.get(name).is_some_and(|v| !v.is_null());

    let mut needs: Vec<String> = schema
        .required_fields()
        .filter(|field| !is_set(field.name))
        .map(|field| field.description.to_string())
        .collect();

    let present = schema.counted_fields().filter(|f| is_set(f.name)).count();
    if needs.is_empty() && present < schema.min_fields {
        let options: Vec<String> = schema
            .counted_fields()
            .filter(|f| !f.required)
            .map(|f| f.description.to_string())
            .collect();
        needs.push(format!("at least one of {}", join_words(&options, "or")));
    }
    needs
}

fn render_question(requests: &[MissingInput]) -> String {
    let mut question: Vec<String> = requests
        .iter()
        .map(|r| {
            format!(
                "To run the {} I still need {}.",
                r.label,
                join_words(&r.needs, "and")
            )
        })
        .collect();
    question.push("Could you tell me?".to_string());
    question.join(" ")
}

/// "a", "a and b", "a, b and c"
fn join_words(items: &[String], conjunction: &str) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} {conjunction} {last}", init.join(", ")),
    }
}
