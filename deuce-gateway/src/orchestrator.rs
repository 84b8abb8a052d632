//! Dialogue orchestration: the per-turn state machine.
//!
//! ```text
//! RECEIVED -> PLANNING -> AWAITING_TOOLS -> GENERATING -> COMPLETED
//!                 |                            ^
//!                 +----------------------------+   (no tools)
//!                 +--> COMPLETED                   (clarification)
//! any non-terminal state -> ERROR
//! ```
//!
//! A turn holds its session's lock from start to finish. Nothing is written
//! to the session until generation has succeeded, and the write happens
//! without any await in between, so a turn that errors, times out or is
//! dropped by a disconnecting caller leaves the history untouched.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use deuce_core::{ChatReply, Citation, Settings, ToolInvocationRecord, ToolStatus, Turn};
use deuce_knowledge::{KnowledgeIndex, RetrievalResult};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info};

use crate::chat::{build_generation_request, build_history_messages};
use crate::generation::{GenerationChain, GenerationError};
use crate::intent::classify;
use crate::planner::RetrievalPlanner;
use crate::router::{Clarification, ToolCall, ToolDecision, ToolRouter};
use crate::session::{Session, SessionStore};
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnState {
    Received,
    Planning,
    AwaitingTools,
    Generating,
    Completed,
    Error,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Completed | TurnState::Error)
    }

    pub fn can_transition_to(self, next: TurnState) -> bool {
        use TurnState::*;
        match (self, next) {
            (Received, Planning)
            | (Planning, AwaitingTools)
            | (Planning, Generating)
            | (Planning, Completed)
            | (AwaitingTools, Generating)
            | (Generating, Completed) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Failures that abort a turn. Nothing is appended to the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("turn timed out after {after_ms} ms")]
    TurnTimeout { after_ms: u64 },
}

impl TurnError {
    /// Text shown to the user instead of an answer.
    pub fn user_message(&self) -> &'static str {
        match self {
            TurnError::EmptyMessage => "Please type a message.",
            TurnError::GenerationUnavailable(_) => {
                "Dr. Deuce can't answer right now. Please try again in a moment."
            }
            TurnError::TurnTimeout { .. } => {
                "That took too long to answer. Please try again."
            }
        }
    }
}

struct TurnTracker {
    session_id: String,
    state: TurnState,
}

impl TurnTracker {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: TurnState::Received,
        }
    }

    fn advance(&mut self, next: TurnState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid turn transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(
            "[session:{}] {:?} -> {:?}",
            self.session_id, self.state, next
        );
        self.state = next;
    }
}

/// Read-only view of a session for clients.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

pub struct Orchestrator {
    sessions: Arc<SessionStore>,
    registry: Arc<ToolRegistry>,
    index: Arc<KnowledgeIndex>,
    generator: Arc<GenerationChain>,
    planner: RetrievalPlanner,
    router: ToolRouter,
    tool_timeout: Duration,
    turn_timeout: Duration,
    history_window: usize,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        registry: Arc<ToolRegistry>,
        index: Arc<KnowledgeIndex>,
        generator: Arc<GenerationChain>,
        settings: &Settings,
    ) -> Self {
        let orchestrator = &settings.orchestrator;
        let planner = RetrievalPlanner::new(
            Arc::clone(&index),
            settings.knowledge.top_k,
            orchestrator.retrieval_timeout(),
        );
        let router = ToolRouter::new(
            Arc::clone(&registry),
            orchestrator.min_tool_confidence,
            settings.session.history_window,
        );
        Self {
            sessions,
            registry,
            index,
            generator,
            planner,
            router,
            tool_timeout: orchestrator.tool_timeout(),
            turn_timeout: orchestrator.turn_timeout(),
            history_window: settings.session.history_window,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &Arc<KnowledgeIndex> {
        &self.index
    }

    /// Answer one user message.
    ///
    /// Messages for the same session queue behind each other in arrival
    /// order. The turn timeout starts once the message reaches the front of
    /// its session's queue.
    pub async fn send_message(&self, session_id: &str, text: &str) -> Result<ChatReply, TurnError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let mut session = self.acquire(session_id).await;
        info!("[session:{}] message received", session_id);

        match tokio::time::timeout(self.turn_timeout, self.run_turn(&mut session, text)).await {
            Ok(result) => result,
            Err(_) => {
                let after_ms = self.turn_timeout.as_millis() as u64;
                error!("[session:{}] turn timed out after {} ms", session_id, after_ms);
                Err(TurnError::TurnTimeout { after_ms })
            }
        }
    }

    /// Drop a session's history. Returns whether the session existed.
    pub fn reset_session(&self, session_id: &str) -> bool {
        self.sessions.reset(session_id)
    }

    /// Snapshot of a session, waiting for any turn in progress.
    pub async fn history(&self, session_id: &str) -> Option<SessionView> {
        let handle = self.sessions.get(session_id)?;
        let session = handle.lock().await;
        Some(SessionView {
            session_id: session.id.clone(),
            title: session.title().map(str::to_string),
            created_at: session.created_at,
            last_active: session.last_active,
            turns: session.turns().iter().cloned().collect(),
        })
    }

    async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<Session> {
        let handle = self.sessions.get_or_create(session_id, Utc::now());
        handle.lock().await
    }

    async fn run_turn(&self, session: &mut Session, text: &str) -> Result<ChatReply, TurnError> {
        let mut tracker = TurnTracker::new(&session.id);
        tracker.advance(TurnState::Planning);
        session.touch(Utc::now());

        let intent = classify(&self.registry, text);
        let resuming = self.router.resumes_pending(session, text, &intent);
        let decision = self.router.route(session, text, &intent);
        let retrieval_plan = self.planner.plan(session, text, &intent, resuming);

        let calls = match decision {
            ToolDecision::Clarify(clarification) => {
                let reply = commit_clarification(session, text, clarification);
                tracker.advance(TurnState::Completed);
                return Ok(reply);
            }
            ToolDecision::None => Vec::new(),
            ToolDecision::Invoke(calls) => {
                tracker.advance(TurnState::AwaitingTools);
                calls
            }
        };

        let (retrieval, records) = tokio::join!(
            self.planner.retrieve(&retrieval_plan),
            self.invoke_tools(&calls),
        );
        tracker.advance(TurnState::Generating);

        let history = build_history_messages(session.recent(self.history_window), None);
        let earlier: Vec<&ToolInvocationRecord> = session
            .latest_results()
            .filter(|earlier| !records.iter().any(|record| record.tool == earlier.tool))
            .collect();
        let request = build_generation_request(history, text, &earlier, &retrieval, &records);
        let generated = match self.generator.generate(&request).await {
            Ok(generated) => generated,
            Err(GenerationError::Unavailable(reason)) => {
                tracker.advance(TurnState::Error);
                error!("[session:{}] generation unavailable: {}", session.id, reason);
                return Err(TurnError::GenerationUnavailable(reason));
            }
        };

        let answer = compose_answer(&generated.text, &records, &self.registry);
        let citations = citations(&retrieval);

        session.append(Turn::user(text));
        for record in &records {
            session.append(Turn::tool(record.clone()));
        }
        session.append(Turn::assistant(answer.clone(), retrieval.chunk_ids()));
        session.set_pending(Vec::new());
        tracker.advance(TurnState::Completed);

        info!(
            "[session:{}] answered with {} (tools: {}, passages: {})",
            session.id,
            generated.alias,
            records.len(),
            citations.len()
        );

        Ok(ChatReply {
            session_id: session.id.clone(),
            answer,
            citations,
            tool_calls: records,
            clarification: false,
            title: session.title().map(str::to_string),
        })
    }

    /// Run every selected tool to completion, failure or timeout.
    async fn invoke_tools(&self, calls: &[ToolCall]) -> Vec<ToolInvocationRecord> {
        join_all(calls.iter().map(|call| {
            self.registry
                .invoke_recorded(&call.tool, call.input.clone(), self.tool_timeout)
        }))
        .await
    }
}

fn commit_clarification(
    session: &mut Session,
    text: &str,
    clarification: Clarification,
) -> ChatReply {
    session.append(Turn::user(text));
    session.append(Turn::assistant(clarification.question.clone(), Vec::new()));
    session.set_pending(clarification.pending());
    info!(
        "[session:{}] asked for missing input ({} tools)",
        session.id,
        clarification.requests.len()
    );

    ChatReply {
        session_id: session.id.clone(),
        answer: clarification.question,
        citations: Vec::new(),
        tool_calls: Vec::new(),
        clarification: true,
        title: session.title().map(str::to_string),
    }
}

fn citations(retrieval: &RetrievalResult) -> Vec<Citation> {
    retrieval
        .hits
        .iter()
        .map(|hit| Citation {
            chunk_id: hit.chunk.id.clone(),
            document_id: hit.chunk.document_id.clone(),
            section: hit.chunk.section.clone(),
            score: hit.score,
        })
        .collect()
}

/// Model text followed by one line per tool call, so successful results
/// are always stated and failures always named.
pub fn compose_answer(text: &str, records: &[ToolInvocationRecord], registry: &ToolRegistry) -> String {
    let text = text.trim();
    if records.is_empty() {
        return text.to_string();
    }

    let lines: Vec<String> = records
        .iter()
        .map(|record| {
            let label = registry
                .resolve(&record.tool)
                .map(|tool| tool.label())
                .unwrap_or_else(|_| record.tool.replace('_', " "));
            let summary = record
                .output
                .as_ref()
                .and_then(|out| out.get("summary"))
                .and_then(Value::as_str);
            match (record.status, summary) {
                (ToolStatus::Succeeded, Some(summary)) => format!("- {label}: {summary}"),
                (status, _) => format!(
                    "- I couldn't compute the {label} because {}.",
                    failure_reason(status, record.error.as_deref())
                ),
            }
        })
        .collect();

    format!("{text}\n\nCalculation results:\n{}", lines.join("\n"))
}

fn failure_reason(status: ToolStatus, error: Option<&str>) -> String {
    let error = error.unwrap_or("no result was returned");
    match status {
        ToolStatus::TimedOut => "the calculation took too long".to_string(),
        ToolStatus::InvalidInput => format!("the input was not valid ({error})"),
        ToolStatus::Failed | ToolStatus::Succeeded => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin_registry;
    use serde_json::json;

    #[test]
    fn transitions_follow_the_state_machine() {
        use TurnState::*;
        assert!(Received.can_transition_to(Planning));
        assert!(Planning.can_transition_to(AwaitingTools));
        assert!(Planning.can_transition_to(Generating));
        assert!(Planning.can_transition_to(Completed));
        assert!(AwaitingTools.can_transition_to(Generating));
        assert!(Generating.can_transition_to(Completed));
        assert!(Generating.can_transition_to(Error));
        assert!(Received.can_transition_to(Error));

        assert!(!Received.can_transition_to(Generating));
        assert!(!AwaitingTools.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Error));
        assert!(!Error.can_transition_to(Planning));
    }

    #[test]
    fn answer_lists_successes_and_failures() {
        let registry = builtin_registry().unwrap();
        let records = vec![
            ToolInvocationRecord {
                tool: "symptom_checker".to_string(),
                input: json!({"symptoms": ["fever"]}),
                output: Some(json!({"summary": "Reported fever; urgency: self-care."})),
                status: ToolStatus::Succeeded,
                error: None,
                elapsed_ms: 1,
            },
            ToolInvocationRecord {
                tool: "health_score".to_string(),
                input: json!({"temperature": 38.5}),
                output: None,
                status: ToolStatus::TimedOut,
                error: Some("health_score timed out after 20 ms".to_string()),
                elapsed_ms: 20,
            },
        ];

        let answer = compose_answer("Rest and drink fluids. ", &records, &registry);
        assert_eq!(
            answer,
            "Rest and drink fluids.\n\nCalculation results:\n\
             - symptom checker: Reported fever; urgency: self-care.\n\
             - I couldn't compute the health score because the calculation took too long."
        );
    }

    #[test]
    fn answer_without_tools_is_the_model_text() {
        let registry = builtin_registry().unwrap();
        assert_eq!(compose_answer("  Hello!\n", &[], &registry), "Hello!");
    }

    #[test]
    fn user_messages_never_leak_internals() {
        let err = TurnError::GenerationUnavailable("qwen: connection refused".to_string());
        assert!(!err.user_message().contains("qwen"));
        assert!(err.user_message().contains("try again"));
    }
}
