//! Retrieval planning: decide whether a turn needs knowledge passages and
//! what text to search for.

use std::sync::Arc;
use std::time::Duration;

use deuce_knowledge::{KnowledgeIndex, RetrievalResult};
use tracing::{debug, warn};

use crate::entities::contains_term;
use crate::intent::MessageIntent;
use crate::session::Session;

/// Openings that continue the previous question.
const CONTINUATIONS: &[&str] = &["and ", "what about", "how about", "also "];

const REFERRING_WORDS: &[&str] = &[
    "it", "its", "that", "this", "these", "those", "they", "them", "there", "same",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SmallTalk,
    /// Only asks for a calculation.
    ToolOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalDecision {
    Skip(SkipReason),
    Query { text: String },
}

pub struct RetrievalPlanner {
    index: Arc<KnowledgeIndex>,
    top_k: usize,
    timeout: Duration,
}

impl RetrievalPlanner {
    pub fn new(index: Arc<KnowledgeIndex>, top_k: usize, timeout: Duration) -> Self {
        Self {
            index,
            top_k,
            timeout,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Pure decision from the message, its intent and the session history.
    ///
    /// `resuming` is set when the message supplies input to a pending
    /// clarification; such an answer is tool-only unless it also asks a
    /// question.
    pub fn plan(
        &self,
        session: &Session,
        message: &str,
        intent: &MessageIntent,
        resuming: bool,
    ) -> RetrievalDecision {
        if intent.small_talk {
            return RetrievalDecision::Skip(SkipReason::SmallTalk);
        }
        let answering_clarification = resuming && !intent.informational;
        if intent.is_tool_only() || answering_clarification {
            return RetrievalDecision::Skip(SkipReason::ToolOnly);
        }
        RetrievalDecision::Query {
            text: rewrite_query(session.last_user_text().as_deref(), message),
        }
    }

    /// Run the decision against the current index generation.
    ///
    /// Failures and timeouts degrade to an empty result.
    pub async fn retrieve(&self, decision: &RetrievalDecision) -> RetrievalResult {
        let text = match decision {
            RetrievalDecision::Skip(reason) => {
                debug!(?reason, "retrieval skipped");
                return RetrievalResult::empty(self.index.generation());
            }
            RetrievalDecision::Query { text } => text,
        };

        match tokio::time::timeout(self.timeout, self.index.search_text(text, self.top_k)).await {
            Ok(Ok(result)) => {
                debug!(
                    generation = result.generation,
                    hits = result.len(),
                    "retrieval finished"
                );
                result
            }
            Ok(Err(err)) => {
                warn!(error = %err, "retrieval failed, answering without passages");
                RetrievalResult::empty(self.index.generation())
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "retrieval timed out, answering without passages"
                );
                RetrievalResult::empty(self.index.generation())
            }
        }
    }
}

/// Fold the previous user message into a follow-up that cannot stand on
/// its own ("what about the side effects?", "is that normal?").
pub fn rewrite_query(previous_user: Option<&str>, message: &str) -> String {
    let message = message.trim();
    let Some(previous) = previous_user.map(str::trim).filter(|p| !p.is_empty()) else {
        return message.to_string();
    };

    let lower = message.to_lowercase();
    let continuation =
        CONTINUATIONS.iter().any(|c| lower.starts_with(c)) || lower.contains("...");
    let referring = REFERRING_WORDS.iter().any(|w| contains_term(&lower, w));

    if continuation || referring {
        format!("{previous} {message}")
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::classify;
    use crate::tools::builtin_registry;
    use chrono::Utc;
    use deuce_core::{KnowledgeSettings, Turn};
    use deuce_knowledge::{HashEmbedder, SourceDocument};

    fn planner(index: Arc<KnowledgeIndex>) -> RetrievalPlanner {
        RetrievalPlanner::new(index, 3, Duration::from_secs(1))
    }

    fn empty_index() -> Arc<KnowledgeIndex> {
        Arc::new(KnowledgeIndex::new(
            Arc::new(HashEmbedder::new(64)),
            &KnowledgeSettings::default(),
        ))
    }

    #[test]
    fn standalone_question_is_kept() {
        assert_eq!(
            rewrite_query(
                Some("what is ovulation"),
                "Which foods are rich in iron and good for anemia?"
            ),
            "Which foods are rich in iron and good for anemia?"
        );
    }

    #[test]
    fn follow_up_folds_previous_message() {
        assert_eq!(
            rewrite_query(Some("What is a normal LDL level?"), "and for HDL?"),
            "What is a normal LDL level? and for HDL?"
        );
        assert_eq!(
            rewrite_query(
                Some("Tell me about metformin"),
                "Are there any side effects I should know about with it?"
            ),
            "Tell me about metformin Are there any side effects I should know about with it?"
        );
        assert_eq!(rewrite_query(None, "and for HDL?"), "and for HDL?");
    }

    #[test]
    fn short_standalone_question_is_not_folded() {
        let previous = Some("When will I ovulate if my period started 2025-05-01?");
        assert_eq!(rewrite_query(previous, "What causes fever?"), "What causes fever?");
        assert_eq!(rewrite_query(previous, "Is spinach healthy?"), "Is spinach healthy?");
        assert_eq!(
            rewrite_query(Some("What is a normal LDL level?"), "What about HDL?"),
            "What is a normal LDL level? What about HDL?"
        );
    }

    #[test]
    fn plan_skips_small_talk_and_tool_only() {
        let registry = builtin_registry().unwrap();
        let planner = planner(empty_index());
        let session = Session::new("s", 10, Utc::now());

        let hello = "hello!";
        let decision = planner.plan(&session, hello, &classify(&registry, hello), false);
        assert_eq!(decision, RetrievalDecision::Skip(SkipReason::SmallTalk));

        let tool = "Predict my cycle: last period started 2025-05-01, it lasted 5 days";
        let decision = planner.plan(&session, tool, &classify(&registry, tool), false);
        assert_eq!(decision, RetrievalDecision::Skip(SkipReason::ToolOnly));

        let question = "What causes a high temperature at night?";
        let decision = planner.plan(&session, question, &classify(&registry, question), false);
        assert_eq!(
            decision,
            RetrievalDecision::Query {
                text: question.to_string()
            }
        );
    }

    #[test]
    fn plan_uses_history_for_follow_ups() {
        let registry = builtin_registry().unwrap();
        let planner = planner(empty_index());
        let mut session = Session::new("s", 10, Utc::now());
        session.append(Turn::user("What is anemia?"));
        session.append(Turn::assistant("Anemia is ...", Vec::new()));

        let follow_up = "why does it happen?";
        let decision = planner.plan(&session, follow_up, &classify(&registry, follow_up), false);
        assert_eq!(
            decision,
            RetrievalDecision::Query {
                text: "What is anemia? why does it happen?".to_string()
            }
        );
    }

    #[test]
    fn only_an_actual_answer_skips_retrieval_after_a_clarification() {
        let registry = builtin_registry().unwrap();
        let planner = planner(empty_index());
        let session = Session::new("s", 10, Utc::now());

        let answer = "It lasted 4 days";
        let decision = planner.plan(&session, answer, &classify(&registry, answer), true);
        assert_eq!(decision, RetrievalDecision::Skip(SkipReason::ToolOnly));

        let question = "Which foods are rich in iron?";
        let decision = planner.plan(&session, question, &classify(&registry, question), false);
        assert_eq!(
            decision,
            RetrievalDecision::Query {
                text: question.to_string()
            }
        );
    }

    #[tokio::test]
    async fn empty_index_returns_empty_result() {
        let planner = planner(empty_index());
        let result = planner
            .retrieve(&RetrievalDecision::Query {
                text: "iron deficiency".to_string(),
            })
            .await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn query_hits_are_bounded_by_top_k() {
        let index = empty_index();
        let docs = (0..5)
            .map(|i| {
                SourceDocument::new(
                    format!("doc{i}"),
                    format!("# Iron {i}\n\nIron deficiency causes anemia and fatigue, note {i}."),
                )
            })
            .collect();
        index.build(docs).await.unwrap();

        let planner = RetrievalPlanner::new(index, 2, Duration::from_secs(1));
        let result = planner
            .retrieve(&RetrievalDecision::Query {
                text: "iron deficiency anemia".to_string(),
            })
            .await;
        assert_eq!(result.len(), 2);
        assert!(result.hits[0].score >= result.hits[1].score);
    }
}
