//! Assembles the generation context for one turn: persona, the user's
//! earlier results, retrieved passages, tool outcomes, history and the new
//! message.

use deuce_core::ToolInvocationRecord;
use deuce_knowledge::RetrievalResult;
use serde_json::Value;

use crate::chat::history::ChatMessage;
use crate::providers::GenerationRequest;

pub const SYSTEM_PROMPT: &str = "You are Dr. Deuce, a certified and authorized medical assistant. Answer in plain language and keep it concise. Use the reference passages and calculation results below when they are relevant and cite passages by their [id]. Never invent calculation results, and recommend seeing a doctor for anything serious.";

/// `health_data` holds results from earlier turns that stay relevant even
/// after those turns leave the history window.
pub fn build_generation_request(
    history: Vec<ChatMessage>,
    message: &str,
    health_data: &[&ToolInvocationRecord],
    retrieval: &RetrievalResult,
    tool_records: &[ToolInvocationRecord],
) -> GenerationRequest {
    let mut system = SYSTEM_PROMPT.to_string();
    if let Some(summary) = render_health_data(health_data) {
        system.push_str("\n\n## User's health data summary\n");
        system.push_str(&summary);
    }
    if let Some(passages) = render_passages(retrieval) {
        system.push_str("\n\n## Relevant information\n");
        system.push_str(&passages);
    }
    if let Some(results) = render_tool_results(tool_records) {
        system.push_str("\n\n## Calculation results\n");
        system.push_str(&results);
    }

    let mut messages = history;
    messages.push(ChatMessage::user(message));
    GenerationRequest { system, messages }
}

fn render_passages(retrieval: &RetrievalResult) -> Option<String> {
    if retrieval.is_empty() {
        return None;
    }
    let lines: Vec<String> = retrieval
        .hits
        .iter()
        .map(|hit| {
            let chunk = &hit.chunk;
            match &chunk.section {
                Some(section) => format!("[{}] ({}) {}", chunk.id, section, chunk.text.trim()),
                None => format!("[{}] {}", chunk.id, chunk.text.trim()),
            }
        })
        .collect();
    Some(lines.join("\n"))
}

fn render_health_data(records: &[&ToolInvocationRecord]) -> Option<String> {
    let lines: Vec<String> = records
        .iter()
        .filter_map(|record| {
            let summary = record.output.as_ref()?.get("summary")?.as_str()?;
            Some(format!("- {}: {}", record.tool, summary))
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn render_tool_results(records: &[ToolInvocationRecord]) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    let lines: Vec<String> = records
        .iter()
        .map(|record| {
            let summary = record
                .output
                .as_ref()
                .and_then(|out| out.get("summary"))
                .and_then(Value::as_str);
            match (summary, &record.error) {
                (Some(summary), _) => format!("- {}: {}", record.tool, summary),
                (None, Some(error)) => {
                    format!("- {} could not be computed: {}", record.tool, error)
                }
                (None, None) => format!("- {}: no result", record.tool),
            }
        })
        .collect();
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::history::ChatRole;
    use deuce_core::ToolStatus;
    use deuce_knowledge::{DocumentChunk, ScoredChunk};
    use serde_json::json;
    use std::sync::Arc;

    fn retrieval() -> RetrievalResult {
        RetrievalResult {
            generation: 3,
            hits: vec![ScoredChunk {
                chunk: Arc::new(DocumentChunk {
                    id: "womens-health/cycle.md#0".to_string(),
                    document_id: "womens-health/cycle.md".to_string(),
                    text: "Ovulation usually happens about 14 days before the next period.\n"
                        .to_string(),
                    section: Some("Ovulation".to_string()),
                    category: Some("womens-health".to_string()),
                    embedding: vec![1.0],
                }),
                score: 0.82,
            }],
        }
    }

    fn records() -> Vec<ToolInvocationRecord> {
        vec![
            ToolInvocationRecord {
                tool: "cycle_prediction".to_string(),
                input: json!({"start_date": "2025-05-01", "period_duration": 5}),
                output: Some(json!({
                    "summary": "Ovulation is expected around 2025-05-15 (fertile window 2025-05-13 to 2025-05-17); next period expected around 2025-05-29."
                })),
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
        ]
    }

    fn earlier_lipids() -> ToolInvocationRecord {
        ToolInvocationRecord {
            tool: "lipid_profile".to_string(),
            input: json!({"ldl": 165.0}),
            output: Some(json!({"summary": "Lipid concerns: LDL high."})),
            status: ToolStatus::Succeeded,
            error: None,
            elapsed_ms: 2,
        }
    }

    #[test]
    fn system_prompt_lists_passages_and_tool_outcomes() {
        let earlier = earlier_lipids();
        let request = build_generation_request(
            vec![ChatMessage::user("hi")],
            "When will I ovulate?",
            &[&earlier],
            &retrieval(),
            &records(),
        );

        insta::assert_snapshot!(request.system, @r"
        You are Dr. Deuce, a certified and authorized medical assistant. Answer in plain language and keep it concise. Use the reference passages and calculation results below when they are relevant and cite passages by their [id]. Never invent calculation results, and recommend seeing a doctor for anything serious.

        ## User's health data summary
        - lipid_profile: Lipid concerns: LDL high.

        ## Relevant information
        [womens-health/cycle.md#0] (Ovulation) Ovulation usually happens about 14 days before the next period.

        ## Calculation results
        - cycle_prediction: Ovulation is expected around 2025-05-15 (fertile window 2025-05-13 to 2025-05-17); next period expected around 2025-05-29.
        - health_score could not be computed: health_score timed out after 20 ms
        ");
    }

    #[test]
    fn bare_context_is_just_the_persona() {
        let request = build_generation_request(
            Vec::new(),
            "Hello",
            &[],
            &RetrievalResult::empty(0),
            &[],
        );
        assert_eq!(request.system, SYSTEM_PROMPT);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, ChatRole::User);
        assert_eq!(request.messages[0].content, "Hello");
    }
}
