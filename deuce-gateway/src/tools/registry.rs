use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use deuce_core::{ToolInvocationRecord, ToolStatus};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    Tool, ToolError, cycle_prediction::CyclePredictionTool, health_score::HealthScoreTool,
    kidney_function::KidneyFunctionTool, lipid_profile::LipidProfileTool,
    liver_function::LiverFunctionTool, symptom_checker::SymptomCheckerTool,
};

/// Collects tools at startup. Turned into an immutable [`ToolRegistry`].
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; names must be unique.
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Result<Self, ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

/// Read-only set of tools, shared by every session.
///
/// There is no way to add or remove a tool once built.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// All tools, ordered by name.
    pub fn tools(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate `input`, then run the tool on the blocking pool under `timeout`.
    ///
    /// On timeout the computation is left to finish in the background and its
    /// result is dropped.
    pub async fn invoke(
        &self,
        name: &str,
        input: Value,
        timeout: Duration,
    ) -> Result<Value, ToolError> {
        let tool = self.resolve(name)?;
        tool.validate(&input)
            .map_err(|reason| ToolError::SchemaValidation {
                tool: name.to_string(),
                reason,
            })?;

        let worker = Arc::clone(&tool);
        let task = tokio::task::spawn_blocking(move || worker.compute(&input));
        let output = match tokio::time::timeout(timeout, task).await {
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool: name.to_string(),
                    after_ms: timeout.as_millis() as u64,
                });
            }
            Ok(Err(join_err)) => {
                return Err(ToolError::Execution {
                    tool: name.to_string(),
                    reason: format!("calculation aborted: {join_err}"),
                });
            }
            Ok(Ok(result)) => result.map_err(|reason| ToolError::Execution {
                tool: name.to_string(),
                reason,
            })?,
        };

        tool.output_schema()
            .validate(&output)
            .map_err(|reason| ToolError::Execution {
                tool: name.to_string(),
                reason,
            })?;
        Ok(output)
    }

    /// Invoke and fold the outcome into a record; never fails.
    pub async fn invoke_recorded(
        &self,
        name: &str,
        input: Value,
        timeout: Duration,
    ) -> ToolInvocationRecord {
        let started = Instant::now();
        let result = self.invoke(name, input.clone(), timeout).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                debug!(tool = name, elapsed_ms, "tool succeeded");
                ToolInvocationRecord {
                    tool: name.to_string(),
                    input,
                    output: Some(output),
                    status: ToolStatus::Succeeded,
                    error: None,
                    elapsed_ms,
                }
            }
            Err(err) => {
                warn!(tool = name, error = %err, "tool call degraded");
                let status = match &err {
                    ToolError::SchemaValidation { .. } | ToolError::NotFound(_) => {
                        ToolStatus::InvalidInput
                    }
                    ToolError::Timeout { .. } => ToolStatus::TimedOut,
                    ToolError::Execution { .. } | ToolError::DuplicateTool(_) => {
                        ToolStatus::Failed
                    }
                };
                ToolInvocationRecord {
                    tool: name.to_string(),
                    input,
                    output: None,
                    status,
                    error: Some(err.to_string()),
                    elapsed_ms,
                }
            }
        }
    }
}

/// Registry holding every built-in calculator.
pub fn builtin_registry() -> Result<ToolRegistry, ToolError> {
    Ok(ToolRegistry::builder()
        .register(Arc::new(CyclePredictionTool::new()))?
        .register(Arc::new(HealthScoreTool::new()))?
        .register(Arc::new(KidneyFunctionTool::new()))?
        .register(Arc::new(LipidProfileTool::new()))?
        .register(Arc::new(LiverFunctionTool::new()))?
        .register(Arc::new(SymptomCheckerTool::new()))?
        .build())
}
