pub mod cycle_prediction;
pub mod health_score;
pub mod kidney_function;
pub mod lipid_profile;
pub mod liver_function;
pub mod registry;
pub mod schema;
pub mod symptom_checker;

pub use registry::{ToolRegistry, ToolRegistryBuilder, builtin_registry};
pub use schema::{ChoiceOption, FieldKind, FieldSpec, OutputSchema, ToolSchema};

use serde_json::Value;

/// Tool-level failures. None of these abort a turn.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("unknown tool: {0}")]
    NotFound(String),

    #[error("invalid input for {tool}: {reason}")]
    SchemaValidation { tool: String, reason: String },

    #[error("{tool} failed: {reason}")]
    Execution { tool: String, reason: String },

    #[error("{tool} timed out after {after_ms} ms")]
    Timeout { tool: String, after_ms: u64 },
}

/// A pure health calculator.
///
/// `compute` must not touch shared state: the registry may abandon a call on
/// timeout while it keeps running on the blocking pool.
pub trait Tool: Send + Sync {
    /// Unique name (`snake_case`)
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Phrases that place a message in this tool's domain. A trailing `*`
    /// matches any word starting with the prefix.
    fn triggers(&self) -> &[&'static str];

    fn input_schema(&self) -> &ToolSchema;

    fn output_schema(&self) -> OutputSchema {
        OutputSchema::new(&[])
    }

    /// Human label used in clarifications and answer summaries.
    fn label(&self) -> String {
        self.name().replace('_', " ")
    }

    fn validate(&self, input: &Value) -> Result<(), String> {
        self.input_schema().validate(input)
    }

    /// Run the calculation on already-validated input.
    fn compute(&self, input: &Value) -> Result<Value, String>;
}

/// Read helpers for validated input.
pub(crate) fn num(input: &Value, key: &str) -> Option<f64> {
    input.get(key).and_then(Value::as_f64)
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Three-way classification against a reference range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RangeStatus {
    Low,
    Normal,
    High,
}

impl RangeStatus {
    pub(crate) fn classify(value: f64, low: Option<f64>, high: Option<f64>) -> Self {
        if low.is_some_and(|low| value < low) {
            RangeStatus::Low
        } else if high.is_some_and(|high| value > high) {
            RangeStatus::High
        } else {
            RangeStatus::Normal
        }
    }
}
