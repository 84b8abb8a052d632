use chrono::{Duration, NaiveDate};
use serde_json::{Value, json};

use super::schema::DATE_FORMAT;
use super::{FieldKind, FieldSpec, OutputSchema, Tool, ToolSchema};

pub const DEFAULT_CYCLE_LENGTH: i64 = 28;
const LUTEAL_PHASE_DAYS: i64 = 14;
const FERTILE_MARGIN_DAYS: i64 = 2;

/// Predicts ovulation, the fertile window and the next period from the
/// start of the last period.
pub struct CyclePredictionTool {
    schema: ToolSchema,
}

impl CyclePredictionTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![
                FieldSpec::required(
                    "start_date",
                    FieldKind::Date,
                    "the first day of your last period (YYYY-MM-DD)",
                ),
                FieldSpec::required(
                    "period_duration",
                    FieldKind::Integer { min: 1, max: 15 },
                    "how many days your period lasts",
                )
                .with_cues(&[
                    "duration",
                    "day period",
                    "days period",
                    "lasts",
                    "lasted",
                    "lasting",
                    "days of bleeding",
                ]),
                FieldSpec::optional(
                    "cycle_length",
                    FieldKind::Integer { min: 20, max: 45 },
                    "your usual cycle length in days",
                )
                .with_cues(&["cycle", "cycle length", "cycle is", "cycles"]),
            ]),
        }
    }
}

impl Default for CyclePredictionTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for CyclePredictionTool {
    fn name(&self) -> &str {
        "cycle_prediction"
    }

    fn description(&self) -> &str {
        "Predicts ovulation, the fertile window and the next period from the last period's start date and duration."
    }

    fn triggers(&self) -> &[&'static str] {
        &[
            "ovulat*",
            "menstrua*",
            "fertile",
            "fertility",
            "next period",
            "last period",
            "period start*",
            "cycle prediction",
            "predict my cycle",
        ]
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn output_schema(&self) -> OutputSchema {
        OutputSchema::new(&[
            "ovulation_date",
            "fertile_window_start",
            "fertile_window_end",
            "next_period_start",
            "period_end",
        ])
    }

    fn compute(&self, input: &Value) -> Result<Value, String> {
        let start = input["start_date"]
            .as_str()
            .and_then(|raw| NaiveDate::parse_from_str(raw, DATE_FORMAT).ok())
            .ok_or_else(|| "start_date is not a valid date".to_string())?;
        let duration = input["period_duration"]
            .as_i64()
            .ok_or_else(|| "period_duration is missing".to_string())?;
        let cycle_length = input
            .get("cycle_length")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_CYCLE_LENGTH);

        let period_end = start + Duration::days(duration);
        let next_period = start + Duration::days(cycle_length);
        let ovulation = next_period - Duration::days(LUTEAL_PHASE_DAYS);
        let window_start = ovulation - Duration::days(FERTILE_MARGIN_DAYS);
        let window_end = ovulation + Duration::days(FERTILE_MARGIN_DAYS);

        let fmt = |d: NaiveDate| d.format(DATE_FORMAT).to_string();
        Ok(json!({
            "summary": format!(
                "Ovulation is expected around {} (fertile window {} to {}); next period expected around {}.",
                fmt(ovulation),
                fmt(window_start),
                fmt(window_end),
                fmt(next_period)
            ),
            "ovulation_date": fmt(ovulation),
            "fertile_window_start": fmt(window_start),
            "fertile_window_end": fmt(window_end),
            "next_period_start": fmt(next_period),
            "period_end": fmt(period_end),
            "cycle_length": cycle_length,
        }))
    }
}
