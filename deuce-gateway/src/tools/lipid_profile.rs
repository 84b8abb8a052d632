use serde_json::{Value, json};

use super::{FieldKind, FieldSpec, OutputSchema, Tool, ToolSchema, num};
use crate::tools::kidney_function::SEX_OPTIONS;

/// Lipid panel classification against adult reference bands (mg/dL).
pub struct LipidProfileTool {
    schema: ToolSchema,
}

impl LipidProfileTool {
    pub fn new() -> Self {
        let lipid = FieldKind::Number { min: 1.0, max: 2000.0 };
        Self {
            schema: ToolSchema::new(vec![
                FieldSpec::optional("total_cholesterol", lipid, "total cholesterol (mg/dL)")
                    .with_cues(&["total cholesterol", "total chol"]),
                FieldSpec::optional("ldl", lipid, "LDL cholesterol (mg/dL)").with_cues(&["ldl"]),
                FieldSpec::optional("hdl", lipid, "HDL cholesterol (mg/dL)").with_cues(&["hdl"]),
                FieldSpec::optional("triglycerides", lipid, "triglycerides (mg/dL)")
                    .with_cues(&["triglycerides", "triglyceride", "tg"]),
                FieldSpec::optional("sex", FieldKind::Choice(SEX_OPTIONS), "whether you are female or male")
                    .context_only(),
            ])
            .with_min_fields(1),
        }
    }
}

impl Default for LipidProfileTool {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_total(v: f64) -> &'static str {
    if v < 200.0 {
        "desirable"
    } else if v < 240.0 {
        "borderline high"
    } else {
        "high"
    }
}

fn classify_ldl(v: f64) -> &'static str {
    if v < 100.0 {
        "optimal"
    } else if v < 130.0 {
        "near optimal"
    } else if v < 160.0 {
        "borderline high"
    } else if v < 190.0 {
        "high"
    } else {
        "very high"
    }
}

fn classify_hdl(v: f64, female: bool) -> &'static str {
    let low = if female { 50.0 } else { 40.0 };
    if v < low {
        "low"
    } else if v >= 60.0 {
        "protective"
    } else {
        "acceptable"
    }
}

fn classify_triglycerides(v: f64) -> &'static str {
    if v < 150.0 {
        "normal"
    } else if v < 200.0 {
        "borderline high"
    } else if v < 500.0 {
        "high"
    } else {
        "very high"
    }
}

impl Tool for LipidProfileTool {
    fn name(&self) -> &str {
        "lipid_profile"
    }

    fn description(&self) -> &str {
        "Classifies total cholesterol, LDL, HDL and triglycerides against reference bands."
    }

    fn triggers(&self) -> &[&'static str] {
        &["lipid*", "cholesterol", "ldl", "hdl", "triglyceride*"]
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn output_schema(&self) -> OutputSchema {
        OutputSchema::new(&["classification", "concerns"])
    }

    fn compute(&self, input: &Value) -> Result<Value, String> {
        let female = input.get("sex").and_then(Value::as_str) == Some("female");
        let mut classification = serde_json::Map::new();
        let mut concerns = Vec::new();

        let mut record = |key: &str, label: &str, class: &'static str, concerning: bool| {
            classification.insert(key.to_string(), Value::from(class));
            if concerning {
                concerns.push(format!("{label} {class}"));
            }
        };

        if let Some(v) = num(input, "total_cholesterol") {
            let class = classify_total(v);
            record("total_cholesterol", "total cholesterol", class, class != "desirable");
        }
        if let Some(v) = num(input, "ldl") {
            let class = classify_ldl(v);
            record("ldl", "LDL", class, v >= 130.0);
        }
        if let Some(v) = num(input, "hdl") {
            let class = classify_hdl(v, female);
            record("hdl", "HDL", class, class == "low");
        }
        if let Some(v) = num(input, "triglycerides") {
            let class = classify_triglycerides(v);
            record("triglycerides", "triglycerides", class, class != "normal");
        }

        if classification.is_empty() {
            return Err("no lipid values supplied".to_string());
        }

        let ratio = match (num(input, "total_cholesterol"), num(input, "hdl")) {
            (Some(total), Some(hdl)) if hdl > 0.0 => Some(super::round_to(total / hdl, 1)),
            _ => None,
        };

        let summary = if concerns.is_empty() {
            "Lipid values are within desirable ranges.".to_string()
        } else {
            format!("Lipid concerns: {}.", concerns.join(", "))
        };

        Ok(json!({
            "summary": summary,
            "classification": classification,
            "concerns": concerns,
            "total_hdl_ratio": ratio,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_supplied_value() {
        let out = LipidProfileTool::new()
            .compute(&json!({"ldl": 165.0, "hdl": 45.0, "sex": "female"}))
            .unwrap();
        assert_eq!(out["classification"]["ldl"], "high");
        assert_eq!(out["classification"]["hdl"], "low");
        assert_eq!(out["summary"], "Lipid concerns: LDL high, HDL low.");
    }

    #[test]
    fn desirable_profile() {
        let out = LipidProfileTool::new()
            .compute(&json!({"total_cholesterol": 180.0, "hdl": 60.0}))
            .unwrap();
        assert_eq!(out["concerns"], json!([]));
        assert_eq!(out["total_hdl_ratio"], 3.0);
    }
}
