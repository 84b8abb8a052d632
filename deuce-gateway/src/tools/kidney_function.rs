use serde_json::{Value, json};

use super::{
    ChoiceOption, FieldKind, FieldSpec, OutputSchema, RangeStatus, Tool, ToolSchema, num,
    round_to,
};

pub const SEX_OPTIONS: &[ChoiceOption] = &[
    ChoiceOption {
        value: "female",
        aliases: &["woman", "women"],
    },
    ChoiceOption {
        value: "male",
        aliases: &["man", "men"],
    },
];

struct Marker {
    key: &'static str,
    label: &'static str,
    low: Option<f64>,
    high: Option<f64>,
    low_note: &'static str,
    high_note: &'static str,
}

const MARKERS: &[Marker] = &[
    Marker {
        key: "creatinine",
        label: "Serum creatinine",
        low: Some(0.6),
        high: Some(1.2),
        low_note: "Low levels may indicate reduced muscle mass.",
        high_note: "High levels may indicate impaired kidney function.",
    },
    Marker {
        key: "bun",
        label: "BUN",
        low: Some(7.0),
        high: Some(20.0),
        low_note: "Low levels may indicate malnutrition or liver disease.",
        high_note: "High levels may indicate kidney dysfunction or dehydration.",
    },
    Marker {
        key: "sodium",
        label: "Serum sodium",
        low: Some(135.0),
        high: Some(145.0),
        low_note: "Low levels may indicate overhydration or kidney dysfunction.",
        high_note: "High levels may indicate dehydration.",
    },
    Marker {
        key: "potassium",
        label: "Serum potassium",
        low: Some(3.5),
        high: Some(5.0),
        low_note: "Low levels may indicate alkalosis or diuretic use.",
        high_note: "High levels may indicate kidney dysfunction or acidosis.",
    },
    Marker {
        key: "uric_acid",
        label: "Serum uric acid",
        low: Some(3.5),
        high: Some(7.2),
        low_note: "Low levels may indicate liver disease.",
        high_note: "High levels may indicate gout or kidney dysfunction.",
    },
];

/// MDRD estimate in mL/min/1.73m².
pub fn egfr_mdrd(creatinine: f64, age: f64, female: bool) -> f64 {
    let sex_factor = if female { 0.742 } else { 1.0 };
    186.0 * creatinine.powf(-1.154) * age.powf(-0.203) * sex_factor
}

pub fn ckd_stage(egfr: f64) -> &'static str {
    if egfr >= 90.0 {
        "Stage 1 (normal or high)"
    } else if egfr >= 60.0 {
        "Stage 2 (mildly decreased)"
    } else if egfr >= 30.0 {
        "Stage 3 (moderate CKD)"
    } else if egfr >= 15.0 {
        "Stage 4 (severe CKD)"
    } else {
        "Stage 5 (kidney failure)"
    }
}

/// Kidney panel: eGFR with CKD stage plus reference-range checks.
pub struct KidneyFunctionTool {
    schema: ToolSchema,
}

impl KidneyFunctionTool {
    pub fn new() -> Self {
        let number = |min, max| FieldKind::Number { min, max };
        Self {
            schema: ToolSchema::new(vec![
                FieldSpec::required("creatinine", number(0.1, 20.0), "your serum creatinine (mg/dL)")
                    .with_cues(&["creatinine", "serum creatinine", "cr"]),
                FieldSpec::required("age", FieldKind::Integer { min: 18, max: 120 }, "your age in years")
                    .with_cues(&["age", "aged", "years old", "year old", "yo"]),
                FieldSpec::required("sex", FieldKind::Choice(SEX_OPTIONS), "whether you are female or male"),
                FieldSpec::optional("bun", number(1.0, 200.0), "blood urea nitrogen (mg/dL)")
                    .with_cues(&["bun", "blood urea nitrogen"]),
                FieldSpec::optional("sodium", number(100.0, 180.0), "serum sodium (mEq/L)")
                    .with_cues(&["sodium", "na"]),
                FieldSpec::optional("potassium", number(1.0, 10.0), "serum potassium (mEq/L)")
                    .with_cues(&["potassium"]),
                FieldSpec::optional("uric_acid", number(0.5, 20.0), "serum uric acid (mg/dL)")
                    .with_cues(&["uric acid"]),
            ]),
        }
    }
}

impl Default for KidneyFunctionTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for KidneyFunctionTool {
    fn name(&self) -> &str {
        "kidney_function"
    }

    fn description(&self) -> &str {
        "Estimates eGFR (MDRD) and CKD stage from creatinine, age and sex, and checks other kidney markers against reference ranges."
    }

    fn triggers(&self) -> &[&'static str] {
        &["kidney*", "renal", "egfr", "gfr", "creatinine", "kft"]
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn output_schema(&self) -> OutputSchema {
        OutputSchema::new(&["egfr", "ckd_stage", "findings"])
    }

    fn compute(&self, input: &Value) -> Result<Value, String> {
        let creatinine = num(input, "creatinine").ok_or("creatinine is missing")?;
        let age = num(input, "age").ok_or("age is missing")?;
        let female = input["sex"].as_str() == Some("female");

        let egfr = round_to(egfr_mdrd(creatinine, age, female), 1);
        let stage = ckd_stage(egfr);

        let mut findings = Vec::new();
        let mut abnormal = Vec::new();
        for marker in MARKERS {
            let Some(value) = num(input, marker.key) else {
                continue;
            };
            let status = RangeStatus::classify(value, marker.low, marker.high);
            let note = match status {
                RangeStatus::Low => marker.low_note,
                RangeStatus::High => marker.high_note,
                RangeStatus::Normal => "Within the reference range.",
            };
            if status != RangeStatus::Normal {
                abnormal.push(marker.label);
            }
            findings.push(json!({
                "parameter": marker.label,
                "value": value,
                "status": status,
                "note": note,
            }));
        }

        let mut recommendations = Vec::new();
        if egfr < 60.0 {
            recommendations.push("Discuss your kidney function with a nephrologist.");
            recommendations.push("Limit salt and avoid NSAID painkillers unless prescribed.");
        } else if egfr < 90.0 {
            recommendations.push("Recheck kidney function within a year and keep blood pressure controlled.");
        } else {
            recommendations.push("Keep hydrated and maintain a balanced diet.");
        }

        let mut summary = format!("Estimated GFR {egfr} mL/min/1.73m² ({stage}).");
        if !abnormal.is_empty() {
            summary.push_str(&format!(" Out of range: {}.", abnormal.join(", ")));
        }

        Ok(json!({
            "summary": summary,
            "egfr": egfr,
            "ckd_stage": stage,
            "findings": findings,
            "recommendations": recommendations,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mdrd_matches_reference_values() {
        // 186 * 1.0^-1.154 * 50^-0.203 ≈ 84.07
        let egfr = egfr_mdrd(1.0, 50.0, false);
        assert!((egfr - 84.07).abs() < 0.05, "got {egfr}");
        assert!((egfr_mdrd(1.0, 50.0, true) - egfr * 0.742).abs() < 1e-9);
    }

    #[test]
    fn stages_follow_thresholds() {
        assert_eq!(ckd_stage(95.0), "Stage 1 (normal or high)");
        assert_eq!(ckd_stage(60.0), "Stage 2 (mildly decreased)");
        assert_eq!(ckd_stage(45.0), "Stage 3 (moderate CKD)");
        assert_eq!(ckd_stage(20.0), "Stage 4 (severe CKD)");
        assert_eq!(ckd_stage(10.0), "Stage 5 (kidney failure)");
    }

    #[test]
    fn flags_out_of_range_markers() {
        let out = KidneyFunctionTool::new()
            .compute(&json!({"creatinine": 2.4, "age": 67, "sex": "female", "potassium": 5.6}))
            .unwrap();
        assert!(out["egfr"].as_f64().unwrap() < 30.0);
        assert!(out["summary"].as_str().unwrap().contains("Serum potassium"));
        assert_eq!(out["findings"].as_array().unwrap().len(), 2);
    }
}
