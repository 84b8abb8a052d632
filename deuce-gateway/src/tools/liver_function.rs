use serde_json::{Value, json};

use super::{FieldKind, FieldSpec, OutputSchema, RangeStatus, Tool, ToolSchema, num, round_to};

struct Marker {
    key: &'static str,
    label: &'static str,
    low: Option<f64>,
    high: Option<f64>,
    note_low: &'static str,
    note_high: &'static str,
}

const MARKERS: &[Marker] = &[
    Marker {
        key: "alt",
        label: "ALT (SGPT)",
        low: None,
        high: Some(56.0),
        note_low: "",
        note_high: "Elevated, suggests liver inflammation or injury.",
    },
    Marker {
        key: "ast",
        label: "AST (SGOT)",
        low: None,
        high: Some(40.0),
        note_low: "",
        note_high: "Elevated, suggests liver damage or muscle injury.",
    },
    Marker {
        key: "alp",
        label: "ALP",
        low: Some(44.0),
        high: Some(120.0),
        note_low: "Decreased, may suggest malnutrition or hypothyroidism.",
        note_high: "Elevated, suggests bile duct obstruction or bone/liver disease.",
    },
    Marker {
        key: "total_bilirubin",
        label: "Total bilirubin",
        low: Some(0.3),
        high: Some(1.2),
        note_low: "Slightly low, usually not significant.",
        note_high: "Elevated, suggests jaundice or liver dysfunction.",
    },
    Marker {
        key: "albumin",
        label: "Albumin",
        low: Some(3.5),
        high: Some(5.0),
        note_low: "Decreased, suggests chronic liver disease or malnutrition.",
        note_high: "Slightly high, often from dehydration.",
    },
];

/// Liver panel reference-range checks and the ALT:AST ratio.
pub struct LiverFunctionTool {
    schema: ToolSchema,
}

impl LiverFunctionTool {
    pub fn new() -> Self {
        let enzyme = FieldKind::Number { min: 0.0, max: 5000.0 };
        Self {
            schema: ToolSchema::new(vec![
                FieldSpec::optional("alt", enzyme, "ALT / SGPT (U/L)").with_cues(&["alt", "sgpt"]),
                FieldSpec::optional("ast", enzyme, "AST / SGOT (U/L)").with_cues(&["ast", "sgot"]),
                FieldSpec::optional("alp", enzyme, "alkaline phosphatase (U/L)")
                    .with_cues(&["alp", "alkaline phosphatase"]),
                FieldSpec::optional(
                    "total_bilirubin",
                    FieldKind::Number { min: 0.0, max: 50.0 },
                    "total bilirubin (mg/dL)",
                )
                .with_cues(&["bilirubin", "total bilirubin"]),
                FieldSpec::optional(
                    "albumin",
                    FieldKind::Number { min: 0.5, max: 10.0 },
                    "albumin (g/dL)",
                )
                .with_cues(&["albumin"]),
            ])
            .with_min_fields(1),
        }
    }
}

impl Default for LiverFunctionTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for LiverFunctionTool {
    fn name(&self) -> &str {
        "liver_function"
    }

    fn description(&self) -> &str {
        "Checks liver markers (ALT, AST, ALP, bilirubin, albumin) against reference ranges and computes the ALT:AST ratio."
    }

    fn triggers(&self) -> &[&'static str] {
        &["liver", "lft", "hepat*", "alt", "ast", "sgpt", "sgot", "bilirubin", "jaundice"]
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn output_schema(&self) -> OutputSchema {
        OutputSchema::new(&["findings", "abnormal"])
    }

    fn compute(&self, input: &Value) -> Result<Value, String> {
        let mut findings = Vec::new();
        let mut abnormal = Vec::new();

        for marker in MARKERS {
            let Some(value) = num(input, marker.key) else {
                continue;
            };
            let status = RangeStatus::classify(value, marker.low, marker.high);
            let note = match status {
                RangeStatus::Low => marker.note_low,
                RangeStatus::High => marker.note_high,
                RangeStatus::Normal => "Normal.",
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

        if findings.is_empty() {
            return Err("no liver markers supplied".to_string());
        }

        let ratio = match (num(input, "alt"), num(input, "ast")) {
            (Some(alt), Some(ast)) if ast > 0.0 => Some(round_to(alt / ast, 2)),
            _ => None,
        };
        let ratio_note = ratio.map(|r| {
            if r < 1.0 {
                "ALT:AST below 1 can point to alcohol-related liver disease."
            } else if r > 2.0 {
                "ALT:AST above 2 is unusual and worth discussing with a doctor."
            } else {
                "ALT:AST ratio is in the usual 1-2 range."
            }
        });

        let mut summary = if abnormal.is_empty() {
            "All supplied liver markers are within range.".to_string()
        } else {
            format!("Out of range: {}.", abnormal.join(", "))
        };
        if let Some(r) = ratio {
            summary.push_str(&format!(" ALT:AST ratio {r}."));
        }

        Ok(json!({
            "summary": summary,
            "findings": findings,
            "abnormal": abnormal,
            "alt_ast_ratio": ratio,
            "ratio_note": ratio_note,
        }))
    }
}
