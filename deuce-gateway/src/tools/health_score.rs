use serde_json::{Value, json};

use super::{FieldKind, FieldSpec, OutputSchema, Tool, ToolSchema, num};

struct Vital {
    key: &'static str,
    label: &'static str,
    weight: u32,
    /// Score for a reading; `None` when the reading earns full marks.
    assess: fn(f64) -> Option<Assessment>,
}

struct Assessment {
    points: u32,
    flag: &'static str,
    tip: &'static str,
}

const fn flagged(points: u32, flag: &'static str, tip: &'static str) -> Option<Assessment> {
    Some(Assessment { points, flag, tip })
}

const VITALS: &[Vital] = &[
    Vital {
        key: "bmi",
        label: "BMI",
        weight: 10,
        assess: |v| {
            if v < 18.5 {
                flagged(0, "low", "Gain weight to reach a healthy BMI range.")
            } else if v <= 24.9 {
                None
            } else if v <= 29.9 {
                flagged(5, "moderately high", "Reduce BMI slightly through diet and exercise.")
            } else {
                flagged(0, "high", "Reduce weight through sustained lifestyle changes.")
            }
        },
    },
    Vital {
        key: "temperature",
        label: "Temperature",
        weight: 5,
        assess: |v| {
            if v < 36.1 {
                flagged(0, "low", "Keep warm and recheck your temperature.")
            } else if v <= 37.2 {
                None
            } else {
                flagged(0, "high", "Rest, hydrate and recheck your temperature.")
            }
        },
    },
    Vital {
        key: "systolic",
        label: "Systolic blood pressure",
        weight: 5,
        assess: |v| {
            if (90.0..=120.0).contains(&v) {
                None
            } else {
                flagged(0, "abnormal", "Monitor systolic pressure with a doctor.")
            }
        },
    },
    Vital {
        key: "diastolic",
        label: "Diastolic blood pressure",
        weight: 5,
        assess: |v| {
            if (60.0..=80.0).contains(&v) {
                None
            } else {
                flagged(0, "abnormal", "Monitor diastolic pressure with a doctor.")
            }
        },
    },
    Vital {
        key: "spo2",
        label: "SpO2",
        weight: 5,
        assess: |v| {
            if v >= 95.0 {
                None
            } else {
                flagged(0, "low", "Low oxygen saturation should be checked by a doctor.")
            }
        },
    },
    Vital {
        key: "heart_rate",
        label: "Heart rate",
        weight: 5,
        assess: |v| {
            if (60.0..=100.0).contains(&v) {
                None
            } else {
                flagged(0, "abnormal", "Discuss your resting heart rate with a cardiologist.")
            }
        },
    },
    Vital {
        key: "glucose",
        label: "Glucose",
        weight: 5,
        assess: |v| {
            if v < 70.0 {
                flagged(0, "low", "Eat regular balanced meals to avoid low blood sugar.")
            } else if v <= 100.0 {
                None
            } else {
                flagged(0, "high", "Reduce refined sugars and have your glucose rechecked.")
            }
        },
    },
];

/// Weighted 0-100 score over whichever vitals are supplied.
pub struct HealthScoreTool {
    schema: ToolSchema,
}

impl HealthScoreTool {
    pub fn new() -> Self {
        let number = |min, max| FieldKind::Number { min, max };
        Self {
            schema: ToolSchema::new(vec![
                FieldSpec::optional("bmi", number(5.0, 90.0), "your BMI").with_cues(&["bmi", "body mass index"]),
                FieldSpec::optional("temperature", number(30.0, 45.0), "your body temperature in °C")
                    .with_cues(&["temperature", "temp"]),
                FieldSpec::optional("systolic", number(50.0, 260.0), "systolic blood pressure")
                    .with_cues(&["systolic"]),
                FieldSpec::optional("diastolic", number(30.0, 160.0), "diastolic blood pressure")
                    .with_cues(&["diastolic"]),
                FieldSpec::optional("spo2", number(50.0, 100.0), "oxygen saturation (%)")
                    .with_cues(&["spo2", "oxygen", "saturation", "o2"]),
                FieldSpec::optional("heart_rate", number(20.0, 250.0), "resting heart rate (bpm)")
                    .with_cues(&["heart rate", "pulse", "bpm"]),
                FieldSpec::optional("glucose", number(20.0, 600.0), "fasting glucose (mg/dL)")
                    .with_cues(&["glucose", "blood sugar"]),
            ])
            .with_min_fields(1),
        }
    }
}

impl Default for HealthScoreTool {
    fn default() -> Self {
        Self::new()
    }
}

fn status_for(score: u32) -> &'static str {
    match score {
        85.. => "Excellent",
        70..=84 => "Good",
        50..=69 => "Fair",
        _ => "Poor",
    }
}

impl Tool for HealthScoreTool {
    fn name(&self) -> &str {
        "health_score"
    }

    fn description(&self) -> &str {
        "Scores supplied vitals (BMI, temperature, blood pressure, SpO2, heart rate, glucose) on a 0-100 scale."
    }

    fn triggers(&self) -> &[&'static str] {
        &[
            "health score",
            "overall health",
            "how healthy",
            "vitals",
            "vital signs",
            "analyze my health",
            "health analysis",
            "health check",
        ]
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn output_schema(&self) -> OutputSchema {
        OutputSchema::new(&["score", "status", "needs_improvement", "tips"])
    }

    fn compute(&self, input: &Value) -> Result<Value, String> {
        let mut total = 0u32;
        let mut max = 0u32;
        let mut needs_improvement = Vec::new();
        let mut tips = Vec::new();

        for vital in VITALS {
            let Some(value) = num(input, vital.key) else {
                continue;
            };
            max += vital.weight;
            match (vital.assess)(value) {
                None => total += vital.weight,
                Some(assessment) => {
                    total += assessment.points;
                    needs_improvement.push(format!("{} ({})", vital.label, assessment.flag));
                    tips.push(assessment.tip);
                }
            }
        }

        if max == 0 {
            return Err("no vitals supplied".to_string());
        }

        let score = ((total as f64 / max as f64) * 100.0).round() as u32;
        let status = status_for(score);
        let summary = if needs_improvement.is_empty() {
            format!("Health score {score}/100 ({status}); all supplied vitals are in range.")
        } else {
            format!(
                "Health score {score}/100 ({status}); needs attention: {}.",
                needs_improvement.join(", ")
            )
        };

        Ok(json!({
            "summary": summary,
            "score": score,
            "status": status,
            "needs_improvement": needs_improvement,
            "tips": tips,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_normal_is_excellent() {
        let out = HealthScoreTool::new()
            .compute(&json!({"bmi": 22.0, "heart_rate": 72.0, "glucose": 90.0}))
            .unwrap();
        assert_eq!(out["score"], 100);
        assert_eq!(out["status"], "Excellent");
    }

    #[test]
    fn partial_credit_for_overweight_bmi() {
        let out = HealthScoreTool::new()
            .compute(&json!({"bmi": 27.0, "spo2": 91.0}))
            .unwrap();
        // 5 of 10 for BMI, 0 of 5 for SpO2
        assert_eq!(out["score"], 33);
        assert_eq!(out["status"], "Poor");
        assert_eq!(out["needs_improvement"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn empty_input_fails() {
        assert!(HealthScoreTool::new().compute(&json!({})).is_err());
        assert!(HealthScoreTool::new().validate(&json!({})).is_err());
    }
}
